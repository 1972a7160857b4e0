//! Catalog entry types
//!
//! The registry answers with loosely shaped JSON whose optional fields depend
//! on the flags sent with the query. `RawGalleryExtension` mirrors that shape;
//! `CatalogEntry` and `CatalogVersion` are the validated snapshot the rest of
//! the engine works with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::platform::TargetPlatform;

/// Version property keys understood by the client
pub mod keys {
    pub const DEPENDENCY: &str = "Microsoft.VisualStudio.Code.ExtensionDependencies";
    pub const EXTENSION_PACK: &str = "Microsoft.VisualStudio.Code.ExtensionPack";
    pub const ENGINE: &str = "Microsoft.VisualStudio.Code.Engine";
    pub const PRE_RELEASE: &str = "Microsoft.VisualStudio.Code.PreRelease";
    pub const ENABLED_API_PROPOSALS: &str = "Microsoft.VisualStudio.Code.EnabledApiProposals";
    pub const LOCALIZED_LANGUAGES: &str = "Microsoft.VisualStudio.Code.LocalizedLanguages";
    pub const WEB_EXTENSION: &str = "Microsoft.VisualStudio.Code.WebExtension";
    pub const EXECUTES_CODE: &str = "Microsoft.VisualStudio.Code.ExecutesCode";
}

/// Raw extension record as delivered by the registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGalleryExtension {
    #[serde(default)]
    pub extension_id: Option<String>,
    #[serde(default)]
    pub extension_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub publisher: RawPublisher,
    #[serde(default)]
    pub versions: Vec<RawGalleryExtensionVersion>,
    #[serde(default)]
    pub statistics: Vec<RawStatistic>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Comma separated, e.g. `"validated, preview"`
    #[serde(default)]
    pub flags: String,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPublisher {
    #[serde(default)]
    pub publisher_id: Option<String>,
    #[serde(default)]
    pub publisher_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub is_domain_verified: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGalleryExtensionVersion {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub target_platform: Option<String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub asset_uri: String,
    #[serde(default)]
    pub fallback_asset_uri: String,
    #[serde(default)]
    pub files: Vec<RawAssetFile>,
    #[serde(default)]
    pub properties: Vec<RawProperty>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAssetFile {
    pub asset_type: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProperty {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStatistic {
    pub statistic_name: String,
    #[serde(default)]
    pub value: f64,
}

/// Publisher of a catalog entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publisher {
    pub id: Option<String>,
    pub name: String,
    pub display_name: String,
    pub domain: Option<String>,
    pub domain_verified: bool,
}

/// Aggregate statistics of a catalog entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub install_count: u64,
    pub rating: f64,
    pub rating_count: u64,
}

/// One published package identity with its version history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub uuid: Option<String>,
    pub name: String,
    pub display_name: Option<String>,
    pub short_description: Option<String>,
    pub publisher: Publisher,
    /// Newest first, as delivered by the registry
    pub versions: Vec<CatalogVersion>,
    pub statistics: Statistics,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub flags: Vec<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub published_date: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// Validate a raw registry record
    pub fn from_raw(raw: RawGalleryExtension) -> Result<Self> {
        if raw.publisher.publisher_name.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "publisher.publisherName".to_string(),
            });
        }
        if raw.extension_name.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "extensionName".to_string(),
            });
        }

        let versions = raw
            .versions
            .into_iter()
            .map(CatalogVersion::from_raw)
            .collect::<Result<Vec<_>>>()?;

        let statistics = Statistics {
            install_count: statistic(&raw.statistics, "install") as u64,
            rating: statistic(&raw.statistics, "averagerating"),
            rating_count: statistic(&raw.statistics, "ratingcount") as u64,
        };

        let publisher = Publisher {
            id: raw.publisher.publisher_id,
            display_name: raw
                .publisher
                .display_name
                .unwrap_or_else(|| raw.publisher.publisher_name.clone()),
            name: raw.publisher.publisher_name,
            domain: raw.publisher.domain,
            domain_verified: raw.publisher.is_domain_verified,
        };

        Ok(Self {
            uuid: raw.extension_id.filter(|id| !id.is_empty()),
            name: raw.extension_name,
            display_name: raw.display_name,
            short_description: raw.short_description,
            publisher,
            versions,
            statistics,
            tags: raw.tags,
            categories: raw.categories,
            flags: split_list(&raw.flags),
            release_date: raw.release_date,
            published_date: raw.published_date,
            last_updated: raw.last_updated,
        })
    }

    /// `publisher.name`
    pub fn id(&self) -> String {
        format!("{}.{}", self.publisher.name, self.name)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case(flag))
    }

    pub fn is_preview(&self) -> bool {
        self.has_flag("preview")
    }

    /// Newest published version, regardless of channel or platform
    pub fn latest_version(&self) -> Option<&CatalogVersion> {
        self.versions.first()
    }
}

fn statistic(stats: &[RawStatistic], name: &str) -> f64 {
    stats
        .iter()
        .find(|s| s.statistic_name == name)
        .map(|s| s.value)
        .unwrap_or(0.0)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Named file asset of a version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFile {
    pub asset_type: String,
    pub source: String,
}

/// Typed view of a version's property bag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionProperties {
    pub engine: Option<String>,
    pub pre_release: bool,
    pub enabled_api_proposals: Vec<String>,
    pub dependencies: Vec<String>,
    pub extension_pack: Vec<String>,
    pub executes_code: Option<bool>,
    pub localized_languages: Vec<String>,
    pub web_extension: bool,
}

impl VersionProperties {
    pub fn from_raw(properties: &[RawProperty]) -> Self {
        let lookup = |key: &str| {
            properties
                .iter()
                .find(|p| p.key == key)
                .map(|p| p.value.as_str())
        };
        let flag = |key: &str| lookup(key).map(|v| v.trim() == "true");

        Self {
            engine: lookup(keys::ENGINE)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from),
            pre_release: flag(keys::PRE_RELEASE).unwrap_or(false),
            enabled_api_proposals: lookup(keys::ENABLED_API_PROPOSALS)
                .map(split_list)
                .unwrap_or_default(),
            dependencies: lookup(keys::DEPENDENCY).map(split_list).unwrap_or_default(),
            extension_pack: lookup(keys::EXTENSION_PACK)
                .map(split_list)
                .unwrap_or_default(),
            executes_code: flag(keys::EXECUTES_CODE),
            localized_languages: lookup(keys::LOCALIZED_LANGUAGES)
                .map(split_list)
                .unwrap_or_default(),
            web_extension: flag(keys::WEB_EXTENSION).unwrap_or(false),
        }
    }
}

/// One published version of a catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogVersion {
    pub version: String,
    /// `None` means platform neutral
    pub target_platform: Option<TargetPlatform>,
    pub last_updated: Option<DateTime<Utc>>,
    pub asset_uri: String,
    pub fallback_asset_uri: String,
    pub files: Vec<AssetFile>,
    pub properties: VersionProperties,
}

impl CatalogVersion {
    pub fn from_raw(raw: RawGalleryExtensionVersion) -> Result<Self> {
        if raw.version.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "versions[].version".to_string(),
            });
        }

        Ok(Self {
            target_platform: raw
                .target_platform
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(TargetPlatform::parse),
            properties: VersionProperties::from_raw(&raw.properties),
            files: raw
                .files
                .into_iter()
                .map(|f| AssetFile {
                    asset_type: f.asset_type,
                    source: f.source,
                })
                .collect(),
            version: raw.version,
            last_updated: raw.last_updated,
            asset_uri: raw.asset_uri,
            fallback_asset_uri: raw.fallback_asset_uri,
        })
    }

    /// Target platform, with neutral versions reported as `universal`
    pub fn platform(&self) -> TargetPlatform {
        self.target_platform
            .clone()
            .unwrap_or(TargetPlatform::Universal)
    }

    pub fn is_pre_release(&self) -> bool {
        self.properties.pre_release
    }

    pub fn has_file(&self, asset_type: &str) -> bool {
        self.files.iter().any(|f| f.asset_type == asset_type)
    }

    /// Parse version as semver
    pub fn parsed_version(&self) -> Option<semver::Version> {
        semver::Version::parse(&self.version).ok()
    }
}
