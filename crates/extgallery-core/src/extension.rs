//! Normalized extension record returned to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::assets::{
    ResolvedAsset, asset_types, core_translation_assets, download_asset, version_asset,
};
use crate::catalog::{CatalogEntry, CatalogVersion, Publisher};
use crate::platform::TargetPlatform;

/// Identity of an extension: `publisher.name` plus the registry uuid when known.
///
/// `==` compares fields exactly; use [`ExtensionIdentifier::matches`] to ask
/// whether two identities name the same extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionIdentifier {
    pub id: String,
    #[serde(default)]
    pub uuid: Option<String>,
}

impl ExtensionIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uuid: None,
        }
    }

    pub fn with_uuid(id: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uuid: Some(uuid.into()),
        }
    }

    /// Same extension: uuids decide when both sides have one, ids otherwise
    pub fn matches(&self, other: &ExtensionIdentifier) -> bool {
        match (&self.uuid, &other.uuid) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => self.id.eq_ignore_ascii_case(&other.id),
        }
    }

    /// Split `publisher.name`
    pub fn publisher_and_name(&self) -> Option<(&str, &str)> {
        self.id
            .split_once('.')
            .filter(|(publisher, name)| !publisher.is_empty() && !name.is_empty())
    }
}

/// Asset locations of the resolved version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionAssets {
    pub manifest: Option<ResolvedAsset>,
    pub readme: Option<ResolvedAsset>,
    pub changelog: Option<ResolvedAsset>,
    pub license: Option<ResolvedAsset>,
    pub repository: Option<ResolvedAsset>,
    pub icon: Option<ResolvedAsset>,
    pub signature: Option<ResolvedAsset>,
    pub download: Option<ResolvedAsset>,
    pub core_translations: BTreeMap<String, ResolvedAsset>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionProperties {
    pub dependencies: Vec<String>,
    pub extension_pack: Vec<String>,
    pub engine: Option<String>,
    pub localized_languages: Vec<String>,
    pub target_platform: Option<TargetPlatform>,
    pub is_pre_release_version: bool,
    pub executes_code: Option<bool>,
    pub enabled_api_proposals: Vec<String>,
}

/// One extension at one resolved version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryExtension {
    pub identifier: ExtensionIdentifier,
    pub name: String,
    pub version: String,
    pub display_name: String,
    pub publisher: Publisher,
    pub description: String,
    pub install_count: u64,
    pub rating: f64,
    pub rating_count: u64,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub preview: bool,
    pub assets: ExtensionAssets,
    pub properties: ExtensionProperties,
    pub all_target_platforms: Vec<TargetPlatform>,
    pub has_pre_release_version: bool,
    pub has_release_version: bool,
    /// Headers to forward when downloading, e.g. the search activity id
    #[serde(default)]
    pub query_context: BTreeMap<String, String>,
    /// The entry this record was resolved from
    #[serde(skip)]
    pub entry: Option<CatalogEntry>,
}

impl GalleryExtension {
    /// Assemble the record for `version` of `entry`
    pub fn from_entry(
        entry: &CatalogEntry,
        version: &CatalogVersion,
        all_target_platforms: Vec<TargetPlatform>,
        query_context: BTreeMap<String, String>,
    ) -> Self {
        let assets = ExtensionAssets {
            manifest: version_asset(version, asset_types::MANIFEST),
            readme: version_asset(version, asset_types::DETAILS),
            changelog: version_asset(version, asset_types::CHANGELOG),
            license: version_asset(version, asset_types::LICENSE),
            repository: version_asset(version, asset_types::REPOSITORY),
            icon: version_asset(version, asset_types::ICON),
            signature: version_asset(version, asset_types::SIGNATURE),
            download: Some(download_asset(version)),
            core_translations: core_translation_assets(version).into_iter().collect(),
        };

        let properties = ExtensionProperties {
            dependencies: version.properties.dependencies.clone(),
            extension_pack: version.properties.extension_pack.clone(),
            engine: version.properties.engine.clone(),
            localized_languages: version.properties.localized_languages.clone(),
            target_platform: version.target_platform.clone(),
            is_pre_release_version: version.is_pre_release(),
            executes_code: version.properties.executes_code,
            enabled_api_proposals: version.properties.enabled_api_proposals.clone(),
        };

        let latest_is_pre_release = entry
            .latest_version()
            .map(CatalogVersion::is_pre_release)
            .unwrap_or(false);

        Self {
            identifier: ExtensionIdentifier {
                id: entry.id(),
                uuid: entry.uuid.clone(),
            },
            name: entry.name.clone(),
            version: version.version.clone(),
            display_name: entry
                .display_name
                .clone()
                .unwrap_or_else(|| entry.name.clone()),
            publisher: entry.publisher.clone(),
            description: entry.short_description.clone().unwrap_or_default(),
            install_count: entry.statistics.install_count,
            rating: entry.statistics.rating,
            rating_count: entry.statistics.rating_count,
            categories: entry.categories.clone(),
            tags: entry.tags.clone(),
            release_date: entry.release_date,
            last_updated: version.last_updated.or(entry.last_updated),
            preview: entry.is_preview(),
            assets,
            properties,
            all_target_platforms,
            has_pre_release_version: latest_is_pre_release
                || entry.versions.iter().any(CatalogVersion::is_pre_release),
            has_release_version: entry.versions.iter().any(|v| !v.is_pre_release()),
            query_context,
            entry: Some(entry.clone()),
        }
    }

    pub fn publisher_name(&self) -> &str {
        &self.publisher.name
    }
}
