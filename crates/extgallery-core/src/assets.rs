//! Asset URI resolution
//!
//! Every asset of a version is reachable under two roots: the CDN asset root
//! and the registry's fallback root.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogVersion;
use crate::error::{CoreError, Result};

/// Asset type keys
pub mod asset_types {
    pub const ICON: &str = "Microsoft.VisualStudio.Services.Icons.Default";
    pub const DETAILS: &str = "Microsoft.VisualStudio.Services.Content.Details";
    pub const CHANGELOG: &str = "Microsoft.VisualStudio.Services.Content.Changelog";
    pub const MANIFEST: &str = "Microsoft.VisualStudio.Code.Manifest";
    pub const PACKAGE: &str = "Microsoft.VisualStudio.Services.VSIXPackage";
    pub const LICENSE: &str = "Microsoft.VisualStudio.Services.Content.License";
    pub const REPOSITORY: &str = "Microsoft.VisualStudio.Services.Links.Source";
    pub const SIGNATURE: &str = "Microsoft.VisualStudio.Services.VsixSignature";
    pub const CORE_TRANSLATION_PREFIX: &str = "Microsoft.VisualStudio.Code.Translation.";

    pub fn core_translation(language: &str) -> String {
        format!("{}{}", CORE_TRANSLATION_PREFIX, language.to_uppercase())
    }
}

/// Primary and fallback location of one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAsset {
    pub uri: String,
    pub fallback_uri: String,
}

impl ResolvedAsset {
    pub fn new(uri: impl Into<String>, fallback_uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            fallback_uri: fallback_uri.into(),
        }
    }

    /// Append `key=value` to both URIs
    pub fn with_query_param(&self, key: &str, value: &str) -> Self {
        Self {
            uri: append_query(&self.uri, key, value),
            fallback_uri: append_query(&self.fallback_uri, key, value),
        }
    }
}

fn append_query(uri: &str, key: &str, value: &str) -> String {
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", uri, separator, key, value)
}

/// Asset of the given type, if the version publishes it
pub fn version_asset(version: &CatalogVersion, asset_type: &str) -> Option<ResolvedAsset> {
    if !version.has_file(asset_type) {
        return None;
    }
    Some(ResolvedAsset::new(
        format!("{}/{}", version.asset_uri.trim_end_matches('/'), asset_type),
        format!(
            "{}/{}",
            version.fallback_asset_uri.trim_end_matches('/'),
            asset_type
        ),
    ))
}

/// Package archive of a version.
///
/// The primary asks the registry to redirect to its CDN; both carry the
/// target platform when the version is platform specific.
pub fn download_asset(version: &CatalogVersion) -> ResolvedAsset {
    let root = version.fallback_asset_uri.trim_end_matches('/');
    let primary = ResolvedAsset::new(
        format!("{}/{}", root, asset_types::PACKAGE),
        format!("{}/{}", root, asset_types::PACKAGE),
    );
    let primary = ResolvedAsset {
        uri: append_query(&primary.uri, "redirect", "true"),
        ..primary
    };
    match &version.target_platform {
        Some(platform) if !platform.is_neutral() => {
            primary.with_query_param("targetPlatform", platform.as_str())
        }
        _ => primary,
    }
}

const PUBLISHER_PLACEHOLDER: &str = "{publisher}";
const NAME_PLACEHOLDER: &str = "{name}";

/// Check that a resource URL template names both placeholders
pub fn validate_resource_template(template: &str) -> Result<()> {
    for placeholder in [PUBLISHER_PLACEHOLDER, NAME_PLACEHOLDER] {
        if !template.contains(placeholder) {
            return Err(CoreError::InvalidTemplate {
                template: template.to_string(),
                placeholder: placeholder.to_string(),
            });
        }
    }
    Ok(())
}

/// Resource endpoint URL for one extension
pub fn expand_resource_template(template: &str, publisher: &str, name: &str) -> Result<String> {
    validate_resource_template(template)?;
    Ok(template
        .replace(PUBLISHER_PLACEHOLDER, publisher)
        .replace(NAME_PLACEHOLDER, name))
}

/// Core translation assets keyed by upper-case language id
pub fn core_translation_assets(version: &CatalogVersion) -> Vec<(String, ResolvedAsset)> {
    version
        .files
        .iter()
        .filter_map(|file| {
            let language = file
                .asset_type
                .strip_prefix(asset_types::CORE_TRANSLATION_PREFIX)?;
            let asset = version_asset(version, &file.asset_type)?;
            Some((language.to_uppercase(), asset))
        })
        .collect()
}
