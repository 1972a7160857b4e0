//! Gallery configuration
//!
//! Stored in `~/.config/extgallery/config.yaml`

use extgallery_core::assets::validate_resource_template;
use extgallery_core::{FlagStrategy, parse_product_version};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GalleryError, Result};

/// Environment variable overriding `serviceUrl`
pub const SERVICE_URL_ENV: &str = "EXTGALLERY_SERVICE_URL";

/// Gallery configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryConfig {
    /// Registry base URL; the query endpoint is `{serviceUrl}/extensionquery`
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// Resource endpoint with `{publisher}` and `{name}` placeholders
    #[serde(default)]
    pub resource_url_template: Option<String>,

    /// Tried once when the resource endpoint fails
    #[serde(default)]
    pub fallback_resource_url_template: Option<String>,

    /// Product the registry filters for
    #[serde(default = "default_target_product")]
    pub target_product: String,

    #[serde(default)]
    pub query_strategy: FlagStrategy,

    /// Timeout of registry calls (query, resource, statistics)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub product: ProductInfo,

    /// Capabilities the product supports, with their version if versioned
    #[serde(default)]
    pub api_proposals: BTreeMap<String, Option<u32>>,

    /// Per-extension overrides, keyed by extension id
    #[serde(default)]
    pub extension_properties: BTreeMap<String, ExtensionOverride>,

    /// Allow list; absent means every extension is allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_extensions: Option<BTreeMap<String, AllowedValue>>,
}

fn default_service_url() -> String {
    "https://marketplace.visualstudio.com/_apis/public/gallery".to_string()
}

fn default_target_product() -> String {
    "Microsoft.VisualStudio.Code".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            resource_url_template: None,
            fallback_resource_url_template: None,
            target_product: default_target_product(),
            query_strategy: FlagStrategy::default(),
            request_timeout_secs: default_request_timeout(),
            product: ProductInfo::default(),
            api_proposals: BTreeMap::new(),
            extension_properties: BTreeMap::new(),
            allowed_extensions: None,
        }
    }
}

/// The product extensions are resolved for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInfo {
    #[serde(default = "default_product_name")]
    pub name: String,

    /// Checked against each version's engine requirement
    #[serde(default = "default_product_version")]
    pub version: String,

    #[serde(default)]
    pub date: Option<String>,
}

fn default_product_name() -> String {
    "extgallery".to_string()
}

fn default_product_version() -> String {
    "1.95.0".to_string()
}

impl Default for ProductInfo {
    fn default() -> Self {
        Self {
            name: default_product_name(),
            version: default_product_version(),
            date: None,
        }
    }
}

/// Product-level override for one extension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionOverride {
    /// `false` hides every pre-release version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_prerelease_version: Option<bool>,

    /// Semver range of versions that must never be selected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_version_range: Option<String>,
}

/// Value of one allow list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedValue {
    /// Allow or deny outright
    Flag(bool),
    /// Allowed versions, each optionally suffixed with `@platform`
    Versions(Vec<String>),
    /// `"stable"` allows release versions only
    Channel(String),
}

impl GalleryConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        let mut config = if path.exists() {
            Self::read(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GalleryError::invalid_config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            GalleryError::invalid_config("Could not determine config directory")
        })?;
        Ok(config_dir.join("extgallery").join("config.yaml"))
    }

    fn apply_env_overrides(&mut self) {
        self.override_service_url(std::env::var(SERVICE_URL_ENV).ok());
    }

    /// Replace the service URL when an override is present and non-empty
    pub fn override_service_url(&mut self, value: Option<String>) {
        if let Some(url) = value.filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Service URL overridden: {}", url);
            self.service_url = url;
        }
    }

    /// Check URLs, templates and the product version
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.service_url)?;

        for template in [
            &self.resource_url_template,
            &self.fallback_resource_url_template,
        ]
        .into_iter()
        .flatten()
        {
            validate_resource_template(template)?;
            let sample = template
                .replace("{publisher}", "publisher")
                .replace("{name}", "name");
            url::Url::parse(&sample)?;
        }

        if self.fallback_resource_url_template.is_some() && self.resource_url_template.is_none() {
            return Err(GalleryError::invalid_config(
                "fallbackResourceUrlTemplate requires resourceUrlTemplate",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(GalleryError::invalid_config(
                "requestTimeoutSecs must be greater than zero",
            ));
        }

        parse_product_version(&self.product.version)?;
        Ok(())
    }

    /// Query endpoint URL
    pub fn query_url(&self) -> String {
        format!("{}/extensionquery", self.service_url.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn api_proposal_map(&self) -> HashMap<String, Option<u32>> {
        self.api_proposals
            .iter()
            .map(|(name, version)| (name.clone(), *version))
            .collect()
    }
}
