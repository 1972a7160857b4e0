//! Allow list policy and product overrides

use extgallery_core::TargetPlatform;
use std::collections::BTreeMap;

use crate::config::{AllowedValue, ExtensionOverride};

/// What the allow list is asked about
#[derive(Debug, Clone, Copy)]
pub struct AllowCriteria<'a> {
    pub id: &'a str,
    pub publisher_display_name: &'a str,
    pub version: &'a str,
    pub pre_release: bool,
    pub target_platform: &'a TargetPlatform,
}

/// Decides whether an extension version may be installed
pub trait AllowListPolicy: Send + Sync {
    fn is_allowed(&self, criteria: &AllowCriteria<'_>) -> bool;
}

/// Allow list driven by the `allowedExtensions` configuration.
///
/// Keys are extension ids or publisher ids, compared case-insensitively.
/// An extension entry wins over its publisher entry; `*` allows anything not
/// matched otherwise. No configuration allows everything.
#[derive(Debug, Clone, Default)]
pub struct AllowedExtensionsPolicy {
    entries: Option<BTreeMap<String, AllowedValue>>,
}

impl AllowedExtensionsPolicy {
    pub fn new(allowed: Option<BTreeMap<String, AllowedValue>>) -> Self {
        let entries = allowed.map(|map| {
            map.into_iter()
                .map(|(key, value)| (key.to_lowercase(), value))
                .collect()
        });
        Self { entries }
    }

    fn check_extension(value: &AllowedValue, criteria: &AllowCriteria<'_>) -> bool {
        match value {
            AllowedValue::Flag(allowed) => *allowed,
            AllowedValue::Channel(channel) => {
                !(channel.eq_ignore_ascii_case("stable") && criteria.pre_release)
            }
            AllowedValue::Versions(versions) => versions.iter().any(|entry| {
                let (version, platform) = match entry.split_once('@') {
                    Some((version, platform)) => (version, Some(platform)),
                    None => (entry.as_str(), None),
                };
                version == criteria.version
                    && platform.is_none_or(|p| p == criteria.target_platform.as_str())
            }),
        }
    }

    fn check_publisher(value: &AllowedValue, criteria: &AllowCriteria<'_>) -> bool {
        match value {
            AllowedValue::Flag(allowed) => *allowed,
            AllowedValue::Channel(channel) => {
                !(channel.eq_ignore_ascii_case("stable") && criteria.pre_release)
            }
            // Version lists only make sense for a single extension
            AllowedValue::Versions(_) => true,
        }
    }
}

impl AllowListPolicy for AllowedExtensionsPolicy {
    fn is_allowed(&self, criteria: &AllowCriteria<'_>) -> bool {
        let Some(entries) = &self.entries else {
            return true;
        };

        let id = criteria.id.to_lowercase();
        if let Some(value) = entries.get(&id) {
            return Self::check_extension(value, criteria);
        }

        let publisher = id.split('.').next().unwrap_or_default();
        if let Some(value) = entries.get(publisher) {
            return Self::check_publisher(value, criteria);
        }

        matches!(entries.get("*"), Some(AllowedValue::Flag(true)))
    }
}

/// Product-level facts about specific extensions
pub trait ProductOverrides: Send + Sync {
    /// `Some(false)` when the product knows the extension has no usable pre-release
    fn has_pre_release_version(&self, id: &str) -> Option<bool>;

    /// Version range that must never be selected
    fn excluded_version_range(&self, id: &str) -> Option<String>;
}

/// Overrides read from `extensionProperties`
#[derive(Debug, Clone, Default)]
pub struct ConfiguredOverrides {
    properties: BTreeMap<String, ExtensionOverride>,
}

impl ConfiguredOverrides {
    pub fn new(properties: BTreeMap<String, ExtensionOverride>) -> Self {
        Self {
            properties: properties
                .into_iter()
                .map(|(key, value)| (key.to_lowercase(), value))
                .collect(),
        }
    }

    fn get(&self, id: &str) -> Option<&ExtensionOverride> {
        self.properties.get(&id.to_lowercase())
    }
}

impl ProductOverrides for ConfiguredOverrides {
    fn has_pre_release_version(&self, id: &str) -> Option<bool> {
        self.get(id).and_then(|o| o.has_prerelease_version)
    }

    fn excluded_version_range(&self, id: &str) -> Option<String> {
        self.get(id).and_then(|o| o.exclude_version_range.clone())
    }
}
