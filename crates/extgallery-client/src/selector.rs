//! Version selection
//!
//! Picks at most one version of a catalog entry for a selection criterion,
//! under target platform, product override and allow list constraints.

use async_trait::async_trait;
use extgallery_core::assets::{ResolvedAsset, asset_types, version_asset};
use extgallery_core::compat::version_in_range;
use extgallery_core::platform::{is_not_web_extension_in_web_platform, is_target_platform_compatible};
use extgallery_core::{
    CatalogEntry, CatalogVersion, GalleryExtension, SelectionCriterion, TargetPlatform,
    are_api_proposals_compatible, is_engine_compatible, sort_versions,
};
use semver::Version;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{GalleryError, Result};
use crate::policy::{AllowCriteria, AllowListPolicy, ProductOverrides};

/// Loads the engine requirement from a version's manifest
#[async_trait]
pub trait ManifestLoader: Send + Sync {
    async fn load_engine(
        &self,
        extension_id: &str,
        manifest: &ResolvedAsset,
        token: &CancellationToken,
    ) -> Result<Option<String>>;
}

/// What a caller asks the selector for
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRequest {
    pub criterion: SelectionCriterion,
    pub target_platform: TargetPlatform,
    /// Also require policy, capability and engine compatibility
    pub compatible: bool,
}

/// The facts compatibility is judged on
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub id: &'a str,
    pub publisher_display_name: &'a str,
    pub version: &'a str,
    pub pre_release: bool,
    pub platform: TargetPlatform,
    pub engine: Option<&'a str>,
    pub api_proposals: &'a [String],
    pub manifest: Option<ResolvedAsset>,
}

impl<'a> Candidate<'a> {
    pub fn from_version(id: &'a str, entry: &'a CatalogEntry, version: &'a CatalogVersion) -> Self {
        Self {
            id,
            publisher_display_name: &entry.publisher.display_name,
            version: &version.version,
            pre_release: version.is_pre_release(),
            platform: version.platform(),
            engine: version.properties.engine.as_deref(),
            api_proposals: &version.properties.enabled_api_proposals,
            manifest: version_asset(version, asset_types::MANIFEST),
        }
    }

    pub fn from_extension(extension: &'a GalleryExtension) -> Self {
        Self {
            id: &extension.identifier.id,
            publisher_display_name: &extension.publisher.display_name,
            version: &extension.version,
            pre_release: extension.properties.is_pre_release_version,
            platform: extension
                .properties
                .target_platform
                .clone()
                .unwrap_or(TargetPlatform::Universal),
            engine: extension.properties.engine.as_deref(),
            api_proposals: &extension.properties.enabled_api_proposals,
            manifest: extension.assets.manifest.clone(),
        }
    }
}

/// Version selector bound to one product
pub struct VersionSelector<'a> {
    pub product_version: &'a Version,
    pub api_proposals: &'a HashMap<String, Option<u32>>,
    pub policy: &'a dyn AllowListPolicy,
    pub overrides: &'a dyn ProductOverrides,
    pub manifests: &'a dyn ManifestLoader,
}

impl VersionSelector<'_> {
    /// Pick the version answering `request`, if any
    pub async fn select(
        &self,
        entry: &CatalogEntry,
        all_platforms: &[TargetPlatform],
        request: &VersionRequest,
        token: &CancellationToken,
    ) -> Result<Option<CatalogVersion>> {
        if request.compatible
            && is_not_web_extension_in_web_platform(all_platforms, &request.target_platform)
        {
            return Ok(None);
        }

        let versions = sort_versions(entry.versions.clone(), &request.target_platform);
        for version in &versions {
            if self
                .is_valid_version(entry, version, all_platforms, request, token)
                .await?
            {
                return Ok(Some(version.clone()));
            }
        }

        if request.criterion.exact_version().is_some() || request.compatible {
            return Ok(None);
        }

        // Newest published version, whatever its channel or platform
        Ok(entry.latest_version().cloned())
    }

    /// Run every validation step for one version
    pub async fn is_valid_version(
        &self,
        entry: &CatalogEntry,
        version: &CatalogVersion,
        all_platforms: &[TargetPlatform],
        request: &VersionRequest,
        token: &CancellationToken,
    ) -> Result<bool> {
        let id = entry.id();

        if !self.passes_overrides(&id, version) {
            return Ok(false);
        }
        if !request.criterion.accepts(version) {
            return Ok(false);
        }
        if !is_target_platform_compatible(
            &version.platform(),
            all_platforms,
            &request.target_platform,
        ) {
            return Ok(false);
        }
        if request.compatible {
            let candidate = Candidate::from_version(&id, entry, version);
            return self
                .is_compatible(&candidate, &request.target_platform, token)
                .await;
        }
        Ok(true)
    }

    fn passes_overrides(&self, id: &str, version: &CatalogVersion) -> bool {
        if version.is_pre_release() && self.overrides.has_pre_release_version(id) == Some(false) {
            return false;
        }
        if let Some(range) = self.overrides.excluded_version_range(id) {
            match version_in_range(&version.version, &range) {
                Ok(true) => return false,
                Ok(false) => {}
                Err(e) => tracing::warn!("Ignoring exclusion range for {}: {}", id, e),
            }
        }
        true
    }

    /// Policy, capability and engine checks
    pub async fn is_compatible(
        &self,
        candidate: &Candidate<'_>,
        target_platform: &TargetPlatform,
        token: &CancellationToken,
    ) -> Result<bool> {
        let criteria = AllowCriteria {
            id: candidate.id,
            publisher_display_name: candidate.publisher_display_name,
            version: candidate.version,
            pre_release: candidate.pre_release,
            target_platform,
        };
        if !self.policy.is_allowed(&criteria) {
            tracing::debug!("{}@{} not allowed by policy", candidate.id, candidate.version);
            return Ok(false);
        }

        if !are_api_proposals_compatible(candidate.api_proposals, self.api_proposals) {
            tracing::debug!(
                "{}@{} needs unsupported capabilities",
                candidate.id,
                candidate.version
            );
            return Ok(false);
        }

        let engine = match candidate.engine {
            Some(engine) => Some(engine.to_string()),
            None => self.engine_from_manifest(candidate, token).await?,
        };
        let Some(engine) = engine else {
            return Ok(false);
        };
        Ok(is_engine_compatible(&engine, self.product_version))
    }

    async fn engine_from_manifest(
        &self,
        candidate: &Candidate<'_>,
        token: &CancellationToken,
    ) -> Result<Option<String>> {
        let Some(manifest) = &candidate.manifest else {
            tracing::debug!("{}@{} has no manifest asset", candidate.id, candidate.version);
            return Ok(None);
        };
        match self.manifests.load_engine(candidate.id, manifest, token).await {
            Ok(engine) => Ok(engine),
            Err(GalleryError::Cancelled) => Err(GalleryError::Cancelled),
            Err(e) => {
                tracing::debug!(
                    "Cannot read manifest of {}@{}: {}",
                    candidate.id,
                    candidate.version,
                    e
                );
                Ok(None)
            }
        }
    }
}
