//! CLI commands

pub mod config;
pub mod download;
pub mod report;
pub mod search;
pub mod show;
pub mod versions;

use extgallery_client::{ExtensionInfo, GalleryConfig};
use extgallery_core::{ExtensionIdentifier, TargetPlatform};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::error::{CliError, Result};

/// Attribution sent with every query
pub const QUERY_SOURCE: &str = "cli";

/// Load the configuration from `path`, or from the default location
pub fn load_config(path: Option<&Path>) -> Result<GalleryConfig> {
    let config = match path {
        Some(path) => GalleryConfig::load_from(path)?,
        None => GalleryConfig::load()?,
    };
    Ok(config)
}

/// Parse `publisher.name[@version]`
pub fn parse_extension(reference: &str) -> Result<ExtensionInfo> {
    let (id, version) = match reference.split_once('@') {
        Some((id, version)) if !version.is_empty() => (id, Some(version)),
        Some(_) => {
            return Err(CliError::input_with_help(
                format!("Missing version in '{}'", reference),
                "Use publisher.name@version",
            ));
        }
        None => (reference, None),
    };

    if ExtensionIdentifier::new(id).publisher_and_name().is_none() {
        return Err(CliError::input_with_help(
            format!("'{}' is not an extension id", id),
            "Extension ids look like publisher.name, e.g. rust-lang.rust-analyzer",
        ));
    }

    let info = ExtensionInfo::new(id);
    Ok(match version {
        Some(version) => info.with_version(version),
        None => info,
    })
}

/// The requested platform, or this machine's
pub fn target_platform(platform: Option<&str>) -> TargetPlatform {
    platform
        .map(TargetPlatform::parse)
        .unwrap_or_else(TargetPlatform::current)
}

/// Token cancelled on Ctrl-C
pub fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let interrupted = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupt received, cancelling");
            interrupted.cancel();
        }
    });
    token
}
