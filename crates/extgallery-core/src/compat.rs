//! Engine and capability compatibility checks

use semver::{Version, VersionReq};
use std::collections::HashMap;

use crate::error::{CoreError, Result};

/// Whether an engine requirement such as `^1.80.0` admits the product version.
///
/// Pre-release tags on the product version are ignored, so an insider build
/// of 1.90.0 satisfies `^1.89.0`. Unparseable requirements are incompatible.
pub fn is_engine_compatible(engine: &str, product_version: &Version) -> bool {
    let engine = engine.trim();
    if engine == "*" {
        return true;
    }
    let Ok(req) = VersionReq::parse(engine) else {
        tracing::debug!("Unparseable engine requirement: {}", engine);
        return false;
    };
    let release = Version::new(
        product_version.major,
        product_version.minor,
        product_version.patch,
    );
    req.matches(&release)
}

/// Parse a product version string, tolerating a missing patch component
pub fn parse_product_version(value: &str) -> Result<Version> {
    let value = value.trim();
    match Version::parse(value) {
        Ok(version) => Ok(version),
        Err(e) => {
            let parts = value.split('.').count();
            if parts == 2 {
                Ok(Version::parse(&format!("{}.0", value))?)
            } else {
                Err(CoreError::InvalidVersion(e))
            }
        }
    }
}

/// Split `name@version` into its parts
pub fn parse_api_proposal(value: &str) -> (&str, Option<u32>) {
    match value.split_once('@') {
        Some((name, version)) => (name, version.trim().parse().ok()),
        None => (value, None),
    }
}

/// Every versioned capability must match the version the product supports.
///
/// Capabilities declared without a version are always accepted.
pub fn are_api_proposals_compatible(
    enabled: &[String],
    supported: &HashMap<String, Option<u32>>,
) -> bool {
    enabled.iter().all(|proposal| {
        let (name, version) = parse_api_proposal(proposal);
        match version {
            None => true,
            Some(version) => supported.get(name).copied().flatten() == Some(version),
        }
    })
}

/// Whether a version string falls inside a semver range
pub fn version_in_range(version: &str, range: &str) -> Result<bool> {
    let req = VersionReq::parse(range).map_err(|e| CoreError::InvalidVersionRange {
        range: range.to_string(),
        message: e.to_string(),
    })?;
    Ok(Version::parse(version)
        .map(|v| req.matches(&v))
        .unwrap_or(false))
}
