//! Selection criteria and version ordering

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::CatalogVersion;
use crate::platform::TargetPlatform;

/// What the caller wants resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionCriterion {
    ExactVersion(String),
    Release,
    Prerelease,
    Latest,
}

impl SelectionCriterion {
    /// Channel criterion for a pre-release wish
    pub fn for_channel(include_pre_release: bool) -> Self {
        if include_pre_release {
            SelectionCriterion::Latest
        } else {
            SelectionCriterion::Release
        }
    }

    /// Wire encoding of the channel kinds; exact versions have none
    pub fn kind_code(&self) -> Option<u8> {
        match self {
            SelectionCriterion::Release => Some(0),
            SelectionCriterion::Prerelease => Some(1),
            SelectionCriterion::Latest => Some(2),
            SelectionCriterion::ExactVersion(_) => None,
        }
    }

    pub fn from_kind_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SelectionCriterion::Release),
            1 => Some(SelectionCriterion::Prerelease),
            2 => Some(SelectionCriterion::Latest),
            _ => None,
        }
    }

    pub fn exact_version(&self) -> Option<&str> {
        match self {
            SelectionCriterion::ExactVersion(version) => Some(version),
            _ => None,
        }
    }

    /// Criterion step of version validation
    pub fn accepts(&self, version: &CatalogVersion) -> bool {
        match self {
            SelectionCriterion::ExactVersion(wanted) => version.version == *wanted,
            SelectionCriterion::Release => !version.is_pre_release(),
            SelectionCriterion::Prerelease => version.is_pre_release(),
            SelectionCriterion::Latest => true,
        }
    }
}

impl fmt::Display for SelectionCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionCriterion::ExactVersion(version) => write!(f, "{}", version),
            SelectionCriterion::Release => write!(f, "release"),
            SelectionCriterion::Prerelease => write!(f, "pre-release"),
            SelectionCriterion::Latest => write!(f, "latest"),
        }
    }
}

/// Stable reorder so that within each run of equal version strings the
/// build for `preferred` comes first. Everything else keeps its position.
pub fn sort_versions(
    mut versions: Vec<CatalogVersion>,
    preferred: &TargetPlatform,
) -> Vec<CatalogVersion> {
    for i in 1..versions.len() {
        if versions[i].version != versions[i - 1].version {
            continue;
        }
        if versions[i].platform() != *preferred {
            continue;
        }
        let mut insertion = i;
        while insertion > 0 && versions[insertion - 1].version == versions[i].version {
            insertion -= 1;
        }
        if insertion != i {
            let version = versions.remove(i);
            versions.insert(insertion, version);
        }
    }
    versions
}
