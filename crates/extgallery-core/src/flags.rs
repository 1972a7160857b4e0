//! Flag reconciliation
//!
//! Callers state what they want (latest only, every version, an exact
//! version) and the batch they query may impose more. The reconciler turns
//! that into one flag set the registry accepts, with no contradictory
//! latest/all-versions combination.
//!
//! Two strategies are supported; which one is active is a configuration
//! decision made outside the engine.

use serde::{Deserialize, Serialize};

use crate::query::{FilterType, Flag, Query, flags_to_bits};

/// Flags every query needs for a usable response
pub const BASELINE_FLAGS: [Flag; 5] = [
    Flag::IncludeAssetUri,
    Flag::IncludeCategoryAndTags,
    Flag::IncludeFiles,
    Flag::IncludeStatistics,
    Flag::IncludeVersionProperties,
];

/// How "latest" lookups are expressed on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlagStrategy {
    /// Ask for latest only, re-query with all versions when that is not enough
    #[default]
    AllVersionsFallback,
    /// Ask the registry for the newest pre-release and newest stable at once
    LatestPrereleaseAndStable,
}

/// Which channel the entries of a batch want
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelIntent {
    /// Every entry wants the newest version of any channel
    Latest,
    /// Every entry wants the newest stable version
    #[default]
    Stable,
    Mixed,
}

impl ChannelIntent {
    /// Combine per-entry pre-release wishes
    pub fn from_pre_release<I: IntoIterator<Item = bool>>(wishes: I) -> Self {
        let mut any_latest = false;
        let mut any_stable = false;
        for wants_pre_release in wishes {
            if wants_pre_release {
                any_latest = true;
            } else {
                any_stable = true;
            }
        }
        match (any_latest, any_stable) {
            (true, false) => ChannelIntent::Latest,
            (true, true) => ChannelIntent::Mixed,
            _ => ChannelIntent::Stable,
        }
    }
}

/// Constraints the batch puts on the flag set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchIntent {
    /// At least one entry asks for an exact version
    pub exact_versions: bool,
    /// Latest-only answers were insufficient (e.g. a release is needed but the
    /// latest is a pre-release)
    pub needs_all_versions: bool,
    pub channel: ChannelIntent,
}

/// Value of the criterion that hides unpublished entries
pub fn exclude_unpublished_value() -> String {
    flags_to_bits(&[Flag::Unpublished]).to_string()
}

/// Produce the flag set to send for `query`.
///
/// Applying the result to itself with the same intent returns it unchanged.
pub fn reconcile(query: &Query, strategy: FlagStrategy, intent: &BatchIntent) -> Query {
    let mut flags = query.flags().clone();
    let force_all = intent.exact_versions || intent.needs_all_versions;

    match strategy {
        FlagStrategy::AllVersionsFallback => {
            flags.remove(&Flag::IncludeLatestPrereleaseAndStableVersionOnly);
            if flags.contains(&Flag::IncludeVersions) {
                flags.remove(&Flag::IncludeLatestVersionOnly);
            } else if !flags.contains(&Flag::IncludeLatestVersionOnly) {
                flags.insert(Flag::IncludeLatestVersionOnly);
            }
            if force_all {
                flags.remove(&Flag::IncludeLatestVersionOnly);
                flags.insert(Flag::IncludeVersions);
            }
        }
        FlagStrategy::LatestPrereleaseAndStable => {
            if force_all {
                flags.insert(Flag::IncludeVersions);
            }
            if flags.contains(&Flag::IncludeVersions) {
                flags.remove(&Flag::IncludeLatestVersionOnly);
                flags.remove(&Flag::IncludeLatestPrereleaseAndStableVersionOnly);
            } else if intent.channel == ChannelIntent::Latest {
                flags.remove(&Flag::IncludeLatestPrereleaseAndStableVersionOnly);
                flags.insert(Flag::IncludeLatestVersionOnly);
            } else {
                flags.remove(&Flag::IncludeLatestVersionOnly);
                flags.insert(Flag::IncludeLatestPrereleaseAndStableVersionOnly);
            }
        }
    }

    flags.extend(BASELINE_FLAGS);

    let exclude = exclude_unpublished_value();
    let query = query.with_flags(flags);
    if query.has_criterion(FilterType::ExcludeWithFlags, Some(exclude.as_str())) {
        query
    } else {
        query.with_filter(FilterType::ExcludeWithFlags, [exclude])
    }
}

/// Whether a reconciled query returns every version of each entry
pub fn has_all_versions(query: &Query) -> bool {
    !query.has_flag(Flag::IncludeLatestVersionOnly)
        && !query.has_flag(Flag::IncludeLatestPrereleaseAndStableVersionOnly)
}
