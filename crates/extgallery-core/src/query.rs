//! Catalog query builder
//!
//! A `Query` is an immutable description of one request to the registry's
//! query endpoint. Every `with_*` method returns a new query and leaves the
//! receiver untouched.

use serde::Serialize;
use std::collections::BTreeSet;

/// Page size used when none is given
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Request flag understood by the query endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flag {
    IncludeVersions,
    IncludeFiles,
    IncludeCategoryAndTags,
    IncludeSharedAccounts,
    IncludeVersionProperties,
    ExcludeNonValidated,
    IncludeInstallationTargets,
    IncludeAssetUri,
    IncludeStatistics,
    IncludeLatestVersionOnly,
    Unpublished,
    IncludeNameConflictInfo,
    IncludeLatestPrereleaseAndStableVersionOnly,
}

impl Flag {
    pub fn bits(self) -> u32 {
        match self {
            Flag::IncludeVersions => 0x1,
            Flag::IncludeFiles => 0x2,
            Flag::IncludeCategoryAndTags => 0x4,
            Flag::IncludeSharedAccounts => 0x8,
            Flag::IncludeVersionProperties => 0x10,
            Flag::ExcludeNonValidated => 0x20,
            Flag::IncludeInstallationTargets => 0x40,
            Flag::IncludeAssetUri => 0x80,
            Flag::IncludeStatistics => 0x100,
            Flag::IncludeLatestVersionOnly => 0x200,
            Flag::Unpublished => 0x1000,
            Flag::IncludeNameConflictInfo => 0x8000,
            Flag::IncludeLatestPrereleaseAndStableVersionOnly => 0x10000,
        }
    }
}

/// Wire value of a flag set
pub fn flags_to_bits<'a>(flags: impl IntoIterator<Item = &'a Flag>) -> u32 {
    flags.into_iter().fold(0, |acc, flag| acc | flag.bits())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    Tag,
    ExtensionId,
    Category,
    ExtensionName,
    Target,
    Featured,
    SearchText,
    ExcludeWithFlags,
}

impl FilterType {
    pub fn code(self) -> u32 {
        match self {
            FilterType::Tag => 1,
            FilterType::ExtensionId => 4,
            FilterType::Category => 5,
            FilterType::ExtensionName => 7,
            FilterType::Target => 8,
            FilterType::Featured => 9,
            FilterType::SearchText => 10,
            FilterType::ExcludeWithFlags => 12,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterType::Tag => "Tag",
            FilterType::ExtensionId => "ExtensionId",
            FilterType::Category => "Category",
            FilterType::ExtensionName => "ExtensionName",
            FilterType::Target => "Target",
            FilterType::Featured => "Featured",
            FilterType::SearchText => "SearchText",
            FilterType::ExcludeWithFlags => "ExcludeWithFlags",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    NoneOrRelevance,
    LastUpdatedDate,
    Title,
    PublisherName,
    InstallCount,
    AverageRating,
    PublishedDate,
    WeightedRating,
}

impl SortBy {
    pub fn code(self) -> u32 {
        match self {
            SortBy::NoneOrRelevance => 0,
            SortBy::LastUpdatedDate => 1,
            SortBy::Title => 2,
            SortBy::PublisherName => 3,
            SortBy::InstallCount => 4,
            SortBy::AverageRating => 6,
            SortBy::PublishedDate => 10,
            SortBy::WeightedRating => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Default,
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn code(self) -> u32 {
        match self {
            SortOrder::Default => 0,
            SortOrder::Ascending => 1,
            SortOrder::Descending => 2,
        }
    }
}

/// One filter criterion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    pub filter_type: FilterType,
    pub value: Option<String>,
}

/// Immutable catalog query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    page_number: u32,
    page_size: u32,
    sort_by: SortBy,
    sort_order: SortOrder,
    criteria: Vec<Criterion>,
    flags: BTreeSet<Flag>,
    asset_types: Vec<String>,
    source: Option<String>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            page_number: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            criteria: Vec::new(),
            flags: BTreeSet::new(),
            asset_types: Vec::new(),
            source: None,
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort_by(&self) -> SortBy {
        self.sort_by
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn flags(&self) -> &BTreeSet<Flag> {
        &self.flags
    }

    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn asset_types(&self) -> &[String] {
        &self.asset_types
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Values of every criterion of the given type
    pub fn criteria_of(&self, filter_type: FilterType) -> Vec<&str> {
        self.criteria
            .iter()
            .filter(|c| c.filter_type == filter_type)
            .filter_map(|c| c.value.as_deref())
            .collect()
    }

    pub fn has_criterion(&self, filter_type: FilterType, value: Option<&str>) -> bool {
        self.criteria
            .iter()
            .any(|c| c.filter_type == filter_type && c.value.as_deref() == value)
    }

    /// Distinct filter type names, in first-seen order
    pub fn filter_types(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for criterion in &self.criteria {
            let name = criterion.filter_type.name();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Set page number, keeping the page size
    pub fn with_page(&self, page_number: u32) -> Self {
        Self {
            page_number: page_number.max(1),
            ..self.clone()
        }
    }

    pub fn with_page_size(&self, page_number: u32, page_size: u32) -> Self {
        Self {
            page_number: page_number.max(1),
            page_size: page_size.max(1),
            ..self.clone()
        }
    }

    /// Append one criterion per value; a filter without values is a bare flag
    pub fn with_filter<I, S>(&self, filter_type: FilterType, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut criteria = self.criteria.clone();
        let before = criteria.len();
        criteria.extend(values.into_iter().map(|value| Criterion {
            filter_type,
            value: Some(value.into()),
        }));
        if criteria.len() == before {
            criteria.push(Criterion {
                filter_type,
                value: None,
            });
        }
        Self {
            criteria,
            ..self.clone()
        }
    }

    pub fn with_sort_by(&self, sort_by: SortBy) -> Self {
        Self {
            sort_by,
            ..self.clone()
        }
    }

    pub fn with_sort_order(&self, sort_order: SortOrder) -> Self {
        Self {
            sort_order,
            ..self.clone()
        }
    }

    /// Replace the flag set
    pub fn with_flags(&self, flags: impl IntoIterator<Item = Flag>) -> Self {
        Self {
            flags: flags.into_iter().collect(),
            ..self.clone()
        }
    }

    pub fn with_asset_types<I, S>(&self, asset_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            asset_types: asset_types.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    pub fn with_source(&self, source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..self.clone()
        }
    }

    /// JSON body for the query endpoint
    pub fn to_request_body(&self) -> QueryRequestBody {
        QueryRequestBody {
            filters: vec![QueryFilter {
                criteria: self
                    .criteria
                    .iter()
                    .map(|c| WireCriterion {
                        filter_type: c.filter_type.code(),
                        value: c.value.clone(),
                    })
                    .collect(),
                page_number: self.page_number,
                page_size: self.page_size,
                sort_by: self.sort_by.code(),
                sort_order: self.sort_order.code(),
            }],
            asset_types: self.asset_types.clone(),
            flags: flags_to_bits(&self.flags),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequestBody {
    pub filters: Vec<QueryFilter>,
    pub asset_types: Vec<String>,
    pub flags: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    pub criteria: Vec<WireCriterion>,
    pub page_number: u32,
    pub page_size: u32,
    pub sort_by: u32,
    pub sort_order: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCriterion {
    pub filter_type: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}
