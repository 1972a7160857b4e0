//! Search and paging over the query endpoint

use regex::Regex;
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;

use extgallery_core::{
    FilterType, GalleryExtension, Query, SelectionCriterion, SortBy, SortOrder, TargetPlatform,
};

use crate::error::{GalleryError, Result};
use crate::gallery::{GalleryClient, QueryCriteria};

/// Default number of results per search page
pub const SEARCH_PAGE_SIZE: u32 = 50;

/// Longest free text sent to the registry
pub const MAX_SEARCH_TEXT: usize = 200;

static CATEGORY_FILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bcategory:("([^"]*)"|([^"]\S*))(\s+|\b|$)"#).expect("valid category regex")
});

static TAG_FILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\btag:("([^"]*)"|([^"]\S*))(\s+|\b|$)"#).expect("valid tag regex")
});

static FEATURED_FILTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfeatured(\s+|\b|$)").expect("valid featured regex"));

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Free text, may embed `category:`, `tag:` and `featured`
    pub text: Option<String>,
    pub ids: Vec<String>,
    pub names: Vec<String>,
    pub page_size: u32,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
    pub source: Option<String>,
    pub include_pre_release: bool,
    pub target_platform: Option<TargetPlatform>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            text: None,
            ids: Vec::new(),
            names: Vec::new(),
            page_size: SEARCH_PAGE_SIZE,
            sort_by: None,
            sort_order: None,
            source: None,
            include_pre_release: false,
            target_platform: None,
        }
    }
}

/// Pull `pattern` matches out of `text`, adding one criterion per match
fn extract_filter(text: &str, pattern: &Regex, filter_type: FilterType, query: &mut Query) -> String {
    let mut values = Vec::new();
    let remaining = pattern.replace_all(text, |captures: &regex::Captures<'_>| {
        if let Some(value) = captures.get(2).or_else(|| captures.get(3)) {
            values.push(value.as_str().to_string());
        }
        ""
    });
    if !values.is_empty() {
        *query = query.with_filter(filter_type, values);
    }
    remaining.into_owned()
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Build the catalog query for a search
pub fn build_search_query(options: &SearchOptions) -> Query {
    let mut query = Query::new().with_page_size(1, options.page_size);
    let text = options.text.as_deref().unwrap_or_default();

    let text = extract_filter(text, &CATEGORY_FILTER, FilterType::Category, &mut query);
    let text = extract_filter(&text, &TAG_FILTER, FilterType::Tag, &mut query);
    let text = if FEATURED_FILTER.is_match(&text) {
        query = query.with_filter(FilterType::Featured, Vec::<String>::new());
        FEATURED_FILTER.replace_all(&text, "").into_owned()
    } else {
        text
    };

    let text = text.trim();
    if !text.is_empty() {
        query = query
            .with_filter(FilterType::SearchText, [truncate_chars(text, MAX_SEARCH_TEXT)])
            .with_sort_by(SortBy::NoneOrRelevance);
    } else if !options.ids.is_empty() {
        query = query.with_filter(FilterType::ExtensionId, options.ids.iter().cloned());
    } else if !options.names.is_empty() {
        query = query.with_filter(FilterType::ExtensionName, options.names.iter().cloned());
    } else {
        query = query.with_sort_by(SortBy::InstallCount);
    }

    if let Some(sort_by) = options.sort_by {
        query = query.with_sort_by(sort_by);
    }
    if let Some(sort_order) = options.sort_order {
        query = query.with_sort_order(sort_order);
    }
    if let Some(source) = &options.source {
        query = query.with_source(source.clone());
    }
    query
}

/// First page of a search plus lazy access to the others
pub struct SearchPager<'a> {
    client: &'a GalleryClient,
    query: Query,
    criteria: QueryCriteria,
    first_page: Vec<GalleryExtension>,
    total: u64,
}

impl SearchPager<'_> {
    pub fn first_page(&self) -> &[GalleryExtension] {
        &self.first_page
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn page_size(&self) -> u32 {
        self.query.page_size()
    }

    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(u64::from(self.page_size()))
    }

    /// Re-run the search for the zero-based page `index`
    pub async fn get_page(
        &self,
        index: u32,
        token: &CancellationToken,
    ) -> Result<Vec<GalleryExtension>> {
        if token.is_cancelled() {
            return Err(GalleryError::Cancelled);
        }
        let query = self.query.with_page(index.saturating_add(1));
        Ok(self.client.query(&query, &self.criteria, token).await?.extensions)
    }
}

impl GalleryClient {
    /// Run a search and keep its query for further pages
    pub async fn search(
        &self,
        options: &SearchOptions,
        token: &CancellationToken,
    ) -> Result<SearchPager<'_>> {
        let query = build_search_query(options);
        let criteria = QueryCriteria::new(
            options
                .target_platform
                .clone()
                .unwrap_or_else(TargetPlatform::current),
        )
        .with_default_criterion(SelectionCriterion::for_channel(options.include_pre_release));

        tracing::debug!(
            "Searching with filters [{}]",
            query.filter_types().join(", ")
        );
        let result = self.query(&query, &criteria, token).await?;

        Ok(SearchPager {
            client: self,
            query,
            criteria,
            first_page: result.extensions,
            total: result.total,
        })
    }
}
