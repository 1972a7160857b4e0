//! Gallery client
//!
//! Turns extension identities into registry requests. Identities without an
//! exact version go to the resource endpoint when one is configured; a 404
//! there for an identity with a uuid is retried through the query endpoint,
//! which also serves exact versions and everything else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use extgallery_core::assets::asset_types;
use extgallery_core::flags::has_all_versions;
use extgallery_core::platform::is_not_web_extension_in_web_platform;
use extgallery_core::query::flags_to_bits;
use extgallery_core::{
    BatchIntent, CatalogEntry, CatalogVersion, ChannelIntent, ExtensionIdentifier, FilterType,
    Flag, FlagStrategy, GalleryExtension, Query, RawGalleryExtension, ResolvedAsset,
    SelectionCriterion, TargetPlatform, all_target_platforms, expand_resource_template,
    is_target_platform_compatible, parse_product_version, reconcile, sort_versions,
};

use crate::asset::{AssetFetcher, AssetRequest};
use crate::config::GalleryConfig;
use crate::error::{GalleryError, Result};
use crate::files::{FileService, LocalFileService};
use crate::headers::{HeadersSource, ProductHeaders, SEARCH_ACTIVITY_HEADER};
use crate::http::{HttpRequestService, RequestOptions, RequestService};
use crate::policy::{
    AllowListPolicy, AllowedExtensionsPolicy, ConfiguredOverrides, ProductOverrides,
};
use crate::selector::{Candidate, ManifestLoader, VersionRequest, VersionSelector};
use crate::stats::{StatisticReport, StatisticType, StatisticsReporter};
use crate::telemetry::{TelemetrySink, TracingTelemetry, events, properties};

/// Manifest key holding the engine requirement
pub const MANIFEST_ENGINE_KEY: &str = "vscode";

/// Collaborators of the client
#[derive(Clone)]
pub struct GalleryServices {
    pub requests: Arc<dyn RequestService>,
    pub files: Arc<dyn FileService>,
    pub headers: Arc<dyn HeadersSource>,
    pub policy: Arc<dyn AllowListPolicy>,
    pub overrides: Arc<dyn ProductOverrides>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl GalleryServices {
    /// Default implementations configured from `config`
    pub fn from_config(config: &GalleryConfig) -> Result<Self> {
        Ok(Self {
            requests: Arc::new(HttpRequestService::new()?),
            files: Arc::new(LocalFileService),
            headers: Arc::new(ProductHeaders::new(config.product.clone())),
            policy: Arc::new(AllowedExtensionsPolicy::new(
                config.allowed_extensions.clone(),
            )),
            overrides: Arc::new(ConfiguredOverrides::new(
                config.extension_properties.clone(),
            )),
            telemetry: Arc::new(TracingTelemetry),
        })
    }
}

/// One identity to resolve
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInfo {
    /// `publisher.name`
    pub id: String,
    #[serde(default)]
    pub uuid: Option<String>,
    /// Exact version wanted
    #[serde(default)]
    pub version: Option<String>,
    /// Accept pre-release versions
    #[serde(default)]
    pub pre_release: bool,
}

impl ExtensionInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_pre_release(mut self, pre_release: bool) -> Self {
        self.pre_release = pre_release;
        self
    }

    pub fn identifier(&self) -> ExtensionIdentifier {
        ExtensionIdentifier {
            id: self.id.clone(),
            uuid: self.uuid.clone(),
        }
    }

    pub fn criterion(&self) -> SelectionCriterion {
        match &self.version {
            Some(version) => SelectionCriterion::ExactVersion(version.clone()),
            None => SelectionCriterion::for_channel(self.pre_release),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetExtensionsOptions {
    /// Only return versions the product can run
    pub compatible: bool,
    pub query_all_versions: bool,
    /// Defaults to the running platform
    pub target_platform: Option<TargetPlatform>,
    pub source: Option<String>,
}

/// How the entries of a query response are resolved to versions
#[derive(Debug, Clone)]
pub struct QueryCriteria {
    pub target_platform: TargetPlatform,
    pub compatible: bool,
    /// Used for entries without their own selection
    pub default_criterion: SelectionCriterion,
    pub selections: Vec<(ExtensionIdentifier, SelectionCriterion)>,
}

impl QueryCriteria {
    pub fn new(target_platform: TargetPlatform) -> Self {
        Self {
            target_platform,
            compatible: false,
            default_criterion: SelectionCriterion::Release,
            selections: Vec::new(),
        }
    }

    pub fn with_compatible(mut self, compatible: bool) -> Self {
        self.compatible = compatible;
        self
    }

    pub fn with_default_criterion(mut self, criterion: SelectionCriterion) -> Self {
        self.default_criterion = criterion;
        self
    }

    fn criterion_for(&self, entry: &CatalogEntry) -> SelectionCriterion {
        let identifier = ExtensionIdentifier {
            id: entry.id(),
            uuid: entry.uuid.clone(),
        };
        self.selections
            .iter()
            .find(|(wanted, _)| wanted.matches(&identifier))
            .map(|(_, criterion)| criterion.clone())
            .unwrap_or_else(|| self.default_criterion.clone())
    }

    fn request_for(&self, entry: &CatalogEntry) -> VersionRequest {
        VersionRequest {
            criterion: self.criterion_for(entry),
            target_platform: self.target_platform.clone(),
            compatible: self.compatible,
        }
    }

    fn intent(&self, needs_all_versions: bool) -> BatchIntent {
        let criteria: Vec<&SelectionCriterion> = if self.selections.is_empty() {
            vec![&self.default_criterion]
        } else {
            self.selections.iter().map(|(_, c)| c).collect()
        };
        BatchIntent {
            exact_versions: criteria.iter().any(|c| c.exact_version().is_some()),
            needs_all_versions,
            channel: ChannelIntent::from_pre_release(criteria.iter().filter_map(|c| match c {
                SelectionCriterion::Release => Some(false),
                SelectionCriterion::Prerelease | SelectionCriterion::Latest => Some(true),
                SelectionCriterion::ExactVersion(_) => None,
            })),
        }
    }
}

/// Resolved entries of one query page
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub extensions: Vec<GalleryExtension>,
    /// Total matches across all pages
    pub total: u64,
}

/// One compatible version of an extension
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version: String,
    pub date: Option<DateTime<Utc>>,
    pub is_pre_release: bool,
}

/// Why a package is downloaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallOperation {
    #[default]
    None,
    Install,
    Update,
}

impl InstallOperation {
    fn query_param(self) -> Option<&'static str> {
        match self {
            InstallOperation::None => None,
            InstallOperation::Install => Some("install"),
            InstallOperation::Update => Some("update"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQueryResponse {
    #[serde(default)]
    results: Vec<RawQueryResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQueryResult {
    #[serde(default)]
    extensions: Vec<RawGalleryExtension>,
    #[serde(default)]
    result_metadata: Vec<RawResultMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResultMetadata {
    #[serde(default)]
    metadata_type: String,
    #[serde(default)]
    metadata_items: Vec<RawMetadataItem>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadataItem {
    #[serde(default)]
    name: String,
    #[serde(default)]
    count: u64,
}

/// Validated entries of one response
#[derive(Debug, Default)]
struct QueryPage {
    entries: Vec<CatalogEntry>,
    total: u64,
    context: BTreeMap<String, String>,
}

impl QueryPage {
    fn from_response(response: RawQueryResponse, activity_id: Option<String>) -> Self {
        let Some(result) = response.results.into_iter().next() else {
            return Self::default();
        };

        let total = result
            .result_metadata
            .iter()
            .filter(|m| m.metadata_type == "ResultCount")
            .flat_map(|m| m.metadata_items.iter())
            .find(|item| item.name == "TotalCount")
            .map(|item| item.count);

        let entries: Vec<CatalogEntry> = result
            .extensions
            .into_iter()
            .filter_map(|raw| match CatalogEntry::from_raw(raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping malformed gallery entry: {}", e);
                    None
                }
            })
            .collect();

        let mut context = BTreeMap::new();
        if let Some(id) = activity_id {
            context.insert(SEARCH_ACTIVITY_HEADER.to_string(), id);
        }

        Self {
            total: total.unwrap_or(entries.len() as u64),
            entries,
            context,
        }
    }
}

enum ResourceOutcome {
    Resolved(Result<Option<GalleryExtension>>),
    Requeue,
}

/// Reads engine requirements through the asset fetcher
struct AssetManifestLoader<'a> {
    fetcher: &'a AssetFetcher,
    headers: &'a BTreeMap<String, String>,
}

#[async_trait]
impl ManifestLoader for AssetManifestLoader<'_> {
    async fn load_engine(
        &self,
        extension_id: &str,
        manifest: &ResolvedAsset,
        token: &CancellationToken,
    ) -> Result<Option<String>> {
        let request = AssetRequest {
            extension_id,
            asset_type: asset_types::MANIFEST,
            headers: self.headers,
        };
        let text = self.fetcher.fetch_text(manifest, &request, token).await?;
        let manifest: serde_json::Value = serde_json::from_str(&text)?;
        Ok(manifest
            .get("engines")
            .and_then(|engines| engines.get(MANIFEST_ENGINE_KEY))
            .and_then(|engine| engine.as_str())
            .map(str::to_string))
    }
}

/// Whether a latest-only answer is not enough to resolve `entry`
fn needs_all_versions(
    entry: &CatalogEntry,
    selected: Option<&CatalogVersion>,
    request: &VersionRequest,
    all_platforms: &[TargetPlatform],
) -> bool {
    let Some(latest) = entry.latest_version() else {
        return false;
    };
    let Some(selected) = selected else {
        return true;
    };
    if request.criterion == SelectionCriterion::Release && selected.is_pre_release() {
        return true;
    }
    let has_release = entry.versions.iter().any(|v| !v.is_pre_release());
    if latest.is_pre_release() && !has_release {
        return true;
    }
    let has_pre_release = entry.versions.iter().any(CatalogVersion::is_pre_release);
    has_pre_release
        && !selected.is_pre_release()
        && !is_target_platform_compatible(
            &selected.platform(),
            all_platforms,
            &request.target_platform,
        )
}

fn identity_filters(query: Query, identifiers: &[ExtensionIdentifier]) -> Query {
    let uuids: Vec<String> = identifiers.iter().filter_map(|i| i.uuid.clone()).collect();
    let names: Vec<String> = identifiers
        .iter()
        .filter(|i| i.uuid.is_none())
        .map(|i| i.id.clone())
        .collect();

    let mut query = query;
    if !uuids.is_empty() {
        query = query.with_filter(FilterType::ExtensionId, uuids);
    }
    if !names.is_empty() {
        query = query.with_filter(FilterType::ExtensionName, names);
    }
    query
}

/// Extension gallery client
pub struct GalleryClient {
    config: GalleryConfig,
    product_version: Version,
    api_proposals: HashMap<String, Option<u32>>,
    services: GalleryServices,
    assets: AssetFetcher,
    common_headers: OnceCell<BTreeMap<String, String>>,
    statistics: StatisticsReporter,
}

impl GalleryClient {
    /// Client with the default collaborators
    pub fn new(config: GalleryConfig) -> Result<Self> {
        let services = GalleryServices::from_config(&config)?;
        Self::with_services(config, services)
    }

    /// Client with caller-supplied collaborators.
    ///
    /// Must be called inside a tokio runtime for statistics to be sent.
    pub fn with_services(config: GalleryConfig, services: GalleryServices) -> Result<Self> {
        config.validate()?;
        let product_version = parse_product_version(&config.product.version)?;
        let assets = AssetFetcher::new(
            services.requests.clone(),
            services.files.clone(),
            services.telemetry.clone(),
        );
        let statistics = StatisticsReporter::spawn(
            services.requests.clone(),
            config.service_url.clone(),
            config.request_timeout(),
        );

        Ok(Self {
            api_proposals: config.api_proposal_map(),
            product_version,
            config,
            services,
            assets,
            common_headers: OnceCell::new(),
            statistics,
        })
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Replace the configuration.
    ///
    /// Policy, overrides and headers are rebuilt from the new configuration;
    /// the memoized common headers are dropped.
    pub fn reconfigure(&mut self, config: GalleryConfig) -> Result<()> {
        config.validate()?;
        self.product_version = parse_product_version(&config.product.version)?;
        self.api_proposals = config.api_proposal_map();
        self.services.headers = Arc::new(ProductHeaders::new(config.product.clone()));
        self.services.policy = Arc::new(AllowedExtensionsPolicy::new(
            config.allowed_extensions.clone(),
        ));
        self.services.overrides = Arc::new(ConfiguredOverrides::new(
            config.extension_properties.clone(),
        ));
        if config.service_url != self.config.service_url {
            self.statistics = StatisticsReporter::spawn(
                self.services.requests.clone(),
                config.service_url.clone(),
                config.request_timeout(),
            );
        }
        self.common_headers = OnceCell::new();
        self.config = config;
        tracing::debug!("Gallery client reconfigured");
        Ok(())
    }

    async fn common_headers(&self) -> Result<&BTreeMap<String, String>> {
        self.common_headers
            .get_or_try_init(|| self.services.headers.headers())
            .await
    }

    fn selector<'a>(&'a self, manifests: &'a AssetManifestLoader<'a>) -> VersionSelector<'a> {
        VersionSelector {
            product_version: &self.product_version,
            api_proposals: &self.api_proposals,
            policy: self.services.policy.as_ref(),
            overrides: self.services.overrides.as_ref(),
            manifests,
        }
    }

    async fn select_version(
        &self,
        entry: &CatalogEntry,
        all_platforms: &[TargetPlatform],
        request: &VersionRequest,
        token: &CancellationToken,
    ) -> Result<Option<CatalogVersion>> {
        let headers = self.common_headers().await?;
        let loader = AssetManifestLoader {
            fetcher: &self.assets,
            headers,
        };
        self.selector(&loader)
            .select(entry, all_platforms, request, token)
            .await
    }

    /// Resolve a batch of identities.
    ///
    /// One outcome per input, in input order. A failing identity never
    /// affects the others, except that identities sharing one query share its
    /// transport failure.
    pub async fn get_extensions(
        &self,
        infos: &[ExtensionInfo],
        options: &GetExtensionsOptions,
        token: &CancellationToken,
    ) -> Vec<Result<Option<GalleryExtension>>> {
        let target = options
            .target_platform
            .clone()
            .unwrap_or_else(TargetPlatform::current);

        let mut outcomes: Vec<Option<Result<Option<GalleryExtension>>>> =
            infos.iter().map(|_| None).collect();
        let mut resource_path = Vec::new();
        let mut query_path = Vec::new();

        for (index, info) in infos.iter().enumerate() {
            let has_resource = self.config.resource_url_template.is_some()
                && info.identifier().publisher_and_name().is_some();
            if info.version.is_none() && has_resource {
                resource_path.push(index);
            } else {
                query_path.push(index);
            }
        }

        let lookups = resource_path
            .iter()
            .map(|&index| self.get_from_resource(&infos[index], options, &target, token));
        let resolved = join_all(lookups).await;

        for (index, outcome) in resource_path.into_iter().zip(resolved) {
            match outcome {
                ResourceOutcome::Resolved(result) => outcomes[index] = Some(result),
                ResourceOutcome::Requeue => query_path.push(index),
            }
        }
        query_path.sort_unstable();

        if !query_path.is_empty() {
            let batch: Vec<&ExtensionInfo> = query_path.iter().map(|&i| &infos[i]).collect();
            match self
                .query_by_identities(&batch, options, &target, token)
                .await
            {
                Ok(found) => {
                    for &index in &query_path {
                        let identifier = infos[index].identifier();
                        let extension = found
                            .iter()
                            .find(|e| e.identifier.matches(&identifier))
                            .cloned();
                        outcomes[index] = Some(Ok(extension));
                    }
                }
                Err(e) => {
                    tracing::debug!("Gallery query for {} identities failed: {}", batch.len(), e);
                    for &index in &query_path {
                        outcomes[index] = Some(Err(e.clone()));
                    }
                }
            }
        }

        outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or(Ok(None)))
            .collect()
    }

    /// Resolve a single identity
    pub async fn get_extension(
        &self,
        info: &ExtensionInfo,
        options: &GetExtensionsOptions,
        token: &CancellationToken,
    ) -> Result<Option<GalleryExtension>> {
        self.get_extensions(std::slice::from_ref(info), options, token)
            .await
            .into_iter()
            .next()
            .unwrap_or(Ok(None))
    }

    async fn get_from_resource(
        &self,
        info: &ExtensionInfo,
        options: &GetExtensionsOptions,
        target: &TargetPlatform,
        token: &CancellationToken,
    ) -> ResourceOutcome {
        let identifier = info.identifier();
        let (Some((publisher, name)), Some(template)) = (
            identifier.publisher_and_name(),
            self.config.resource_url_template.as_deref(),
        ) else {
            return ResourceOutcome::Requeue;
        };

        let result = match self.fetch_resource(template, publisher, name, token).await {
            Err(e) if !e.is_cancelled() && !matches!(e, GalleryError::NotFound { .. }) => {
                match self.config.fallback_resource_url_template.as_deref() {
                    Some(fallback) => {
                        tracing::warn!(
                            "Resource lookup of {} failed, trying fallback: {}",
                            info.id,
                            e
                        );
                        self.services.telemetry.public_log(
                            events::RESOURCE_FALLBACK,
                            &properties([
                                ("extensionId", info.id.clone()),
                                ("errorCode", e.code().to_string()),
                                ("message", e.to_string()),
                            ]),
                        );
                        if token.is_cancelled() {
                            Err(GalleryError::Cancelled)
                        } else {
                            self.fetch_resource(fallback, publisher, name, token).await
                        }
                    }
                    None => Err(e),
                }
            }
            other => other,
        };

        match result {
            Ok(raw) => ResourceOutcome::Resolved(
                self.resolve_resource_entry(raw, info, options, target, token)
                    .await,
            ),
            Err(GalleryError::NotFound { .. }) if info.uuid.is_some() => {
                tracing::debug!("{} not found as a resource, querying instead", info.id);
                ResourceOutcome::Requeue
            }
            Err(GalleryError::NotFound { .. }) => ResourceOutcome::Resolved(Ok(None)),
            Err(e) => ResourceOutcome::Resolved(Err(e)),
        }
    }

    async fn fetch_resource(
        &self,
        template: &str,
        publisher: &str,
        name: &str,
        token: &CancellationToken,
    ) -> Result<RawGalleryExtension> {
        let url = expand_resource_template(template, publisher, name)?;
        let headers = self.common_headers().await?;
        let options = RequestOptions::get(url.clone())
            .with_headers(headers)
            .with_timeout(self.config.request_timeout());

        let context = self.services.requests.request(options, token).await?;
        match context.status {
            404 => Err(GalleryError::NotFound {
                message: format!("{}.{}", publisher, name),
            }),
            status if !context.is_success() => Err(GalleryError::failed(format!(
                "Resource request to {} answered {}",
                url, status
            ))),
            _ => context.json(token).await,
        }
    }

    async fn resolve_resource_entry(
        &self,
        raw: RawGalleryExtension,
        info: &ExtensionInfo,
        options: &GetExtensionsOptions,
        target: &TargetPlatform,
        token: &CancellationToken,
    ) -> Result<Option<GalleryExtension>> {
        let entry = CatalogEntry::from_raw(raw)?;
        let all_platforms = all_target_platforms(&entry.versions, &entry.tags);
        let request = VersionRequest {
            criterion: info.criterion(),
            target_platform: target.clone(),
            compatible: options.compatible,
        };
        let selected = self
            .select_version(&entry, &all_platforms, &request, token)
            .await?;
        Ok(selected.map(|version| {
            GalleryExtension::from_entry(&entry, &version, all_platforms, BTreeMap::new())
        }))
    }

    async fn query_by_identities(
        &self,
        infos: &[&ExtensionInfo],
        options: &GetExtensionsOptions,
        target: &TargetPlatform,
        token: &CancellationToken,
    ) -> Result<Vec<GalleryExtension>> {
        let identifiers: Vec<ExtensionIdentifier> =
            infos.iter().map(|info| info.identifier()).collect();
        let mut query = identity_filters(
            Query::new().with_page_size(1, infos.len() as u32),
            &identifiers,
        );
        if options.query_all_versions {
            query = query.with_flags([Flag::IncludeVersions]);
        }
        if let Some(source) = &options.source {
            query = query.with_source(source.clone());
        }

        let criteria = QueryCriteria {
            target_platform: target.clone(),
            compatible: options.compatible,
            default_criterion: SelectionCriterion::Release,
            selections: infos
                .iter()
                .map(|info| (info.identifier(), info.criterion()))
                .collect(),
        };
        Ok(self.query(&query, &criteria, token).await?.extensions)
    }

    /// Reconcile flags and add the product target criterion
    fn prepare(&self, query: &Query, intent: &BatchIntent) -> Query {
        let query = reconcile(query, self.config.query_strategy, intent);
        let product = self.config.target_product.as_str();
        if query.has_criterion(FilterType::Target, Some(product)) {
            query
        } else {
            query.with_filter(FilterType::Target, [product])
        }
    }

    async fn execute(&self, query: &Query, token: &CancellationToken) -> Result<QueryPage> {
        if token.is_cancelled() {
            return Err(GalleryError::Cancelled);
        }

        let body = serde_json::to_vec(&query.to_request_body())?;
        let headers = self.common_headers().await?;
        let options = RequestOptions::post(self.config.query_url(), body)
            .with_headers(headers)
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json;api-version=3.0-preview.1")
            .with_header("Accept-Encoding", "gzip")
            .with_timeout(self.config.request_timeout());

        let started = Instant::now();
        let outcome = self.services.requests.request(options, token).await;

        let mut props = properties([
            ("filterTypes", query.filter_types().join(",")),
            ("flags", flags_to_bits(query.flags()).to_string()),
            ("sortBy", query.sort_by().code().to_string()),
            ("sortOrder", query.sort_order().code().to_string()),
            ("pageNumber", query.page_number().to_string()),
            ("source", query.source().unwrap_or_default().to_string()),
            ("duration", started.elapsed().as_millis().to_string()),
        ]);
        match &outcome {
            Ok(context) => {
                props.insert("statusCode".to_string(), context.status.to_string());
                props.insert("success".to_string(), context.is_success().to_string());
            }
            Err(e) => {
                props.insert("success".to_string(), "false".to_string());
                props.insert("errorCode".to_string(), e.code().to_string());
            }
        }
        self.services.telemetry.public_log(events::QUERY, &props);

        let context = match outcome {
            Ok(context) => context,
            Err(e) => {
                self.report_request_error(&e);
                return Err(e);
            }
        };

        if (400..500).contains(&context.status) {
            tracing::debug!("Gallery query answered {}, treating as empty", context.status);
            return Ok(QueryPage::default());
        }
        if !context.is_success() {
            let error = GalleryError::failed(format!(
                "Gallery query failed with status {}",
                context.status
            ));
            self.report_request_error(&error);
            return Err(error);
        }

        let activity_id = context.header("activityid").map(str::to_string);
        let response: RawQueryResponse = context.json(token).await?;
        if token.is_cancelled() {
            return Err(GalleryError::Cancelled);
        }
        let page = QueryPage::from_response(response, activity_id);
        tracing::debug!(
            "Gallery query returned {} of {} entries",
            page.entries.len(),
            page.total
        );
        Ok(page)
    }

    fn report_request_error(&self, error: &GalleryError) {
        self.services.telemetry.public_log(
            events::REQUEST_ERROR,
            &properties([
                ("url", self.config.query_url()),
                ("errorCode", error.code().to_string()),
                ("message", error.to_string()),
            ]),
        );
    }

    /// Run a query and resolve one version per returned entry.
    ///
    /// Entries keep the registry's order.
    pub async fn query(
        &self,
        query: &Query,
        criteria: &QueryCriteria,
        token: &CancellationToken,
    ) -> Result<QueryResult> {
        let strategy = self.config.query_strategy;
        let query = self.prepare(query, &criteria.intent(false));
        let page = self.execute(&query, token).await?;
        let fetched_all = has_all_versions(&query);

        let mut slots: Vec<Option<GalleryExtension>> = Vec::with_capacity(page.entries.len());
        let mut retry: Vec<usize> = Vec::new();

        for (index, entry) in page.entries.iter().enumerate() {
            let all_platforms = all_target_platforms(&entry.versions, &entry.tags);
            let request = criteria.request_for(entry);
            let selected = self
                .select_version(entry, &all_platforms, &request, token)
                .await?;

            if !fetched_all
                && strategy == FlagStrategy::AllVersionsFallback
                && needs_all_versions(entry, selected.as_ref(), &request, &all_platforms)
            {
                retry.push(index);
                slots.push(None);
                continue;
            }

            slots.push(selected.map(|version| {
                GalleryExtension::from_entry(entry, &version, all_platforms, page.context.clone())
            }));
        }

        if !retry.is_empty() {
            tracing::debug!("Re-querying {} entries with all versions", retry.len());
            let identifiers: Vec<ExtensionIdentifier> = retry
                .iter()
                .map(|&i| ExtensionIdentifier {
                    id: page.entries[i].id(),
                    uuid: page.entries[i].uuid.clone(),
                })
                .collect();

            let mut second = identity_filters(
                Query::new().with_page_size(1, retry.len() as u32),
                &identifiers,
            )
            .with_flags(query.flags().iter().copied())
            .with_asset_types(query.asset_types().iter().cloned());
            if let Some(source) = query.source() {
                second = second.with_source(source);
            }
            let second = self.prepare(&second, &criteria.intent(true));
            let again = self.execute(&second, token).await?;

            for entry in &again.entries {
                let identifier = ExtensionIdentifier {
                    id: entry.id(),
                    uuid: entry.uuid.clone(),
                };
                let Some(position) = identifiers.iter().position(|i| i.matches(&identifier))
                else {
                    continue;
                };
                let all_platforms = all_target_platforms(&entry.versions, &entry.tags);
                let request = criteria.request_for(entry);
                let selected = self
                    .select_version(entry, &all_platforms, &request, token)
                    .await?;
                slots[retry[position]] = selected.map(|version| {
                    GalleryExtension::from_entry(
                        entry,
                        &version,
                        all_platforms,
                        page.context.clone(),
                    )
                });
            }
        }

        Ok(QueryResult {
            extensions: slots.into_iter().flatten().collect(),
            total: page.total,
        })
    }

    /// The extension itself when its version runs here, else the newest
    /// version that does
    pub async fn get_compatible_extension(
        &self,
        extension: &GalleryExtension,
        include_pre_release: bool,
        target_platform: &TargetPlatform,
        token: &CancellationToken,
    ) -> Result<Option<GalleryExtension>> {
        if is_not_web_extension_in_web_platform(&extension.all_target_platforms, target_platform)
        {
            return Ok(None);
        }
        if self
            .check_extension_compatible(extension, include_pre_release, target_platform, token)
            .await?
        {
            return Ok(Some(extension.clone()));
        }

        let query = identity_filters(
            Query::new().with_page_size(1, 1),
            std::slice::from_ref(&extension.identifier),
        )
        .with_flags([Flag::IncludeVersions]);
        let criteria = QueryCriteria::new(target_platform.clone())
            .with_compatible(true)
            .with_default_criterion(SelectionCriterion::for_channel(include_pre_release));
        Ok(self
            .query(&query, &criteria, token)
            .await?
            .extensions
            .into_iter()
            .next())
    }

    /// Whether the extension's current version runs on `target_platform`
    pub async fn is_extension_compatible(
        &self,
        extension: &GalleryExtension,
        include_pre_release: bool,
        target_platform: &TargetPlatform,
    ) -> Result<bool> {
        self.check_extension_compatible(
            extension,
            include_pre_release,
            target_platform,
            &CancellationToken::new(),
        )
        .await
    }

    async fn check_extension_compatible(
        &self,
        extension: &GalleryExtension,
        include_pre_release: bool,
        target_platform: &TargetPlatform,
        token: &CancellationToken,
    ) -> Result<bool> {
        if !include_pre_release && extension.properties.is_pre_release_version {
            return Ok(false);
        }
        let candidate = Candidate::from_extension(extension);
        if !is_target_platform_compatible(
            &candidate.platform,
            &extension.all_target_platforms,
            target_platform,
        ) {
            return Ok(false);
        }

        let headers = self.common_headers().await?;
        let loader = AssetManifestLoader {
            fetcher: &self.assets,
            headers,
        };
        self.selector(&loader)
            .is_compatible(&candidate, target_platform, token)
            .await
    }

    /// Every version of an extension the product can run, newest first
    pub async fn get_all_compatible_versions(
        &self,
        identifier: &ExtensionIdentifier,
        include_pre_release: bool,
        target_platform: &TargetPlatform,
        token: &CancellationToken,
    ) -> Result<Vec<VersionSummary>> {
        let query = identity_filters(
            Query::new().with_page_size(1, 1),
            std::slice::from_ref(identifier),
        )
        .with_flags([Flag::IncludeVersions]);
        let intent = BatchIntent {
            needs_all_versions: true,
            ..Default::default()
        };
        let query = self.prepare(&query, &intent);
        let page = self.execute(&query, token).await?;
        let Some(entry) = page.entries.first() else {
            return Ok(Vec::new());
        };

        let all_platforms = all_target_platforms(&entry.versions, &entry.tags);
        let request = VersionRequest {
            criterion: SelectionCriterion::for_channel(include_pre_release),
            target_platform: target_platform.clone(),
            compatible: true,
        };
        let headers = self.common_headers().await?;
        let loader = AssetManifestLoader {
            fetcher: &self.assets,
            headers,
        };
        let selector = self.selector(&loader);

        let mut seen = HashSet::new();
        let mut versions = Vec::new();
        for version in sort_versions(entry.versions.clone(), target_platform) {
            if seen.contains(&version.version) {
                continue;
            }
            if selector
                .is_valid_version(entry, &version, &all_platforms, &request, token)
                .await?
            {
                seen.insert(version.version.clone());
                versions.push(VersionSummary {
                    date: version.last_updated,
                    is_pre_release: version.is_pre_release(),
                    version: version.version,
                });
            }
        }
        Ok(versions)
    }

    async fn fetch_asset_text(
        &self,
        extension: &GalleryExtension,
        asset: &ResolvedAsset,
        asset_type: &str,
        token: &CancellationToken,
    ) -> Result<String> {
        let headers = self.common_headers().await?;
        let request = AssetRequest {
            extension_id: &extension.identifier.id,
            asset_type,
            headers,
        };
        self.assets.fetch_text(asset, &request, token).await
    }

    /// Parsed package manifest, if the version publishes one
    pub async fn get_manifest(
        &self,
        extension: &GalleryExtension,
        token: &CancellationToken,
    ) -> Result<Option<serde_json::Value>> {
        let Some(asset) = &extension.assets.manifest else {
            return Ok(None);
        };
        let text = self
            .fetch_asset_text(extension, asset, asset_types::MANIFEST, token)
            .await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Readme text; empty when the version has none
    pub async fn get_readme(
        &self,
        extension: &GalleryExtension,
        token: &CancellationToken,
    ) -> Result<String> {
        match &extension.assets.readme {
            Some(asset) => {
                self.fetch_asset_text(extension, asset, asset_types::DETAILS, token)
                    .await
            }
            None => Ok(String::new()),
        }
    }

    /// Changelog text; empty when the version has none
    pub async fn get_changelog(
        &self,
        extension: &GalleryExtension,
        token: &CancellationToken,
    ) -> Result<String> {
        match &extension.assets.changelog {
            Some(asset) => {
                self.fetch_asset_text(extension, asset, asset_types::CHANGELOG, token)
                    .await
            }
            None => Ok(String::new()),
        }
    }

    /// Core translation bundle for `language`
    pub async fn get_core_translation(
        &self,
        extension: &GalleryExtension,
        language: &str,
        token: &CancellationToken,
    ) -> Result<Option<serde_json::Value>> {
        let Some(asset) = extension
            .assets
            .core_translations
            .get(&language.to_uppercase())
        else {
            return Ok(None);
        };
        let asset_type = asset_types::core_translation(language);
        let text = self
            .fetch_asset_text(extension, asset, &asset_type, token)
            .await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Stream the package archive to `destination`
    pub async fn download(
        &self,
        extension: &GalleryExtension,
        destination: &Path,
        operation: InstallOperation,
        token: &CancellationToken,
    ) -> Result<u64> {
        let asset = extension.assets.download.as_ref().ok_or_else(|| {
            GalleryError::failed(format!(
                "No package published for {}@{}",
                extension.identifier.id, extension.version
            ))
        })?;
        let asset = match operation.query_param() {
            Some(key) => asset.with_query_param(key, "true"),
            None => asset.clone(),
        };

        let mut headers = self.common_headers().await?.clone();
        headers.extend(
            extension
                .query_context
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let request = AssetRequest {
            extension_id: &extension.identifier.id,
            asset_type: asset_types::PACKAGE,
            headers: &headers,
        };

        let started = Instant::now();
        let result = self
            .assets
            .download(&asset, &request, destination, token)
            .await;
        self.services.telemetry.public_log(
            events::DOWNLOAD,
            &properties([
                ("extensionId", extension.identifier.id.clone()),
                ("version", extension.version.clone()),
                ("duration", started.elapsed().as_millis().to_string()),
                ("success", result.is_ok().to_string()),
            ]),
        );
        result
    }

    /// Stream the signature archive to `destination`
    pub async fn download_signature_archive(
        &self,
        extension: &GalleryExtension,
        destination: &Path,
        token: &CancellationToken,
    ) -> Result<u64> {
        let asset = extension.assets.signature.as_ref().ok_or_else(|| {
            GalleryError::failed(format!(
                "No signature published for {}@{}",
                extension.identifier.id, extension.version
            ))
        })?;
        let headers = self.common_headers().await?;
        let request = AssetRequest {
            extension_id: &extension.identifier.id,
            asset_type: asset_types::SIGNATURE,
            headers,
        };
        self.assets
            .download(asset, &request, destination, token)
            .await
    }

    /// Wait for queued statistics, then drop the client
    pub async fn close(self) {
        self.statistics.close().await;
    }

    /// Queue an install or uninstall report; never fails
    pub async fn report_statistic(
        &self,
        publisher: &str,
        name: &str,
        version: &str,
        statistic: StatisticType,
    ) {
        let headers = match self.common_headers().await {
            Ok(headers) => headers.clone(),
            Err(e) => {
                tracing::debug!("Statistic not reported: {}", e);
                return;
            }
        };
        self.statistics.report(StatisticReport {
            publisher: publisher.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            statistic,
            headers,
        });
    }
}
