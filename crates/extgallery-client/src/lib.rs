//! extgallery Client
//!
//! Async engine of the extension gallery client:
//!
//! - **Dual retrieval**: per-extension resource endpoint with a fallback host,
//!   reclassified into the paginated query endpoint when a renamed extension
//!   is not found
//! - **Version resolution**: exact, release, pre-release or latest under
//!   platform, allow list, engine and API proposal constraints
//! - **Assets**: primary/CDN fetch with exactly one fallback attempt
//! - **Search**: first page, total count and lazy page access
//!
//! ## Example
//!
//! ```rust,no_run
//! use extgallery_client::{ExtensionInfo, GalleryClient, GalleryConfig, GetExtensionsOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GalleryClient::new(GalleryConfig::load()?)?;
//! let token = CancellationToken::new();
//!
//! let found = client
//!     .get_extension(
//!         &ExtensionInfo::new("rust-lang.rust-analyzer"),
//!         &GetExtensionsOptions::default(),
//!         &token,
//!     )
//!     .await?;
//! if let Some(extension) = found {
//!     println!("{} {}", extension.identifier.id, extension.version);
//! }
//! # Ok(())
//! # }
//! ```

pub mod asset;
pub mod config;
pub mod error;
pub mod files;
pub mod gallery;
pub mod headers;
pub mod http;
pub mod policy;
pub mod search;
pub mod selector;
pub mod stats;
pub mod telemetry;

// Re-exports for convenience
pub use asset::{AssetFetcher, AssetRequest};
pub use config::{AllowedValue, ExtensionOverride, GalleryConfig, ProductInfo};
pub use error::{GalleryError, GalleryErrorCode, Result};
pub use files::{FileService, LocalFileService};
pub use gallery::{
    ExtensionInfo, GalleryClient, GalleryServices, GetExtensionsOptions, InstallOperation,
    QueryCriteria, QueryResult, VersionSummary,
};
pub use headers::{HeadersSource, ProductHeaders};
pub use http::{HttpRequestService, RequestContext, RequestOptions, RequestService};
pub use policy::{AllowListPolicy, AllowedExtensionsPolicy, ConfiguredOverrides, ProductOverrides};
pub use search::{SearchOptions, SearchPager, build_search_query};
pub use stats::StatisticType;
pub use telemetry::{NoopTelemetry, TelemetrySink, TracingTelemetry};
