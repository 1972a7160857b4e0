//! extgallery Core - data model and pure logic of the extension gallery client
//!
//! This crate holds everything that does not need the network:
//! - `CatalogEntry` / `CatalogVersion`: registry records, validated at the boundary
//! - `Query`: immutable catalog query builder and its wire body
//! - `reconcile`: flag reconciliation for both query strategies
//! - `TargetPlatform`: platform set derivation and compatibility
//! - `ResolvedAsset`: primary and fallback asset locations
//! - `GalleryExtension`: the normalized record handed to callers

pub mod assets;
pub mod catalog;
pub mod compat;
pub mod error;
pub mod extension;
pub mod flags;
pub mod platform;
pub mod query;
pub mod selection;

pub use assets::{ResolvedAsset, asset_types, download_asset, expand_resource_template, version_asset};
pub use catalog::{CatalogEntry, CatalogVersion, Publisher, RawGalleryExtension, Statistics, VersionProperties};
pub use compat::{are_api_proposals_compatible, is_engine_compatible, parse_product_version};
pub use error::{CoreError, Result};
pub use extension::{ExtensionAssets, ExtensionIdentifier, ExtensionProperties, GalleryExtension};
pub use flags::{BatchIntent, ChannelIntent, FlagStrategy, reconcile};
pub use platform::{TargetPlatform, all_target_platforms, is_target_platform_compatible};
pub use query::{FilterType, Flag, Query, SortBy, SortOrder};
pub use selection::{SelectionCriterion, sort_versions};
