//! Asset retrieval with CDN fallback
//!
//! Every asset is tried at its primary location first. A non-2xx answer or a
//! transport failure falls back to the registry location exactly once, and
//! whatever that yields is the result.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use extgallery_core::ResolvedAsset;

use crate::error::{GalleryError, Result};
use crate::files::FileService;
use crate::http::{RequestContext, RequestOptions, RequestService};
use crate::telemetry::{TelemetrySink, events, properties};

/// Which asset of which extension is being fetched
#[derive(Debug, Clone, Copy)]
pub struct AssetRequest<'a> {
    pub extension_id: &'a str,
    pub asset_type: &'a str,
    pub headers: &'a BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct AssetFetcher {
    requests: Arc<dyn RequestService>,
    files: Arc<dyn FileService>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl AssetFetcher {
    pub fn new(
        requests: Arc<dyn RequestService>,
        files: Arc<dyn FileService>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            requests,
            files,
            telemetry,
        }
    }

    /// Fetch from the primary, then the fallback once
    pub async fn fetch(
        &self,
        asset: &ResolvedAsset,
        request: &AssetRequest<'_>,
        token: &CancellationToken,
    ) -> Result<RequestContext> {
        let primary = self
            .requests
            .request(
                RequestOptions::get(&asset.uri).with_headers(request.headers),
                token,
            )
            .await;

        let message = match primary {
            Ok(context) if context.is_success() => return Ok(context),
            Err(GalleryError::Cancelled) => return Err(GalleryError::Cancelled),
            Ok(context) => format!("Primary asset request answered {}", context.status),
            Err(e) => e.to_string(),
        };

        tracing::warn!(
            "Falling back for {} of {}: {}",
            request.asset_type,
            request.extension_id,
            message
        );
        self.telemetry.public_log(
            events::CDN_FALLBACK,
            &properties([
                ("extensionId", request.extension_id.to_string()),
                ("assetType", request.asset_type.to_string()),
                ("message", message),
            ]),
        );

        if token.is_cancelled() {
            return Err(GalleryError::Cancelled);
        }

        self.requests
            .request(
                RequestOptions::get(&asset.fallback_uri).with_headers(request.headers),
                token,
            )
            .await
    }

    /// Asset body as text; a 204 answer is empty text
    pub async fn fetch_text(
        &self,
        asset: &ResolvedAsset,
        request: &AssetRequest<'_>,
        token: &CancellationToken,
    ) -> Result<String> {
        let context = self.fetch(asset, request, token).await?;
        if context.status == 204 {
            return Ok(String::new());
        }
        if !context.is_success() {
            return Err(GalleryError::failed(format!(
                "Fetching {} of {} failed with status {}",
                request.asset_type, request.extension_id, context.status
            )));
        }
        context.text(token).await
    }

    /// Stream an asset into `destination`.
    ///
    /// A failed write removes the partial file and reports
    /// `DownloadFailedWriting`.
    pub async fn download(
        &self,
        asset: &ResolvedAsset,
        request: &AssetRequest<'_>,
        destination: &Path,
        token: &CancellationToken,
    ) -> Result<u64> {
        let context = self.fetch(asset, request, token).await?;
        if !context.is_success() {
            return Err(GalleryError::failed(format!(
                "Downloading {} of {} failed with status {}",
                request.asset_type, request.extension_id, context.status
            )));
        }

        match self.files.write_file(destination, context.body, token).await {
            Ok(written) => {
                tracing::info!(
                    "Downloaded {} ({} bytes) to {}",
                    request.extension_id,
                    written,
                    destination.display()
                );
                Ok(written)
            }
            Err(error) => {
                if let Err(e) = self.files.delete(destination).await {
                    tracing::warn!(
                        "Failed to remove partial download {}: {}",
                        destination.display(),
                        e
                    );
                }
                match error {
                    GalleryError::Cancelled => Err(GalleryError::Cancelled),
                    other => Err(GalleryError::DownloadFailedWriting {
                        path: destination.display().to_string(),
                        message: other.to_string(),
                    }),
                }
            }
        }
    }
}
