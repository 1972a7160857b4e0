//! File sink port

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{GalleryError, Result};
use crate::http::BodyStream;

/// Where downloaded archives are written
#[async_trait]
pub trait FileService: Send + Sync {
    /// Write the whole stream to `path`, replacing any existing file
    async fn write_file(
        &self,
        path: &Path,
        body: BodyStream,
        token: &CancellationToken,
    ) -> Result<u64>;

    async fn delete(&self, path: &Path) -> Result<()>;
}

/// Local filesystem sink
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileService;

#[async_trait]
impl FileService for LocalFileService {
    async fn write_file(
        &self,
        path: &Path,
        mut body: BodyStream,
        token: &CancellationToken,
    ) -> Result<u64> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            if token.is_cancelled() {
                return Err(GalleryError::Cancelled);
            }
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
