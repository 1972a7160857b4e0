//! Request port and its reqwest implementation

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{GalleryError, Result};

/// Streamed response body
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// One outgoing request
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
    /// `None` leaves the request unbounded (large downloads)
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            ..Default::default()
        }
    }

    pub fn with_headers(mut self, headers: &BTreeMap<String, String>) -> Self {
        self.headers
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Response status, headers and body
pub struct RequestContext {
    pub status: u16,
    /// Header names are lower case
    pub headers: BTreeMap<String, String>,
    pub body: BodyStream,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    /// Response with an in-memory body
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers: BTreeMap::new(),
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Collect the whole body. Cancellation during or right after the read
    /// wins over whatever was received.
    pub async fn bytes(self, token: &CancellationToken) -> Result<Vec<u8>> {
        let collect = self
            .body
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok::<_, GalleryError>(acc)
            });
        let bytes = tokio::select! {
            _ = token.cancelled() => return Err(GalleryError::Cancelled),
            bytes = collect => bytes?,
        };
        if token.is_cancelled() {
            return Err(GalleryError::Cancelled);
        }
        Ok(bytes)
    }

    pub async fn text(self, token: &CancellationToken) -> Result<String> {
        let bytes = self.bytes(token).await?;
        String::from_utf8(bytes)
            .map_err(|e| GalleryError::failed(format!("Response is not UTF-8: {}", e)))
    }

    pub async fn json<T: DeserializeOwned>(self, token: &CancellationToken) -> Result<T> {
        let bytes = self.bytes(token).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Transport used by the gallery client
#[async_trait]
pub trait RequestService: Send + Sync {
    /// Send a request. Non-2xx answers are not errors; transport failures are.
    async fn request(
        &self,
        options: RequestOptions,
        token: &CancellationToken,
    ) -> Result<RequestContext>;
}

/// reqwest-backed transport with gzip and rustls
#[derive(Debug, Clone)]
pub struct HttpRequestService {
    client: reqwest::Client,
}

impl HttpRequestService {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GalleryError::failed(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestService for HttpRequestService {
    async fn request(
        &self,
        options: RequestOptions,
        token: &CancellationToken,
    ) -> Result<RequestContext> {
        if token.is_cancelled() {
            return Err(GalleryError::Cancelled);
        }

        let method = match options.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut request = self.client.request(method, &options.url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = options.body {
            request = request.body(body);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!(method = ?options.method, url = %options.url, "sending request");

        let response = tokio::select! {
            _ = token.cancelled() => return Err(GalleryError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        tracing::debug!(status, url = %options.url, "received response");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(GalleryError::from))
            .boxed();

        Ok(RequestContext {
            status,
            headers,
            body,
        })
    }
}
