//! Common request headers

use async_trait::async_trait;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::ProductInfo;
use crate::error::Result;

/// Header carrying the activity id of the search an extension came from
pub const SEARCH_ACTIVITY_HEADER: &str = "X-Market-Search-Activity-Id";

/// Supplies the headers sent with every registry request
#[async_trait]
pub trait HeadersSource: Send + Sync {
    async fn headers(&self) -> Result<BTreeMap<String, String>>;
}

/// Client id, user agent and a per-process session id
#[derive(Debug, Clone)]
pub struct ProductHeaders {
    product: ProductInfo,
    session_id: String,
    machine_id: Option<String>,
}

impl ProductHeaders {
    pub fn new(product: ProductInfo) -> Self {
        Self {
            product,
            session_id: Uuid::new_v4().to_string(),
            machine_id: None,
        }
    }

    /// Stable id reported instead of the session id
    pub fn with_machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }

    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} ({}; {})",
            self.product.name,
            self.product.version,
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    }
}

#[async_trait]
impl HeadersSource for ProductHeaders {
    async fn headers(&self) -> Result<BTreeMap<String, String>> {
        let mut headers = BTreeMap::new();
        headers.insert(
            "X-Market-Client-Id".to_string(),
            format!("{} {}", self.product.name, self.product.version),
        );
        headers.insert("User-Agent".to_string(), self.user_agent());
        headers.insert(
            "X-Market-User-Id".to_string(),
            self.machine_id
                .clone()
                .unwrap_or_else(|| self.session_id.clone()),
        );
        headers.insert("X-Market-Session-Id".to_string(), self.session_id.clone());
        Ok(headers)
    }
}
