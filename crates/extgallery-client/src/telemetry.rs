//! One-way telemetry port

use std::collections::BTreeMap;

/// Event names emitted by the client
pub mod events {
    pub const QUERY: &str = "galleryService:query";
    pub const CDN_FALLBACK: &str = "gallery:cdnFallback";
    pub const RESOURCE_FALLBACK: &str = "galleryService:resourceFallback";
    pub const DOWNLOAD: &str = "galleryService:downloadVSIX";
    pub const REQUEST_ERROR: &str = "galleryService:requestError";
}

/// Event properties
pub type Properties = BTreeMap<String, String>;

/// Receives fire-and-forget events
pub trait TelemetrySink: Send + Sync {
    fn public_log(&self, event: &str, properties: &Properties);
}

/// Emits every event as a `tracing` record
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn public_log(&self, event: &str, properties: &Properties) {
        tracing::info!(target: "extgallery::telemetry", event, ?properties, "telemetry");
    }
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn public_log(&self, _event: &str, _properties: &Properties) {}
}

/// Build a property map from pairs
pub fn properties<const N: usize>(pairs: [(&str, String); N]) -> Properties {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties() {
        let props = properties([
            ("extensionId", "a.b".to_string()),
            ("assetType", "manifest".to_string()),
        ]);
        assert_eq!(props.len(), 2);
        assert_eq!(props["extensionId"], "a.b");

        // Sinks never fail
        TracingTelemetry.public_log(events::QUERY, &props);
        NoopTelemetry.public_log(events::QUERY, &props);
    }
}
