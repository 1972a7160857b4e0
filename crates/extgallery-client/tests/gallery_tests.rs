//! Gallery client against a mock registry

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use extgallery_client::headers::SEARCH_ACTIVITY_HEADER;
use extgallery_client::{
    AllowedValue, ExtensionInfo, GalleryClient, GalleryConfig, GalleryError, GalleryServices,
    GetExtensionsOptions, InstallOperation, NoopTelemetry, ProductInfo, RequestContext,
    RequestOptions, RequestService, SearchOptions, StatisticType,
};
use extgallery_core::catalog::keys;
use extgallery_core::{
    CatalogEntry, FlagStrategy, GalleryExtension, RawGalleryExtension, TargetPlatform,
    asset_types,
};

const QUERY_PATH: &str = "/extensionquery";

fn raw_version(server: &MockServer, version: &str, pre_release: bool) -> Value {
    json!({
        "version": version,
        "assetUri": format!("{}/assets/{}", server.uri(), version),
        "fallbackAssetUri": format!("{}/fallback/{}", server.uri(), version),
        "files": [
            {"assetType": asset_types::MANIFEST, "source": ""},
            {"assetType": asset_types::PACKAGE, "source": ""}
        ],
        "properties": [
            {"key": keys::PRE_RELEASE, "value": pre_release.to_string()}
        ]
    })
}

fn raw_extension(uuid: &str, id: &str, versions: Vec<Value>) -> Value {
    let (publisher, name) = id.split_once('.').unwrap();
    json!({
        "extensionId": uuid,
        "extensionName": name,
        "displayName": name,
        "publisher": {"publisherId": "p-1", "publisherName": publisher, "displayName": publisher},
        "versions": versions,
        "statistics": [{"statisticName": "install", "value": 1200.0}],
        "tags": [],
        "categories": ["Programming Languages"],
        "flags": "validated, public"
    })
}

fn query_response(extensions: Vec<Value>, total: u64) -> Value {
    json!({
        "results": [{
            "extensions": extensions,
            "resultMetadata": [{
                "metadataType": "ResultCount",
                "metadataItems": [{"name": "TotalCount", "count": total}]
            }]
        }]
    })
}

fn config(server: &MockServer) -> GalleryConfig {
    GalleryConfig {
        service_url: server.uri(),
        request_timeout_secs: 1,
        ..Default::default()
    }
}

fn with_resource(server: &MockServer) -> GalleryConfig {
    GalleryConfig {
        resource_url_template: Some(format!(
            "{}/resource/{{publisher}}/{{name}}/latest",
            server.uri()
        )),
        ..config(server)
    }
}

fn client(config: GalleryConfig) -> GalleryClient {
    let mut services = GalleryServices::from_config(&config).unwrap();
    services.telemetry = Arc::new(NoopTelemetry);
    GalleryClient::with_services(config, services).unwrap()
}

fn linux() -> GetExtensionsOptions {
    GetExtensionsOptions {
        target_platform: Some(TargetPlatform::LinuxX64),
        ..Default::default()
    }
}

async fn query_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == QUERY_PATH)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

fn has_criterion(body: &Value, filter_type: u64, value: &str) -> bool {
    body["filters"][0]["criteria"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["filterType"] == filter_type && c["value"] == value)
}

/// Matches query requests for one page number
struct PageNumber(u64);

impl Match for PageNumber {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .map(|body| body["filters"][0]["pageNumber"] == self.0)
            .unwrap_or(false)
    }
}

#[tokio::test]
async fn test_query_path_selects_release() {
    let server = MockServer::start().await;
    let extension = raw_extension(
        "u-1",
        "pub.ext",
        vec![
            raw_version(&server, "2.0.0-rc", true),
            raw_version(&server, "1.9.0", false),
        ],
    );
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(query_response(vec![extension], 1))
                .insert_header("activityid", "act-42"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let found = client
        .get_extension(
            &ExtensionInfo::new("pub.ext"),
            &linux(),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.version, "1.9.0");
    assert!(found.has_pre_release_version);
    assert_eq!(found.install_count, 1200);
    assert_eq!(found.query_context[SEARCH_ACTIVITY_HEADER], "act-42");

    let bodies = query_bodies(&server).await;
    assert!(has_criterion(&bodies[0], 7, "pub.ext"));
    assert!(has_criterion(&bodies[0], 8, "Microsoft.VisualStudio.Code"));
    assert!(has_criterion(&bodies[0], 12, "4096"));
}

#[tokio::test]
async fn test_pre_release_request_takes_latest() {
    let server = MockServer::start().await;
    let extension = raw_extension(
        "u-1",
        "pub.ext",
        vec![
            raw_version(&server, "2.0.0-rc", true),
            raw_version(&server, "1.9.0", false),
        ],
    );
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![extension], 1)))
        .mount(&server)
        .await;

    let client = client(config(&server));
    let found = client
        .get_extension(
            &ExtensionInfo::new("pub.ext").with_pre_release(true),
            &linux(),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.version, "2.0.0-rc");
    assert!(found.properties.is_pre_release_version);
}

#[tokio::test]
async fn test_release_wanted_requeries_all_versions() {
    let server = MockServer::start().await;
    let latest_only = raw_extension("u-1", "pub.ext", vec![raw_version(&server, "2.0.0", true)]);
    let all = raw_extension(
        "u-1",
        "pub.ext",
        vec![
            raw_version(&server, "2.0.0", true),
            raw_version(&server, "1.0.0", false),
        ],
    );
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![latest_only], 1)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![all], 1)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let found = client
        .get_extension(
            &ExtensionInfo::new("pub.ext").with_uuid("u-1"),
            &linux(),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.version, "1.0.0");

    let bodies = query_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    let first = bodies[0]["flags"].as_u64().unwrap();
    let second = bodies[1]["flags"].as_u64().unwrap();
    assert_ne!(first & 0x200, 0, "first query asks for latest only");
    assert_eq!(second & 0x200, 0);
    assert_ne!(second & 0x1, 0, "second query asks for every version");
    assert!(has_criterion(&bodies[1], 4, "u-1"));
}

#[tokio::test]
async fn test_exact_version_fetches_all_versions() {
    let server = MockServer::start().await;
    let extension = raw_extension(
        "u-1",
        "pub.ext",
        vec![
            raw_version(&server, "2.0.0", false),
            raw_version(&server, "1.5.0", false),
            raw_version(&server, "1.0.0", false),
        ],
    );
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![extension], 1)))
        .expect(1)
        .mount(&server)
        .await;

    // A resource endpoint is configured but exact versions always use the query
    let client = client(with_resource(&server));
    let found = client
        .get_extension(
            &ExtensionInfo::new("pub.ext").with_version("1.5.0"),
            &linux(),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.version, "1.5.0");

    let bodies = query_bodies(&server).await;
    let flags = bodies[0]["flags"].as_u64().unwrap();
    assert_ne!(flags & 0x1, 0);
    assert_eq!(flags & 0x200, 0);
}

#[tokio::test]
async fn test_compatible_skips_newer_engine() {
    let server = MockServer::start().await;
    let mut newest = raw_version(&server, "2.0.0", false);
    newest["properties"]
        .as_array_mut()
        .unwrap()
        .push(json!({"key": keys::ENGINE, "value": "^9.0.0"}));
    let mut older = raw_version(&server, "1.0.0", false);
    older["properties"]
        .as_array_mut()
        .unwrap()
        .push(json!({"key": keys::ENGINE, "value": "^1.80.0"}));
    let extension = raw_extension("u-1", "pub.ext", vec![newest, older]);
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![extension], 1)))
        .mount(&server)
        .await;

    let client = client(config(&server));
    let options = GetExtensionsOptions {
        compatible: true,
        query_all_versions: true,
        ..linux()
    };
    let found = client
        .get_extension(&ExtensionInfo::new("pub.ext"), &options, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.version, "1.0.0");
}

#[tokio::test]
async fn test_resource_not_found_with_uuid_requeues_to_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resource/old/name/latest"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let renamed = raw_extension("u-7", "new.name", vec![raw_version(&server, "3.1.0", false)]);
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![renamed], 1)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(with_resource(&server));
    let found = client
        .get_extension(
            &ExtensionInfo::new("old.name").with_uuid("u-7"),
            &linux(),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.identifier.id, "new.name");
    assert_eq!(found.version, "3.1.0");
    let bodies = query_bodies(&server).await;
    assert!(has_criterion(&bodies[0], 4, "u-7"));
}

#[tokio::test]
async fn test_resource_not_found_without_uuid_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resource/gone/ext/latest"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![], 0)))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(with_resource(&server));
    let found = client
        .get_extension(&ExtensionInfo::new("gone.ext"), &linux(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_resource_failure_uses_fallback_host_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/primary/pub/ext"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    let extension = raw_extension("u-1", "pub.ext", vec![raw_version(&server, "1.2.3", false)]);
    Mock::given(method("GET"))
        .and(path("/secondary/pub/ext"))
        .respond_with(ResponseTemplate::new(200).set_body_json(extension))
        .expect(1)
        .mount(&server)
        .await;

    let config = GalleryConfig {
        resource_url_template: Some(format!("{}/primary/{{publisher}}/{{name}}", server.uri())),
        fallback_resource_url_template: Some(format!(
            "{}/secondary/{{publisher}}/{{name}}",
            server.uri()
        )),
        ..config(&server)
    };
    let client = client(config);
    let found = client
        .get_extension(&ExtensionInfo::new("pub.ext"), &linux(), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.version, "1.2.3");
}

#[tokio::test]
async fn test_batch_isolation() {
    let server = MockServer::start().await;
    for id in ["a.one", "c.three"] {
        let (publisher, name) = id.split_once('.').unwrap();
        Mock::given(method("GET"))
            .and(path(format!("/resource/{}/{}/latest", publisher, name)))
            .respond_with(ResponseTemplate::new(200).set_body_json(raw_extension(
                "",
                id,
                vec![raw_version(&server, "1.0.0", false)],
            )))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/resource/b/two/latest"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = client(with_resource(&server));
    let infos = [
        ExtensionInfo::new("a.one"),
        ExtensionInfo::new("b.two"),
        ExtensionInfo::new("c.three"),
    ];
    let outcomes = client
        .get_extensions(&infos, &linux(), &CancellationToken::new())
        .await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].as_ref().unwrap().as_ref().unwrap().identifier.id, "a.one");
    assert!(matches!(outcomes[1], Err(GalleryError::Timeout { .. })));
    assert_eq!(outcomes[2].as_ref().unwrap().as_ref().unwrap().identifier.id, "c.three");
}

#[tokio::test]
async fn test_query_client_error_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let client = client(config(&server));
    let found = client
        .get_extension(&ExtensionInfo::new("pub.ext"), &linux(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_query_server_error_fails_whole_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let outcomes = client
        .get_extensions(
            &[ExtensionInfo::new("a.one"), ExtensionInfo::new("b.two")],
            &linux(),
            &CancellationToken::new(),
        )
        .await;
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, Err(GalleryError::Failed { .. })))
    );
}

#[tokio::test]
async fn test_search_pages() {
    let server = MockServer::start().await;
    let page = |ids: &[&str]| {
        let extensions = ids
            .iter()
            .map(|id| raw_extension("", id, vec![raw_version(&server, "1.0.0", false)]))
            .collect();
        query_response(extensions, 5)
    };
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(PageNumber(1))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["a.one", "b.two"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(PageNumber(3))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["e.five"])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let options = SearchOptions {
        text: Some("tag:rust analyzer".to_string()),
        page_size: 2,
        target_platform: Some(TargetPlatform::LinuxX64),
        ..Default::default()
    };
    let token = CancellationToken::new();
    let pager = client.search(&options, &token).await.unwrap();

    assert_eq!(pager.total(), 5);
    assert_eq!(pager.page_size(), 2);
    assert_eq!(pager.page_count(), 3);
    assert_eq!(pager.first_page().len(), 2);

    let last = pager.get_page(2, &token).await.unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].identifier.id, "e.five");

    let bodies = query_bodies(&server).await;
    assert!(has_criterion(&bodies[0], 1, "rust"));
    assert!(has_criterion(&bodies[0], 10, "analyzer"));
    assert_eq!(bodies[1]["filters"][0]["pageSize"], 2);
}

#[tokio::test]
async fn test_cancelled_page_is_not_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![], 0)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let token = CancellationToken::new();
    let pager = client
        .search(&SearchOptions::default(), &token)
        .await
        .unwrap();

    token.cancel();
    let result = pager.get_page(1, &token).await;
    assert!(matches!(result, Err(GalleryError::Cancelled)));
}

fn resolved(server: &MockServer, version: &str) -> GalleryExtension {
    let raw: RawGalleryExtension = serde_json::from_value(raw_extension(
        "u-1",
        "pub.ext",
        vec![raw_version(server, version, false)],
    ))
    .unwrap();
    let entry = CatalogEntry::from_raw(raw).unwrap();
    let mut context = BTreeMap::new();
    context.insert(SEARCH_ACTIVITY_HEADER.to_string(), "act-1".to_string());
    GalleryExtension::from_entry(&entry, &entry.versions[0], vec![], context)
}

#[tokio::test]
async fn test_download_falls_back_and_writes_file() {
    let server = MockServer::start().await;
    let package_path = format!("/fallback/1.0.0/{}", asset_types::PACKAGE);
    Mock::given(method("GET"))
        .and(path(package_path.as_str()))
        .and(query_param("redirect", "true"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(package_path.as_str()))
        .and(query_param("install", "true"))
        .and(header(SEARCH_ACTIVITY_HEADER, "act-1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04archive".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("downloads").join("pub.ext-1.0.0.vsix");
    let client = client(config(&server));

    let written = client
        .download(
            &resolved(&server, "1.0.0"),
            &destination,
            InstallOperation::Install,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(written, 11);
    assert_eq!(std::fs::read(&destination).unwrap(), b"PK\x03\x04archive");
}

#[tokio::test]
async fn test_download_failure_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/fallback/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("pub.ext.vsix");
    let client = client(config(&server));

    let result = client
        .download(
            &resolved(&server, "1.0.0"),
            &destination,
            InstallOperation::None,
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(GalleryError::Failed { .. })));
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_manifest_and_missing_readme() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/assets/1.0.0/{}", asset_types::MANIFEST)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "ext",
            "engines": {"vscode": "^1.80.0"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let extension = resolved(&server, "1.0.0");
    let token = CancellationToken::new();

    let manifest = client.get_manifest(&extension, &token).await.unwrap().unwrap();
    assert_eq!(manifest["engines"]["vscode"], "^1.80.0");

    // No details file published: no request, empty text
    assert_eq!(client.get_readme(&extension, &token).await.unwrap(), "");
}

#[tokio::test]
async fn test_compatibility_reads_engine_from_manifest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/assets/1.0.0/{}", asset_types::MANIFEST)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "engines": {"vscode": "^1.80.0"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/assets/2.0.0/{}", asset_types::MANIFEST)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "engines": {"vscode": "^5.0.0"}
        })))
        .mount(&server)
        .await;

    let client = client(config(&server));
    let ok = client
        .is_extension_compatible(&resolved(&server, "1.0.0"), false, &TargetPlatform::LinuxX64)
        .await
        .unwrap();
    let too_new = client
        .is_extension_compatible(&resolved(&server, "2.0.0"), false, &TargetPlatform::LinuxX64)
        .await
        .unwrap();
    assert!(ok);
    assert!(!too_new);
}

#[tokio::test]
async fn test_statistic_is_posted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/publishers/pub/extensions/ext/1.0.0/stats"))
        .and(query_param("statType", "install"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client(config(&server));
    client
        .report_statistic("pub", "ext", "1.0.0", StatisticType::Install)
        .await;

    let mut delivered = false;
    for _ in 0..50 {
        let requests = server.received_requests().await.unwrap();
        if requests.iter().any(|r| r.url.path().ends_with("/stats")) {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(delivered, "statistic was never posted");
}

#[tokio::test]
async fn test_latest_prerelease_and_stable_strategy_queries_once() {
    let server = MockServer::start().await;
    let extension = raw_extension("u-1", "pub.ext", vec![raw_version(&server, "2.0.0-rc", true)]);
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![extension], 1)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(GalleryConfig {
        query_strategy: FlagStrategy::LatestPrereleaseAndStable,
        ..config(&server)
    });
    let found = client
        .get_extension(
            &ExtensionInfo::new("pub.ext"),
            &linux(),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();

    // Nothing stable published: newest overall, without an all-versions round
    assert_eq!(found.version, "2.0.0-rc");
    let bodies = query_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    let flags = bodies[0]["flags"].as_u64().unwrap();
    assert_ne!(flags & 0x10000, 0, "latest pre-release and stable flag missing");
    assert_eq!(flags & 0x200, 0, "latest version only must not be sent");
    assert_eq!(flags & 0x1, 0, "all versions must not be sent");
    assert!(has_criterion(&bodies[0], 12, "4096"));
}

#[tokio::test]
async fn test_reconfigure_rebuilds_headers_and_policy() {
    let server = MockServer::start().await;
    let mut version = raw_version(&server, "1.0.0", false);
    version["properties"]
        .as_array_mut()
        .unwrap()
        .push(json!({"key": keys::ENGINE, "value": "^1.80.0"}));
    let extension = raw_extension("u-1", "pub.ext", vec![version]);
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![extension], 1)))
        .mount(&server)
        .await;

    let original = GalleryConfig {
        product: ProductInfo {
            name: "editor".to_string(),
            version: "1.95.0".to_string(),
            date: None,
        },
        ..config(&server)
    };
    let mut client = client(original.clone());
    let options = GetExtensionsOptions {
        compatible: true,
        ..linux()
    };
    let info = ExtensionInfo::new("pub.ext");
    let token = CancellationToken::new();

    let before = client.get_extension(&info, &options, &token).await.unwrap();
    assert_eq!(before.unwrap().version, "1.0.0");

    client
        .reconfigure(GalleryConfig {
            product: ProductInfo {
                name: "editor-insiders".to_string(),
                version: "1.96.0".to_string(),
                date: None,
            },
            allowed_extensions: Some(BTreeMap::from([(
                "pub.ext".to_string(),
                AllowedValue::Flag(false),
            )])),
            ..original
        })
        .unwrap();
    let after = client.get_extension(&info, &options, &token).await.unwrap();
    assert!(after.is_none(), "allow list from the new configuration applies");

    let client_ids: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == QUERY_PATH)
        .map(|r| {
            r.headers
                .get("x-market-client-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        })
        .collect();
    assert!(client_ids.len() >= 2);
    assert_eq!(client_ids[0], "editor 1.95.0");
    assert!(
        client_ids[1..].iter().all(|id| id == "editor-insiders 1.96.0"),
        "{:?}",
        client_ids
    );
}

#[tokio::test]
async fn test_last_page_index_does_not_overflow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(PageNumber(u64::from(u32::MAX)))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![], 0)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![], 0)))
        .mount(&server)
        .await;

    let client = client(config(&server));
    let token = CancellationToken::new();
    let pager = client.search(&SearchOptions::default(), &token).await.unwrap();

    let page = pager.get_page(u32::MAX, &token).await.unwrap();
    assert!(page.is_empty());
}

/// Answers every request with a page, cancelling the caller while the body
/// is being read
struct CancelWhileReading;

#[async_trait]
impl RequestService for CancelWhileReading {
    async fn request(
        &self,
        _options: RequestOptions,
        token: &CancellationToken,
    ) -> extgallery_client::Result<RequestContext> {
        let cancel = token.clone();
        let page = serde_json::to_vec(&query_response(vec![], 7)).unwrap();
        let body = stream::once(async move {
            cancel.cancel();
            Ok(Bytes::from(page))
        })
        .boxed();
        Ok(RequestContext {
            status: 200,
            headers: BTreeMap::new(),
            body,
        })
    }
}

#[tokio::test]
async fn test_search_cancelled_while_reading_body() {
    let config = GalleryConfig::default();
    let mut services = GalleryServices::from_config(&config).unwrap();
    services.telemetry = Arc::new(NoopTelemetry);
    services.requests = Arc::new(CancelWhileReading);
    let client = GalleryClient::with_services(config, services).unwrap();
    let token = CancellationToken::new();

    let result = client.search(&SearchOptions::default(), &token).await;

    assert!(token.is_cancelled());
    assert!(matches!(result, Err(GalleryError::Cancelled)));
}
