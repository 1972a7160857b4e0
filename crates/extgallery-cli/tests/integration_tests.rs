//! Integration tests for CLI commands

use serde_json::{Value, json};
use std::path::Path;
use std::process::Output;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use extgallery_core::asset_types;
use extgallery_core::catalog::keys;

/// Run extgallery with an isolated config directory
fn extgallery(home: &Path, args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_extgallery"))
        .args(args)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env_remove("EXTGALLERY_CONFIG")
        .env_remove("EXTGALLERY_SERVICE_URL")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute extgallery")
}

/// Same, but without blocking the runtime serving the mock registry
async fn extgallery_against(server: &MockServer, home: &Path, args: &[&str]) -> Output {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_extgallery"))
        .args(args)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("EXTGALLERY_SERVICE_URL", server.uri())
        .env_remove("EXTGALLERY_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .await
        .expect("Failed to execute extgallery")
}

fn raw_extension(server: &MockServer, id: &str, version: &str) -> Value {
    let (publisher, name) = id.split_once('.').unwrap();
    json!({
        "extensionId": format!("uuid-{}", name),
        "extensionName": name,
        "displayName": name,
        "shortDescription": format!("The {} extension", name),
        "publisher": {"publisherId": "p-1", "publisherName": publisher, "displayName": publisher},
        "versions": [{
            "version": version,
            "assetUri": format!("{}/assets/{}", server.uri(), version),
            "fallbackAssetUri": format!("{}/fallback/{}", server.uri(), version),
            "files": [
                {"assetType": asset_types::MANIFEST, "source": ""},
                {"assetType": asset_types::PACKAGE, "source": ""}
            ],
            "properties": [
                {"key": keys::ENGINE, "value": "^1.0.0"}
            ]
        }],
        "statistics": [{"statisticName": "install", "value": 42.0}],
        "tags": [],
        "categories": [],
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

async fn mount_query(server: &MockServer, extensions: Vec<Value>, total: u64) {
    Mock::given(method("POST"))
        .and(path("/extensionquery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(extensions, total)))
        .mount(server)
        .await;
}

mod general {
    use super::*;

    #[test]
    fn test_help() {
        let home = TempDir::new().unwrap();
        let output = extgallery(home.path(), &["--help"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("search"));
        assert!(stdout.contains("download"));
    }

    #[test]
    fn test_version() {
        let home = TempDir::new().unwrap();
        let output = extgallery(home.path(), &["--version"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_invalid_extension_id_is_usage_error() {
        let home = TempDir::new().unwrap();
        let output = extgallery(home.path(), &["show", "no-dot-here"]);

        assert_eq!(output.status.code(), Some(64));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("not an extension id"));
    }

    #[test]
    fn test_report_requires_version() {
        let home = TempDir::new().unwrap();
        let output = extgallery(home.path(), &["report", "pub.ext"]);

        assert_eq!(output.status.code(), Some(64));
    }
}

mod config_command {
    use super::*;

    #[test]
    fn test_config_path_honours_flag() {
        let home = TempDir::new().unwrap();
        let file = home.path().join("custom.yaml");
        let output = extgallery(
            home.path(),
            &["config", "path", "--config", file.to_str().unwrap()],
        );

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(stdout.trim(), file.display().to_string());
    }

    #[test]
    fn test_config_init_then_show() {
        let home = TempDir::new().unwrap();
        let file = home.path().join("nested").join("config.yaml");
        let file_arg = file.to_str().unwrap();

        let output = extgallery(home.path(), &["config", "init", "--config", file_arg]);
        assert!(output.status.success());
        assert!(file.exists());

        let output = extgallery(home.path(), &["config", "show", "--config", file_arg]);
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let shown: serde_yaml::Value = serde_yaml::from_str(&stdout).unwrap();
        assert!(shown.get("serviceUrl").is_some());
    }

    #[test]
    fn test_config_init_refuses_to_overwrite() {
        let home = TempDir::new().unwrap();
        let file = home.path().join("config.yaml");
        std::fs::write(&file, "serviceUrl: https://gallery.example.com\n").unwrap();

        let output = extgallery(
            home.path(),
            &["config", "init", "--config", file.to_str().unwrap()],
        );

        assert_eq!(output.status.code(), Some(64));
        let content = std::fs::read_to_string(&file).unwrap();
        assert!(content.contains("gallery.example.com"));
    }

    #[test]
    fn test_invalid_config_file() {
        let home = TempDir::new().unwrap();
        let file = home.path().join("config.yaml");
        std::fs::write(&file, "serviceUrl: [unclosed\n").unwrap();

        let output = extgallery(
            home.path(),
            &["search", "rust", "--config", file.to_str().unwrap()],
        );

        assert_eq!(output.status.code(), Some(3));
    }
}

mod gallery_commands {
    use super::*;

    #[tokio::test]
    async fn test_search_json() {
        let server = MockServer::start().await;
        mount_query(
            &server,
            vec![
                raw_extension(&server, "rust-lang.rust-analyzer", "0.3.2000"),
                raw_extension(&server, "tamasfe.even-better-toml", "0.19.2"),
            ],
            7,
        )
        .await;
        let home = TempDir::new().unwrap();

        let output = extgallery_against(
            &server,
            home.path(),
            &["search", "rust", "--page-size", "2", "--json"],
        )
        .await;

        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let json: Value = serde_json::from_slice(&output.stdout).expect("Output should be valid JSON");
        assert_eq!(json["total"], 7);
        assert_eq!(json["pageCount"], 4);
        assert_eq!(json["extensions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_table() {
        let server = MockServer::start().await;
        mount_query(
            &server,
            vec![raw_extension(&server, "rust-lang.rust-analyzer", "0.3.2000")],
            1,
        )
        .await;
        let home = TempDir::new().unwrap();

        let output = extgallery_against(&server, home.path(), &["search", "rust"]).await;

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("rust-lang.rust-analyzer"));
        assert!(stdout.contains("Page 1 of 1"));
    }

    #[tokio::test]
    async fn test_show_missing_extension() {
        let server = MockServer::start().await;
        mount_query(&server, vec![], 0).await;
        let home = TempDir::new().unwrap();

        let output = extgallery_against(&server, home.path(), &["show", "pub.missing"]).await;

        assert_eq!(output.status.code(), Some(2));
    }

    #[tokio::test]
    async fn test_show_json() {
        let server = MockServer::start().await;
        mount_query(&server, vec![raw_extension(&server, "pub.ext", "1.4.0")], 1).await;
        let home = TempDir::new().unwrap();

        let output = extgallery_against(
            &server,
            home.path(),
            &["show", "pub.ext", "--platform", "linux-x64", "--json"],
        )
        .await;

        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let json: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["version"], "1.4.0");
    }

    #[tokio::test]
    async fn test_download_writes_package() {
        let server = MockServer::start().await;
        mount_query(&server, vec![raw_extension(&server, "pub.ext", "1.4.0")], 1).await;
        Mock::given(method("GET"))
            .and(path(format!("/fallback/1.4.0/{}", asset_types::PACKAGE)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
            .mount(&server)
            .await;
        let home = TempDir::new().unwrap();
        let destination = home.path().join("out.vsix");

        let output = extgallery_against(
            &server,
            home.path(),
            &[
                "download",
                "pub.ext",
                "--platform",
                "linux-x64",
                "-o",
                destination.to_str().unwrap(),
            ],
        )
        .await;

        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert_eq!(std::fs::read(&destination).unwrap(), b"PK\x03\x04");
    }

    #[tokio::test]
    async fn test_server_error_exit_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extensionquery"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let home = TempDir::new().unwrap();

        let output = extgallery_against(&server, home.path(), &["search", "rust"]).await;

        assert_eq!(output.status.code(), Some(1));
    }
}
