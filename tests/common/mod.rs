//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use editable_config::config::{load_config, StaticOptions, StaticSource};
use editable_config::http::HttpServer;
use editable_config::lifecycle::{startup::initialize_with, Shutdown};
use editable_config::registry::Registry;
use editable_config::runtime::{Engine, LiveConfig};
use editable_config::store::SqliteStore;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub const API_KEY: &str = "test-admin-key";

pub const DECLARATIONS: &str = r#"
    [[option]]
    key = "site.title"
    default = "Untitled"
    validators = "not_empty unicode_safe"
    editable = true

    [[option]]
    key = "site.description"
    editable = true

    [[option]]
    key = "search.rows"
    default = 20
    validators = "is_positive_integer"
    editable = true

    [[option]]
    key = "app.plugins"
    validators = "as_list"
    editable = true

    [[option]]
    key = "site.url"
    default = "http://localhost"
"#;

/// Write declarations and a settings file into a temp dir.
///
/// `extra` is appended to the settings file and must not repeat the
/// `server`, `admin`, `store`, `registry` or `options` sections.
pub fn write_settings(dir: &Path, extra: &str) -> std::path::PathBuf {
    std::fs::write(dir.join("declarations.toml"), DECLARATIONS).unwrap();
    let settings = format!(
        r#"
[server]
bind_address = "127.0.0.1:0"

[admin]
api_key = "{API_KEY}"

[store]
path = "overrides.db"

[registry]
path = "declarations.toml"

{extra}

[options]
"site.description" = "From file"
"#
    );
    let path = dir.join("settings.toml");
    std::fs::write(&path, settings).unwrap();
    path
}

/// A running server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub source: StaticSource,
    pub option_updates: mpsc::UnboundedSender<StaticOptions>,
    shutdown: Shutdown,
    _dir: TempDir,
}

impl TestServer {
    pub async fn start(extra: &str) -> Self {
        Self::start_with(extra, false).await
    }

    pub async fn start_with(extra: &str, disabled: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_config(&write_settings(dir.path(), extra)).unwrap();
        let services = initialize_with(&settings, disabled).unwrap();
        let source = services.source.clone();

        let listener = TcpListener::bind(&settings.server.bind_address).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let (option_updates, option_rx) = mpsc::unbounded_channel();
        let server = HttpServer::new(&settings, services);
        let server_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, option_rx, server_shutdown).await;
        });

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {API_KEY}")).unwrap(),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        Self {
            addr,
            client,
            source,
            option_updates,
            shutdown,
            _dir: dir,
        }
    }

    /// A second engine on this server's database, as another worker
    /// process would run it.
    pub fn peer_engine(&self) -> Engine {
        let registry = Arc::new(Registry::from_toml_str(DECLARATIONS).unwrap());
        let store = SqliteStore::open(self._dir.path().join("overrides.db")).unwrap();
        Engine::builder(LiveConfig::new(registry, []), Arc::new(store)).build()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn admin_url(&self, action: &str) -> String {
        self.url(&format!("/api/editable-config/{action}"))
    }

    /// POST an admin action, returning status and JSON body.
    pub async fn post(&self, action: &str, body: Value) -> (u16, Value) {
        let res = self
            .client
            .post(self.admin_url(action))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status().as_u16();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// GET a path, returning status and JSON body.
    pub async fn get(&self, path: &str) -> (u16, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        let status = res.status().as_u16();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Live value of `key` as served to the application.
    pub async fn value(&self, key: &str) -> Option<String> {
        let (status, body) = self.get(&format!("/config/{key}")).await;
        if status == 404 {
            return None;
        }
        assert_eq!(status, 200, "unexpected status for {key}: {body}");
        body["value"].as_str().map(str::to_string)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
