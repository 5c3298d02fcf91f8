//! Integration tests for layered configuration resolution.
//!
//! These tests build a config directory on disk, register mock resolvers and
//! query through the public `DynamicConfig` API.

use async_trait::async_trait;
use layerconf::config::{ConfigValue, ExpectedType, FileLoader, RawValue, Settings};
use layerconf::resolvers::{Env, ProcessArgs, RemoteResolver, ResolverKind};
use layerconf::{ConfigError, DynamicConfig, DynamicConfigBuilder, ErrorCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A resolver backed by a fixed map that counts its calls.
struct MockResolver {
    name: &'static str,
    kind: ResolverKind,
    payload: Option<Value>,
    values: HashMap<String, Value>,
    settings_key: Option<&'static str>,
    inits: AtomicUsize,
    gets: AtomicUsize,
    seen_options: Mutex<Option<Value>>,
    seen_config: Mutex<Option<Value>>,
    configured: Mutex<Option<Value>>,
}

impl MockResolver {
    fn new(name: &'static str, kind: ResolverKind) -> Self {
        Self {
            name,
            kind,
            payload: None,
            values: HashMap::new(),
            settings_key: None,
            inits: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            seen_options: Mutex::new(None),
            seen_config: Mutex::new(None),
            configured: Mutex::new(None),
        }
    }

    fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    fn with_value(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    fn with_settings_key(mut self, key: &'static str) -> Self {
        self.settings_key = Some(key);
        self
    }

    fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteResolver for MockResolver {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> ResolverKind {
        self.kind
    }

    async fn init(
        &self,
        config: &ConfigValue,
        options: Option<&Value>,
    ) -> layerconf::Result<Option<RawValue>> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        *self.seen_options.lock().unwrap() = options.cloned();
        *self.seen_config.lock().unwrap() = config.to_json();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        Ok(self.payload.clone().map(RawValue::Json))
    }

    fn settings_key(&self) -> Option<&str> {
        self.settings_key
    }

    async fn configure(&self, settings: Option<&Value>) -> layerconf::Result<()> {
        *self.configured.lock().unwrap() = settings.cloned();
        Ok(())
    }

    async fn get(&self, key: &str, _expected: Option<ExpectedType>) -> layerconf::Result<Value> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::store_failed(self.name, format!("{} not found", key)))
    }
}

/// Loads `.lazy` files whose values arrive through deferred computations.
struct LazyLoader;

#[async_trait]
impl FileLoader for LazyLoader {
    fn extensions(&self) -> &[&'static str] {
        &["lazy"]
    }

    async fn load(&self, _path: &Path) -> layerconf::Result<RawValue> {
        let mut inner = BTreeMap::new();
        inner.insert(
            "password".to_string(),
            RawValue::Pending(layerconf::config::Deferred::rejected(ConfigError::rejected(
                "vault timed out",
            ))),
        );
        inner.insert("user".to_string(), RawValue::Json(json!("admin")));

        let mut doc = BTreeMap::new();
        doc.insert("database".to_string(), RawValue::Object(inner));
        doc.insert(
            "server".to_string(),
            RawValue::Pending(layerconf::config::Deferred::from_json(async {
                Ok(json!({"port": 8080}))
            })),
        );
        Ok(RawValue::Object(doc))
    }
}

/// Helper to create a project root with a `config/` directory.
fn project(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("config");
    std::fs::create_dir_all(&dir).unwrap();
    for (name, content) in files {
        std::fs::write(dir.join(name), content).unwrap();
    }
    temp
}

/// Helper for a builder isolated from the real environment.
fn builder(root: &TempDir, env: &[(&str, &str)]) -> DynamicConfigBuilder {
    let env = Env::from_vars(env.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    DynamicConfig::builder(root.path())
        .env(env)
        .args(ProcessArgs::new(Vec::<String>::new()))
        .settings(Settings::default())
}

#[tokio::test]
async fn environment_file_overrides_defaults() {
    let root = project(&[
        ("default.json", r#"{"server": {"port": 8080, "host": "localhost"}}"#),
        ("development.json", r#"{"server": {"port": 9090}}"#),
    ]);
    let config = builder(&root, &[]).build().unwrap();
    assert_eq!(config.get("server.port").await.unwrap(), json!(9090));
    assert_eq!(config.get("server.host").await.unwrap(), json!("localhost"));
}

#[tokio::test]
async fn selected_environment_and_yaml_files() {
    let root = project(&[
        ("default.yaml", "server:\n  port: 8080\n"),
        ("production.yml", "server:\n  port: 443\n  tls: true\n"),
    ]);
    let config = builder(&root, &[]).config_env("production").build().unwrap();
    assert_eq!(config.environment(), "production");
    assert_eq!(
        config.get("server").await.unwrap(),
        json!({"port": 443, "tls": true})
    );
}

#[tokio::test]
async fn env_placeholder_default_applies_when_unset() {
    let root = project(&[(
        "default.json",
        r#"{"server": {"port": {"_source": "env", "_key": "PORT", "_default": 3000}}}"#,
    )]);
    let config = builder(&root, &[]).build().unwrap();
    assert_eq!(config.get("server.port").await.unwrap(), json!(3000));

    let config = builder(&root, &[("PORT", "4000")]).build().unwrap();
    assert_eq!(config.get("server.port").await.unwrap(), json!("4000"));
}

#[tokio::test]
async fn process_placeholder_reads_name_value_args() {
    let root = project(&[(
        "default.json",
        r#"{"mode": {"_source": "process", "_key": "MODE"}, "debug": {"_source": "process", "_key": "DEBUG", "_type": "boolean"}}"#,
    )]);
    let config = builder(&root, &[])
        .args(ProcessArgs::new(["--verbose", "MODE=fast", "DEBUG=true"]))
        .build()
        .unwrap();
    assert_eq!(
        config.get_all(&["mode", "debug"]).await.unwrap(),
        vec![json!("fast"), json!(true)]
    );
}

#[tokio::test]
async fn later_bulk_payloads_win() {
    let root = project(&[(
        "default.json",
        r#"{"database": {"host": "localhost", "password": "local"}}"#,
    )]);
    let r1 = Arc::new(
        MockResolver::new("r1", ResolverKind::Remote)
            .with_payload(json!({"database": {"password": "from-r1", "pool": 5}})),
    );
    let r2 = Arc::new(
        MockResolver::new("r2", ResolverKind::Remote)
            .with_payload(json!({"database": {"password": "from-r2"}})),
    );
    let config = builder(&root, &[])
        .resolver(r1.clone())
        .resolver(r2.clone())
        .build()
        .unwrap();

    assert_eq!(
        config.get("database").await.unwrap(),
        json!({"host": "localhost", "password": "from-r2", "pool": 5})
    );
    // Each init sees everything merged before it.
    assert_eq!(
        *r2.seen_config.lock().unwrap(),
        Some(json!({"database": {"host": "localhost", "password": "from-r1", "pool": 5}}))
    );
}

#[tokio::test]
async fn bulk_payloads_that_are_not_plain_mappings_are_skipped() {
    let root = project(&[("default.json", r#"{"server": {"port": 8080}}"#)]);
    let placeholder = Arc::new(
        MockResolver::new("placeholder", ResolverKind::Remote)
            .with_payload(json!({"_source": "env", "_key": "X"})),
    );
    let scalar = Arc::new(MockResolver::new("scalar", ResolverKind::Remote).with_payload(json!(7)));
    let config = builder(&root, &[])
        .resolver(placeholder)
        .resolver(scalar)
        .build()
        .unwrap();

    assert_eq!(config.get("server.port").await.unwrap(), json!(8080));
    assert_eq!(config.snapshot().await.unwrap(), json!({"server": {"port": 8080}}));
}

#[tokio::test]
async fn resolver_options_come_from_env_vars() {
    let root = project(&[("default.json", "{}")]);
    let consul = Arc::new(MockResolver::new("consul", ResolverKind::Remote));
    let config = DynamicConfig::builder(root.path())
        .env(Env::from_vars([
            ("CONSUL_ADDRESS", "http://127.0.0.1:8500"),
            ("CONSUL_DC", "dc1"),
        ]))
        .args(ProcessArgs::new(["CONSUL_DC=dc2"]))
        .resolver(consul.clone())
        .build()
        .unwrap();
    config.ready().await.unwrap();
    assert_eq!(
        *consul.seen_options.lock().unwrap(),
        Some(json!({"address": "http://127.0.0.1:8500", "dc": "dc2"}))
    );
}

#[tokio::test]
async fn rejected_deferred_fails_only_its_branch() {
    let root = project(&[("default.lazy", "")]);
    let config = builder(&root, &[])
        .loader(Arc::new(LazyLoader))
        .build()
        .unwrap();

    let err = config.get("database").await.unwrap_err();
    assert_eq!(err, ConfigError::rejected("vault timed out"));
    assert_eq!(config.get("database.user").await.unwrap(), json!("admin"));
    assert_eq!(config.get("server.port").await.unwrap(), json!(8080));
    assert!(config.snapshot().await.is_err());
}

#[tokio::test]
async fn secret_placeholders_ignore_defaults() {
    let root = project(&[(
        "default.json",
        r#"{
            "db": {
                "password": {"_source": "vault", "_key": "db/password", "_default": "changeme"},
                "host": {"_source": "consul", "_key": "db/host", "_default": "localhost"}
            }
        }"#,
    )]);
    let vault = Arc::new(MockResolver::new("vault", ResolverKind::Secret));
    let consul = Arc::new(MockResolver::new("consul", ResolverKind::Remote));
    let config = builder(&root, &[])
        .resolver(consul)
        .resolver(vault.clone())
        .build()
        .unwrap();

    assert_eq!(config.get("db.host").await.unwrap(), json!("localhost"));
    let err = config.get("db.password").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::MissingConfigPlaceholder);
    assert!(err.to_string().contains("db/password"));

    // A caller default still applies.
    assert_eq!(
        config
            .get_with_default("db.password", json!("fallback"))
            .await
            .unwrap(),
        json!("fallback")
    );
    assert_eq!(vault.gets(), 1);
}

#[tokio::test]
async fn get_all_fails_as_a_whole() {
    let root = project(&[("default.json", r#"{"a": 1, "b": {"c": 2}}"#)]);
    let config = builder(&root, &[]).build().unwrap();

    assert_eq!(
        config.get_all(&["a", "b.c"]).await.unwrap(),
        vec![json!(1), json!(2)]
    );
    let err = config.get_all(&["a", "missing", "also.missing"]).await.unwrap_err();
    assert_eq!(err, ConfigError::missing_key("missing"));
}

#[tokio::test]
async fn get_with_default_only_covers_absence() {
    let root = project(&[(
        "default.json",
        r#"{"port": "not-a-number", "name": "svc"}"#,
    )]);
    let config = builder(&root, &[])
        .schema("port", json!({"type": "integer"}))
        .build()
        .unwrap();

    assert_eq!(
        config.get_with_default("missing", json!(42)).await.unwrap(),
        json!(42)
    );
    assert_eq!(
        config.get_with_default("name", json!("other")).await.unwrap(),
        json!("svc")
    );
    let err = config
        .get_with_default("port", json!(80))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DynamicConfigInvalidObject);
}

#[tokio::test]
async fn each_remote_key_is_fetched_once() {
    let root = project(&[(
        "default.json",
        r#"{
            "primary": {"_source": "consul", "_key": "db/url"},
            "replica": {"_source": "consul", "_key": "db/url"},
            "list": [{"_source": "consul", "_key": "db/url"}, {"_source": "consul", "_key": "missing"}]
        }"#,
    )]);
    let consul = Arc::new(
        MockResolver::new("consul", ResolverKind::Remote).with_value("db/url", json!("postgres://db")),
    );
    let config = builder(&root, &[]).resolver(consul.clone()).build().unwrap();

    assert_eq!(config.get("primary").await.unwrap(), json!("postgres://db"));
    assert_eq!(config.get("replica").await.unwrap(), json!("postgres://db"));
    assert!(config.get("list").await.is_err());
    assert!(config.get("list").await.is_err());
    assert_eq!(
        config.get_remote_value("db/url", None).await.unwrap(),
        json!("postgres://db")
    );
    assert_eq!(consul.gets(), 2);
}

#[tokio::test]
async fn concurrent_queries_share_one_startup() {
    let root = project(&[("default.json", r#"{"a": 1, "b": 2}"#)]);
    let remote = Arc::new(MockResolver::new("remote", ResolverKind::Remote).with_payload(json!({"c": 3})));
    let config = builder(&root, &[]).resolver(remote.clone()).build().unwrap();

    let handles: Vec<_> = ["a", "b", "c", "a"]
        .into_iter()
        .map(|path| {
            let config = config.clone();
            tokio::spawn(async move { config.get(path).await })
        })
        .collect();
    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(values, vec![json!(1), json!(2), json!(3), json!(1)]);
    assert_eq!(remote.inits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn startup_failure_is_reported_to_every_query() {
    let root = TempDir::new().unwrap();
    let config = builder(&root, &[]).build().unwrap();
    let first = config.get("a").await.unwrap_err();
    assert_eq!(first.code(), ErrorCode::ConfigDirNotFound);
    let second = config.get_with_default("a", json!(1)).await.unwrap_err();
    assert_eq!(first, second);

    let root = project(&[("production.json", "{}")]);
    let err = builder(&root, &[]).build().unwrap().ready().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DefaultConfigMissing);
}

#[tokio::test]
async fn schema_mismatch_lists_every_violation() {
    let root = project(&[(
        "default.json",
        r#"{"server": {"port": "eighty", "host": ""}}"#,
    )]);
    let config = builder(&root, &[])
        .schema(
            "server",
            json!({
                "type": "object",
                "properties": {
                    "port": {"type": "integer"},
                    "host": {"type": "string", "minLength": 1}
                }
            }),
        )
        .build()
        .unwrap();

    match config.get("server").await.unwrap_err() {
        ConfigError::DynamicConfigInvalidObject { path, errors } => {
            assert_eq!(path, "server");
            assert_eq!(errors.len(), 2, "{:?}", errors);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // Paths without a schema are not validated.
    assert_eq!(config.get("server.port").await.unwrap(), json!("eighty"));
}

#[tokio::test]
async fn typed_extraction() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Server {
        host: String,
        port: u16,
    }

    let root = project(&[(
        "default.json",
        r#"{"server": {"host": "example.org", "port": {"_source": "env", "_key": "PORT", "_type": "number"}}}"#,
    )]);
    let config = builder(&root, &[("PORT", "8443")]).build().unwrap();
    let server: Server = config.get_as("server").await.unwrap();
    assert_eq!(
        server,
        Server {
            host: "example.org".into(),
            port: 8443
        }
    );

    let err = config.get_as::<Server>("server.host").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DynamicConfigInvalidObject);
}

#[tokio::test]
async fn direct_lookups_search_resolvers_in_order() {
    let root = project(&[("default.json", "{}")]);
    let r1 = Arc::new(MockResolver::new("r1", ResolverKind::Remote).with_value("shared", json!("one")));
    let r2 = Arc::new(
        MockResolver::new("r2", ResolverKind::Remote)
            .with_value("shared", json!("two"))
            .with_value("only-r2", json!("two")),
    );
    let vault = Arc::new(MockResolver::new("vault", ResolverKind::Secret).with_value("token", json!("s3cr3t")));
    let config = builder(&root, &[])
        .resolver(r1.clone())
        .resolver(r2.clone())
        .resolver(vault)
        .build()
        .unwrap();

    assert_eq!(config.get_remote_value("shared", None).await.unwrap(), json!("one"));
    assert_eq!(config.get_remote_value("only-r2", None).await.unwrap(), json!("two"));
    assert_eq!(
        config.get_remote_value("shared", Some("r2")).await.unwrap(),
        json!("two")
    );
    assert_eq!(config.get_secret_value("token", None).await.unwrap(), json!("s3cr3t"));

    let err = config.get_remote_value("nowhere", None).await.unwrap_err();
    assert_eq!(
        err,
        ConfigError::store_failed("r2", "nowhere not found")
    );
    let err = config.get_remote_value("token", Some("vault")).await.unwrap_err();
    assert_eq!(err, ConfigError::unavailable("vault"));
    let err = config.get_secret_value("token", Some("etcd")).await.unwrap_err();
    assert_eq!(err, ConfigError::unavailable("etcd"));
}

#[tokio::test]
async fn resolvers_receive_their_settings_after_bulk_merges() {
    let root = project(&[(
        "default.json",
        r#"{"mock-settings": {"token": {"_source": "env", "_key": "MOCK_TOKEN"}, "mount": "secret"}}"#,
    )]);
    let bulk = Arc::new(
        MockResolver::new("bulk", ResolverKind::Remote)
            .with_payload(json!({"mock-settings": {"mount": "kv"}})),
    );
    let secrets = Arc::new(MockResolver::new("secrets", ResolverKind::Secret).with_settings_key("mock-settings"));
    let config = builder(&root, &[("MOCK_TOKEN", "t-123")])
        .resolver(secrets.clone())
        .resolver(bulk)
        .build()
        .unwrap();
    config.ready().await.unwrap();
    assert_eq!(
        *secrets.configured.lock().unwrap(),
        Some(json!({"token": "t-123", "mount": "kv"}))
    );
}

#[test]
fn duplicate_and_reserved_names_fail_at_build() {
    let root = project(&[("default.json", "{}")]);
    let err = builder(&root, &[])
        .resolver(Arc::new(MockResolver::new("consul", ResolverKind::Remote)))
        .resolver(Arc::new(MockResolver::new("consul", ResolverKind::Secret)))
        .build()
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateResolver);

    let err = builder(&root, &[])
        .resolver(Arc::new(MockResolver::new("process", ResolverKind::Remote)))
        .build()
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ReservedResolverName);
}
