//! Consul KV resolver.
//!
//! Options (from `remoteOptions.consul`, `CONSUL_*` environment variables or
//! `CONSUL_*=value` process arguments):
//! - `address` - Consul HTTP address, e.g. `http://localhost:8500`
//! - `dc` - datacenter
//! - `keys` - comma-separated keys whose values form the bulk payload
//! - `namespace` - prefix applied to every key

use super::{RemoteResolver, ResolverKind};
use crate::config::merge::deep_merge_json;
use crate::config::{ConfigValue, ExpectedType, RawValue};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::sync::RwLock;
use tracing::{debug, info};

const STORE: &str = "consul";

/// Connection settings for a Consul agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsulSettings {
    pub address: String,
    pub dc: Option<String>,
    pub keys: Vec<String>,
    pub namespace: Option<String>,
}

impl ConsulSettings {
    /// Read settings from a resolver options object. `None` without an address.
    pub fn from_options(options: &Value) -> Option<Self> {
        let address = option_str(options, "address")?.trim_end_matches('/').to_string();
        let keys = match options.get("keys") {
            Some(Value::String(s)) => split_keys(s),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        Some(Self {
            address,
            dc: option_str(options, "dc").map(str::to_string),
            keys,
            namespace: option_str(options, "namespace").map(|s| s.trim_matches('/').to_string()),
        })
    }

    /// Full KV URL for a key.
    pub fn kv_url(&self, key: &str) -> String {
        let full_key = match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, key.trim_start_matches('/')),
            _ => key.trim_start_matches('/').to_string(),
        };
        let encoded: Vec<String> = full_key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        let mut url = format!("{}/v1/kv/{}", self.address, encoded.join("/"));
        if let Some(ref dc) = self.dc {
            url.push_str("?dc=");
            url.push_str(&urlencoding::encode(dc));
        }
        url
    }
}

fn option_str<'a>(options: &'a Value, name: &str) -> Option<&'a str> {
    options
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn split_keys(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decode a Consul KV read response.
///
/// The body is a JSON array of entries with a base64 `Value`. The decoded
/// text is parsed as JSON when possible and kept as a string otherwise.
pub fn decode_kv_response(body: &Value) -> Result<Option<Value>> {
    let entry = match body.as_array().and_then(|entries| entries.first()) {
        Some(entry) => entry,
        None => return Ok(None),
    };
    let encoded = match entry.get("Value") {
        Some(Value::String(s)) => s,
        _ => return Ok(None),
    };
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| ConfigError::store_failed(STORE, format!("invalid base64 value: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| ConfigError::store_failed(STORE, format!("value is not UTF-8: {}", e)))?;
    Ok(Some(
        serde_json::from_str(&text).unwrap_or(Value::String(text)),
    ))
}

/// Remote resolver backed by the Consul KV HTTP API.
pub struct ConsulResolver {
    client: reqwest::Client,
    settings: RwLock<Option<ConsulSettings>>,
}

impl ConsulResolver {
    /// A resolver configured from its options during `init`.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            settings: RwLock::new(None),
        }
    }

    /// A resolver with explicit settings; options passed to `init` override them.
    pub fn with_settings(settings: ConsulSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings: RwLock::new(Some(settings)),
        }
    }

    fn current_settings(&self) -> Option<ConsulSettings> {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn fetch(&self, settings: &ConsulSettings, key: &str) -> Result<Option<Value>> {
        let url = settings.kv_url(key);
        debug!(key, "consul kv read");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConfigError::store_failed(STORE, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ConfigError::store_failed(
                STORE,
                format!("GET {} returned {}", url, response.status()),
            ));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ConfigError::store_failed(STORE, e))?;
        decode_kv_response(&body)
    }
}

impl Default for ConsulResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteResolver for ConsulResolver {
    fn name(&self) -> &str {
        STORE
    }

    fn kind(&self) -> ResolverKind {
        ResolverKind::Remote
    }

    async fn init(&self, _config: &ConfigValue, options: Option<&Value>) -> Result<Option<RawValue>> {
        if let Some(settings) = options.and_then(ConsulSettings::from_options) {
            *self.settings.write().unwrap_or_else(|e| e.into_inner()) = Some(settings);
        }
        let Some(settings) = self.current_settings() else {
            debug!("consul has no address, skipping bulk load");
            return Ok(None);
        };
        if settings.keys.is_empty() {
            return Ok(None);
        }

        let mut payload = Value::Object(Default::default());
        for key in &settings.keys {
            match self.fetch(&settings, key).await? {
                Some(value @ Value::Object(_)) => payload = deep_merge_json(payload, value),
                Some(_) => {
                    return Err(ConfigError::store_failed(
                        STORE,
                        format!("bulk key '{}' does not hold an object", key),
                    ));
                }
                None => {
                    return Err(ConfigError::store_failed(
                        STORE,
                        format!("bulk key '{}' not found", key),
                    ));
                }
            }
        }
        info!(keys = settings.keys.len(), "loaded consul bulk payload");
        Ok(Some(RawValue::Json(payload)))
    }

    async fn get(&self, key: &str, _expected: Option<ExpectedType>) -> Result<Value> {
        let settings = self
            .current_settings()
            .ok_or_else(|| ConfigError::not_configured(STORE))?;
        match self.fetch(&settings, key).await? {
            Some(value) => Ok(value),
            None => Err(ConfigError::store_failed(STORE, "key not found")),
        }
    }
}
