//! HashiCorp Vault secret resolver.
//!
//! Connection settings live under the reserved `hashicorp-vault` key, which
//! may come from local files or any remote payload:
//!
//! ```yaml
//! hashicorp-vault:
//!   destination: http://localhost:8200
//!   apiVersion: v1
//!   mount: secret
//!   tokenPath: /var/run/vault-token   # or `token`
//! ```

use super::{RemoteResolver, ResolverKind};
use crate::config::ExpectedType;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, info};

const STORE: &str = "vault";

/// Reserved config key for Vault connection settings.
pub const VAULT_SETTINGS_KEY: &str = "hashicorp-vault";

/// Vault connection settings as written in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSettings {
    pub destination: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_mount")]
    pub mount: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_path: Option<PathBuf>,
    #[serde(default)]
    pub namespace: Option<String>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_mount() -> String {
    "secret".to_string()
}

impl VaultSettings {
    pub fn secret_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.destination.trim_end_matches('/'),
            self.api_version.trim_matches('/'),
            self.mount.trim_matches('/'),
            key.trim_start_matches('/')
        )
    }

    async fn token(&self) -> Result<String> {
        if let Some(ref token) = self.token {
            return Ok(token.clone());
        }
        match self.token_path {
            Some(ref path) => tokio::fs::read_to_string(path)
                .await
                .map(|t| t.trim().to_string())
                .map_err(|e| {
                    ConfigError::store_failed(
                        STORE,
                        format!("cannot read token from {}: {}", path.display(), e),
                    )
                }),
            None => Err(ConfigError::store_failed(STORE, "no token or tokenPath configured")),
        }
    }
}

/// Pull the secret out of a Vault read response.
///
/// KV v2 nests the secret under `data.data`; KV v1 uses `data`. A secret
/// stored as a single `value` field is unwrapped.
pub fn extract_secret(body: &Value) -> Option<Value> {
    let data = body.get("data")?;
    let secret = match data.get("data") {
        Some(inner @ Value::Object(_)) if data.get("metadata").is_some() => inner,
        _ => data,
    };
    match secret {
        Value::Object(map) if map.len() == 1 && map.contains_key("value") => map.get("value").cloned(),
        Value::Null => None,
        other => Some(other.clone()),
    }
}

/// Secret resolver backed by the Vault HTTP API.
pub struct VaultResolver {
    client: reqwest::Client,
    settings: RwLock<Option<VaultSettings>>,
}

impl VaultResolver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            settings: RwLock::new(None),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn current_settings(&self) -> Option<VaultSettings> {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for VaultResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteResolver for VaultResolver {
    fn name(&self) -> &str {
        STORE
    }

    fn kind(&self) -> ResolverKind {
        ResolverKind::Secret
    }

    fn settings_key(&self) -> Option<&str> {
        Some(VAULT_SETTINGS_KEY)
    }

    async fn configure(&self, settings: Option<&Value>) -> Result<()> {
        let Some(value) = settings else {
            debug!("no {} settings found", VAULT_SETTINGS_KEY);
            return Ok(());
        };
        let parsed: VaultSettings =
            serde_json::from_value(value.clone()).map_err(|e| ConfigError::Settings {
                origin: VAULT_SETTINGS_KEY.to_string(),
                message: e.to_string(),
            })?;
        info!(destination = %parsed.destination, mount = %parsed.mount, "vault configured");
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = Some(parsed);
        Ok(())
    }

    async fn get(&self, key: &str, _expected: Option<ExpectedType>) -> Result<Value> {
        let settings = self
            .current_settings()
            .ok_or_else(|| ConfigError::not_configured(STORE))?;
        let token = settings.token().await?;
        let url = settings.secret_url(key);

        // Secret values are never logged, only the key.
        debug!(key, "vault secret read");
        let mut request = self.client.get(&url).header("X-Vault-Token", token);
        if let Some(ref ns) = settings.namespace {
            request = request.header("X-Vault-Namespace", ns);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ConfigError::store_failed(STORE, e))?;
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
        extract_secret(&body)
            .ok_or_else(|| ConfigError::store_failed(STORE, format!("no data for '{}'", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_fill_defaults() {
        let settings: VaultSettings =
            serde_json::from_value(json!({"destination": "http://vault:8200/", "token": "t"}))
                .unwrap();
        assert_eq!(settings.api_version, "v1");
        assert_eq!(settings.mount, "secret");
        assert_eq!(
            settings.secret_url("/db/password"),
            "http://vault:8200/v1/secret/db/password"
        );
    }

    #[test]
    fn extracts_kv_v1_and_v2_payloads() {
        let v1 = json!({"data": {"value": "hunter2"}});
        assert_eq!(extract_secret(&v1), Some(json!("hunter2")));

        let v2 = json!({"data": {"data": {"user": "a", "pass": "b"}, "metadata": {"version": 3}}});
        assert_eq!(extract_secret(&v2), Some(json!({"user": "a", "pass": "b"})));

        assert_eq!(extract_secret(&json!({"errors": []})), None);
    }

    #[tokio::test]
    async fn get_before_configure_is_not_configured() {
        let resolver = VaultResolver::new();
        let err = resolver.get("db/password", None).await.unwrap_err();
        assert_eq!(err, ConfigError::not_configured("vault"));
    }

    #[tokio::test]
    async fn configure_accepts_settings_and_rejects_garbage() {
        let resolver = VaultResolver::new();
        resolver.configure(None).await.unwrap();
        assert!(!resolver.is_configured());

        let err = resolver.configure(Some(&json!({"mount": 3}))).await.unwrap_err();
        assert!(matches!(err, ConfigError::Settings { .. }));

        resolver
            .configure(Some(&json!({"destination": "http://vault:8200", "token": "t"})))
            .await
            .unwrap();
        assert!(resolver.is_configured());
    }

    #[tokio::test]
    async fn token_is_read_from_token_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "s.abc123\n").unwrap();
        let settings = VaultSettings {
            destination: "http://vault:8200".into(),
            api_version: default_api_version(),
            mount: default_mount(),
            token: None,
            token_path: Some(path),
            namespace: None,
        };
        assert_eq!(settings.token().await.unwrap(), "s.abc123");
    }
}
