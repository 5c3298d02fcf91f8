//! Read access to a [`DynamicConfig`].

use super::DynamicConfig;
use crate::config::{ConfigValue, Lookup, split_path};
use crate::error::{ConfigError, Result};
use crate::resolvers::ResolverKind;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

impl DynamicConfig {
    /// Value at a dotted path, fully resolved.
    ///
    /// The empty path is the whole configuration.
    pub async fn get(&self, path: &str) -> Result<Value> {
        let value = self.resolve_path(path).await?;
        self.validate(path, &value)?;
        Ok(value)
    }

    /// [`get`](Self::get) followed by deserialization into `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.get(path).await?;
        serde_json::from_value(value).map_err(|e| ConfigError::DynamicConfigInvalidObject {
            path: path.to_string(),
            errors: vec![e.to_string()],
        })
    }

    /// Like [`get`](Self::get), but returns `default` when the path is
    /// absent or its placeholder has no value.
    pub async fn get_with_default(&self, path: &str, default: Value) -> Result<Value> {
        match self.get(path).await {
            Err(err) if err.is_absent() => {
                debug!(path, error = %err, "using caller default");
                Ok(default)
            }
            other => other,
        }
    }

    /// Resolve several paths concurrently.
    ///
    /// Fails with the first error in argument order if any path fails.
    pub async fn get_all(&self, paths: &[&str]) -> Result<Vec<Value>> {
        join_all(paths.iter().map(|path| self.get(path)))
            .await
            .into_iter()
            .collect()
    }

    /// Ask remote resolvers for `key` directly.
    ///
    /// With a resolver name only that resolver is asked; otherwise every
    /// remote resolver is tried in registration order.
    pub async fn get_remote_value(&self, key: &str, resolver: Option<&str>) -> Result<Value> {
        self.query_resolvers(ResolverKind::Remote, key, resolver).await
    }

    /// Ask secret resolvers for `key` directly.
    pub async fn get_secret_value(&self, key: &str, resolver: Option<&str>) -> Result<Value> {
        self.query_resolvers(ResolverKind::Secret, key, resolver).await
    }

    /// The whole configuration, fully resolved.
    pub async fn snapshot(&self) -> Result<Value> {
        self.get("").await
    }

    async fn query_resolvers(
        &self,
        kind: ResolverKind,
        key: &str,
        name: Option<&str>,
    ) -> Result<Value> {
        // Resolvers receive their options during startup.
        self.ready().await?;
        let placeholders = self.inner.tree.placeholders();

        if let Some(name) = name {
            let resolver = self
                .inner
                .registry
                .get(name)
                .filter(|r| r.kind() == kind)
                .ok_or_else(|| ConfigError::unavailable(name))?;
            return placeholders.fetch_value(resolver, key, None).await;
        }

        let mut last_err = None;
        for resolver in self.inner.registry.of_kind(kind) {
            match placeholders.fetch_value(resolver, key, None).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    debug!(resolver = resolver.name(), key, error = %err, "lookup missed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ConfigError::unavailable(&kind.to_string())))
    }

    /// Resolve the nodes along `path` in the working tree and return the
    /// value there.
    ///
    /// Resolved nodes are written back so later queries find them concrete.
    /// The lock is released while resolving, so two queries may resolve the
    /// same node; both write back an equal value.
    async fn resolve_path(&self, path: &str) -> Result<Value> {
        let state = self.working_tree().await?;
        let segments = split_path(path);
        loop {
            let (depth, pending) = {
                let tree = read(state);
                match tree.lookup(path) {
                    Lookup::Found(node) if node.is_concrete() => {
                        return node.to_json().ok_or_else(|| ConfigError::missing_key(path));
                    }
                    Lookup::Found(node) => (segments.len(), node.clone()),
                    Lookup::Deferred { node, depth } => (depth, node.clone()),
                    Lookup::Missing => return Err(ConfigError::missing_key(path)),
                }
            };

            debug!(path, at = depth, "resolving deferred node");
            let resolved = self.inner.tree.resolve(pending).await?;

            let replaced = state
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .replace_at(&segments[..depth], resolved);
            if !replaced {
                return Err(ConfigError::missing_key(path));
            }
        }
    }
}

fn read(lock: &RwLock<ConfigValue>) -> std::sync::RwLockReadGuard<'_, ConfigValue> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}
