//! Placeholder resolution against built-in and registered resolvers.

use crate::config::{ConfigValue, ExpectedType, PlaceholderSpec, Source};
use crate::error::{ConfigError, Result};
use crate::resolvers::builtin::{ENV_RESOLVER, PROCESS_RESOLVER};
use crate::resolvers::{Env, ProcessArgs, RemoteResolver, ResolverKind, ResolverRegistry};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

type FetchCell = Arc<OnceCell<Result<Value>>>;

/// Resolves placeholders and caches remote fetches by `(resolver, key)`.
///
/// The cache stores the outcome of the first fetch, success or failure, so
/// each resolver sees at most one `get` per key for the lifetime of the
/// configuration. Concurrent requests for the same key share that fetch.
pub struct PlaceholderResolver {
    registry: Arc<ResolverRegistry>,
    env: Env,
    args: ProcessArgs,
    cache: Mutex<HashMap<(String, String), FetchCell>>,
}

impl PlaceholderResolver {
    pub fn new(registry: Arc<ResolverRegistry>, env: Env, args: ProcessArgs) -> Self {
        Self {
            registry,
            env,
            args,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve one placeholder into the node that replaces it.
    ///
    /// The returned node may itself contain placeholders; the tree resolver
    /// takes care of those.
    pub async fn resolve(&self, spec: &PlaceholderSpec) -> Result<ConfigValue> {
        match spec.source_name.as_str() {
            ENV_RESOLVER => resolve_builtin(
                spec,
                self.env.var(&spec.key),
                Source::Env,
                ConfigError::MissingEnvironmentVariable {
                    name: spec.key.clone(),
                },
            ),
            PROCESS_RESOLVER => resolve_builtin(
                spec,
                self.args.get(&spec.key).map(str::to_string),
                Source::Process,
                ConfigError::MissingProcessVariable {
                    name: spec.key.clone(),
                },
            ),
            name => {
                let resolver = self
                    .registry
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ConfigError::unavailable(name))?;
                self.resolve_remote(&resolver, spec).await
            }
        }
    }

    async fn resolve_remote(
        &self,
        resolver: &Arc<dyn RemoteResolver>,
        spec: &PlaceholderSpec,
    ) -> Result<ConfigValue> {
        let kind = resolver.kind();
        let outcome = self
            .fetch_value(resolver, &spec.key, spec.expected_type)
            .await
            .and_then(|value| coerce(value, spec.expected_type));

        match outcome {
            Ok(value) => Ok(ConfigValue::lift_json(value, kind.source())),
            Err(err) => {
                // Secrets never fall back to a default.
                if kind == ResolverKind::Remote
                    && let Some(ref default) = spec.default
                {
                    warn!(
                        resolver = resolver.name(),
                        key = %spec.key,
                        error = %err,
                        "using placeholder default"
                    );
                    return Ok(ConfigValue::lift_json(default.clone(), kind.source()));
                }
                Err(ConfigError::MissingConfigPlaceholder {
                    source_name: resolver.name().to_string(),
                    key: spec.key.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Fetch a key through the cache, treating `null` as "no value".
    pub async fn fetch_value(
        &self,
        resolver: &Arc<dyn RemoteResolver>,
        key: &str,
        expected: Option<ExpectedType>,
    ) -> Result<Value> {
        match self.fetch(resolver, key, expected).await? {
            Value::Null => Err(ConfigError::store_failed(
                resolver.name(),
                format!("no value for '{}'", key),
            )),
            value => Ok(value),
        }
    }

    /// Fetch a key through the cache.
    pub async fn fetch(
        &self,
        resolver: &Arc<dyn RemoteResolver>,
        key: &str,
        expected: Option<ExpectedType>,
    ) -> Result<Value> {
        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache
                .entry((resolver.name().to_string(), key.to_string()))
                .or_default()
                .clone()
        };
        cell.get_or_init(|| async {
            debug!(resolver = resolver.name(), key, "fetching remote value");
            resolver.get(key, expected).await
        })
        .await
        .clone()
    }

    /// Number of distinct `(resolver, key)` pairs fetched so far.
    pub fn cached_keys(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn coerce(value: Value, expected: Option<ExpectedType>) -> Result<Value> {
    match expected {
        Some(expected) => expected.coerce(value),
        None => Ok(value),
    }
}

fn resolve_builtin(
    spec: &PlaceholderSpec,
    found: Option<String>,
    source: Source,
    missing: ConfigError,
) -> Result<ConfigValue> {
    let outcome = match found {
        Some(raw) => coerce(Value::String(raw), spec.expected_type),
        None => Err(missing),
    };
    match (outcome, &spec.default) {
        (Ok(value), _) => Ok(ConfigValue::lift_json(value, source)),
        (Err(err), Some(default)) => {
            debug!(source = %source, key = %spec.key, error = %err, "using placeholder default");
            Ok(ConfigValue::lift_json(default.clone(), source))
        }
        (Err(err), None) => Err(err),
    }
}
