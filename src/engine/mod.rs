//! The configuration engine.
//!
//! A [`DynamicConfig`] owns the merged tree and resolves it on demand:
//! 1. **Startup** (once per instance, shared by concurrent callers): locate the
//!    config directory, load local files, run each resolver's `init` and merge
//!    its bulk payload, hand resolvers their settings, then settle each
//!    top-level key.
//! 2. **Queries**: walk the tree, resolving and writing back whatever is still
//!    deferred along the queried path.

pub mod placeholders;
mod query;
pub mod tree;

use crate::config::{
    BasicValidator, ConfigLoader, ConfigValue, FileLoader, LoaderSet, SchemaValidator, Settings,
    Translator, locate_config_dir, merge,
};
use crate::error::{ConfigError, Result};
use crate::resolvers::{Env, ProcessArgs, RemoteResolver, ResolverRegistry};
use placeholders::PlaceholderResolver;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use tree::TreeResolver;

pub use tree::MAX_RESOLVE_DEPTH;

/// Handle to one layered configuration. Cheap to clone.
#[derive(Clone)]
pub struct DynamicConfig {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    settings: Settings,
    loader: ConfigLoader,
    registry: Arc<ResolverRegistry>,
    tree: TreeResolver,
    schemas: BTreeMap<String, Value>,
    validator: Arc<dyn SchemaValidator>,
    state: OnceCell<Result<RwLock<ConfigValue>>>,
}

impl std::fmt::Debug for DynamicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicConfig")
            .field("root", &self.inner.root)
            .field("settings", &self.inner.settings)
            .field("registry", &self.inner.registry)
            .field("initialized", &self.inner.state.initialized())
            .finish()
    }
}

/// Builder for [`DynamicConfig`].
pub struct DynamicConfigBuilder {
    root: PathBuf,
    env: Env,
    args: ProcessArgs,
    settings: Option<Settings>,
    config_path: Option<PathBuf>,
    config_env: Option<String>,
    loaders: LoaderSet,
    translators: Vec<Arc<dyn Translator>>,
    resolvers: Vec<Arc<dyn RemoteResolver>>,
    schemas: BTreeMap<String, Value>,
    validator: Arc<dyn SchemaValidator>,
}

impl DynamicConfigBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            env: Env::real(),
            args: ProcessArgs::from_env(),
            settings: None,
            config_path: None,
            config_env: None,
            loaders: LoaderSet::with_defaults(),
            translators: Vec::new(),
            resolvers: Vec::new(),
            schemas: BTreeMap::new(),
            validator: Arc::new(BasicValidator),
        }
    }

    /// Environment read by the `env` resolver and by settings discovery.
    pub fn env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    /// Arguments read by the `process` resolver and by settings discovery.
    pub fn args(mut self, args: ProcessArgs) -> Self {
        self.args = args;
        self
    }

    /// Use these settings instead of discovering them.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn config_env(mut self, environment: impl Into<String>) -> Self {
        self.config_env = Some(environment.into());
        self
    }

    /// Add a file loader. It takes over any extension it shares with an
    /// earlier loader.
    pub fn loader(mut self, loader: Arc<dyn FileLoader>) -> Self {
        self.loaders.register(loader);
        self
    }

    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translators.push(translator);
        self
    }

    /// Add a resolver. Registration order is merge and search order.
    pub fn resolver(mut self, resolver: Arc<dyn RemoteResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Validate the value at `path` against `schema` on every query.
    pub fn schema(mut self, path: impl Into<String>, schema: Value) -> Self {
        self.schemas.insert(path.into(), schema);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn build(self) -> Result<DynamicConfig> {
        let mut registry = ResolverRegistry::new();
        for resolver in self.resolvers {
            registry.register(resolver)?;
        }

        let mut settings = match self.settings {
            Some(settings) => settings,
            None => Settings::load(&self.root, &self.env, &self.args, &registry.names())?,
        };
        if let Some(path) = self.config_path {
            settings.config_path = Some(path);
        }
        if let Some(environment) = self.config_env {
            settings.config_env = environment;
        }

        let registry = Arc::new(registry);
        let placeholders = PlaceholderResolver::new(registry.clone(), self.env, self.args);

        Ok(DynamicConfig {
            inner: Arc::new(Inner {
                root: self.root,
                settings,
                loader: ConfigLoader::new(self.loaders, self.translators),
                registry,
                tree: TreeResolver::new(Arc::new(placeholders)),
                schemas: self.schemas,
                validator: self.validator,
                state: OnceCell::new(),
            }),
        })
    }
}

impl DynamicConfig {
    pub fn builder(root: impl Into<PathBuf>) -> DynamicConfigBuilder {
        DynamicConfigBuilder::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn environment(&self) -> &str {
        &self.inner.settings.config_env
    }

    pub fn registry(&self) -> &ResolverRegistry {
        &self.inner.registry
    }

    /// Run startup if it has not run yet.
    ///
    /// Every caller awaits the same startup; its outcome, success or failure,
    /// is kept for the lifetime of this instance.
    pub async fn ready(&self) -> Result<()> {
        self.working_tree().await.map(|_| ())
    }

    async fn working_tree(&self) -> Result<&RwLock<ConfigValue>> {
        self.inner
            .state
            .get_or_init(|| self.initialize())
            .await
            .as_ref()
            .map_err(Clone::clone)
    }

    async fn initialize(&self) -> Result<RwLock<ConfigValue>> {
        let inner = &self.inner;
        let dir = locate_config_dir(&inner.root, inner.settings.config_path.as_deref())?;
        info!(
            dir = %dir.display(),
            environment = %inner.settings.config_env,
            "loading configuration"
        );
        let mut tree = inner
            .loader
            .load_local(&dir, &inner.settings.config_env)
            .await?;

        for resolver in inner.registry.iter() {
            let options = inner.settings.options_for(resolver.name());
            let Some(payload) = resolver.init(&tree, options.as_ref()).await? else {
                debug!(resolver = resolver.name(), "no bulk payload");
                continue;
            };
            let payload = payload.settle_top().await?;
            let layer =
                match ConfigValue::lift_root(payload, resolver.kind().source(), resolver.name()) {
                    Ok(layer) => layer,
                    Err(_) => {
                        warn!(resolver = resolver.name(), "ignoring bulk payload that is not a mapping");
                        continue;
                    }
                };
            tree = merge(tree, layer);
            info!(resolver = resolver.name(), "merged bulk payload");
        }

        for resolver in inner.registry.iter() {
            let Some(key) = resolver.settings_key() else {
                continue;
            };
            let settings = match inner.tree.resolve_path(&mut tree, key).await {
                Ok(node) => node.and_then(|n| n.to_json()),
                Err(err) => {
                    warn!(resolver = resolver.name(), key, error = %err, "resolver settings unavailable");
                    None
                }
            };
            resolver.configure(settings.as_ref()).await?;
        }

        let tree = inner.tree.settle(tree).await;
        info!("configuration ready");
        Ok(RwLock::new(tree))
    }

    fn validate(&self, path: &str, value: &Value) -> Result<()> {
        let Some(schema) = self.inner.schemas.get(path) else {
            return Ok(());
        };
        let errors = self.inner.validator.validate(schema, value);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::DynamicConfigInvalidObject {
                path: path.to_string(),
                errors,
            })
        }
    }
}
