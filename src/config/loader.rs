//! Local file loading with environment overrides.
//!
//! Locates the config directory, loads `default.<ext>` and the optional
//! `<environment>.<ext>`, runs translators, and merges the two layers.

use super::merge::merge;
use super::translator::{Translator, apply_translators};
use super::value::{ConfigValue, RawValue, Source};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Directory name holding config files.
pub const CONFIG_DIR_NAME: &str = "config";

/// Subdirectories of the project root searched after the root itself.
pub const SEARCH_DIRS: [&str; 5] = ["src", "lib", "main", "dist", "app"];

/// Base name of the required defaults file.
pub const DEFAULT_BASENAME: &str = "default";

/// Parses one file format into a raw document.
#[async_trait]
pub trait FileLoader: Send + Sync {
    /// Extensions handled, without the leading dot.
    fn extensions(&self) -> &[&'static str];

    async fn load(&self, path: &Path) -> Result<RawValue>;
}

/// `.json` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLoader;

#[async_trait]
impl FileLoader for JsonLoader {
    fn extensions(&self) -> &[&'static str] {
        &["json"]
    }

    async fn load(&self, path: &Path) -> Result<RawValue> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::file_load(path, e))?;
        let value: Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::file_load(path, e))?;
        Ok(RawValue::Json(value))
    }
}

/// `.yaml` / `.yml` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlLoader;

#[async_trait]
impl FileLoader for YamlLoader {
    fn extensions(&self) -> &[&'static str] {
        &["yaml", "yml"]
    }

    async fn load(&self, path: &Path) -> Result<RawValue> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::file_load(path, e))?;
        // An empty YAML file is an empty mapping, not null.
        if content.trim().is_empty() {
            return Ok(RawValue::Json(Value::Object(Default::default())));
        }
        let value: Value =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::file_load(path, e))?;
        Ok(RawValue::Json(value))
    }
}

/// File loaders in registration order.
///
/// Extensions are tried in the order they were first registered; when two
/// loaders claim the same extension the later registration handles it.
#[derive(Clone)]
pub struct LoaderSet {
    order: Vec<&'static str>,
    by_extension: HashMap<&'static str, Arc<dyn FileLoader>>,
}

impl LoaderSet {
    pub fn empty() -> Self {
        Self {
            order: Vec::new(),
            by_extension: HashMap::new(),
        }
    }

    /// JSON, then YAML.
    pub fn with_defaults() -> Self {
        let mut set = Self::empty();
        set.register(Arc::new(JsonLoader));
        set.register(Arc::new(YamlLoader));
        set
    }

    pub fn register(&mut self, loader: Arc<dyn FileLoader>) {
        for &ext in loader.extensions() {
            if !self.order.contains(&ext) {
                self.order.push(ext);
            }
            self.by_extension.insert(ext, loader.clone());
        }
    }

    pub fn extensions(&self) -> &[&'static str] {
        &self.order
    }

    /// First existing `<dir>/<basename>.<ext>` with its loader.
    pub fn find(&self, dir: &Path, basename: &str) -> Option<(PathBuf, Arc<dyn FileLoader>)> {
        self.order.iter().find_map(|ext| {
            let path = dir.join(format!("{}.{}", basename, ext));
            if path.is_file() {
                self.by_extension
                    .get(ext)
                    .map(|loader| (path, loader.clone()))
            } else {
                None
            }
        })
    }
}

impl Default for LoaderSet {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Locate the config directory.
///
/// An explicit path (relative to `root` unless absolute) must exist.
/// Otherwise `<root>/config` is tried, then `<root>/<dir>/config` for each of
/// [`SEARCH_DIRS`].
pub fn locate_config_dir(root: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(explicit) = explicit {
        let dir = if explicit.is_absolute() {
            explicit.to_path_buf()
        } else {
            root.join(explicit)
        };
        return if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ConfigError::ConfigDirNotFound { root: dir })
        };
    }

    std::iter::once(root.join(CONFIG_DIR_NAME))
        .chain(
            SEARCH_DIRS
                .iter()
                .map(|sub| root.join(sub).join(CONFIG_DIR_NAME)),
        )
        .find(|dir| dir.is_dir())
        .ok_or_else(|| ConfigError::ConfigDirNotFound {
            root: root.to_path_buf(),
        })
}

/// Loads the local file layers.
#[derive(Clone, Default)]
pub struct ConfigLoader {
    loaders: LoaderSet,
    translators: Vec<Arc<dyn Translator>>,
}

impl ConfigLoader {
    pub fn new(loaders: LoaderSet, translators: Vec<Arc<dyn Translator>>) -> Self {
        Self {
            loaders,
            translators,
        }
    }

    /// Load `default` (required) and `<environment>` (optional) from `dir`
    /// and merge them, environment on top.
    pub async fn load_local(&self, dir: &Path, environment: &str) -> Result<ConfigValue> {
        let (default_path, loader) = self
            .loaders
            .find(dir, DEFAULT_BASENAME)
            .ok_or_else(|| ConfigError::DefaultConfigMissing {
                dir: dir.to_path_buf(),
            })?;
        let mut tree = self.load_file(&default_path, loader.as_ref()).await?;

        if environment != DEFAULT_BASENAME {
            match self.loaders.find(dir, environment) {
                Some((env_path, loader)) => {
                    let overlay = self.load_file(&env_path, loader.as_ref()).await?;
                    tree = merge(tree, overlay);
                }
                None => debug!(environment, dir = %dir.display(), "no environment config file"),
            }
        }
        Ok(tree)
    }

    async fn load_file(&self, path: &Path, loader: &dyn FileLoader) -> Result<ConfigValue> {
        let raw = loader.load(path).await?.settle_top().await?;
        let raw = apply_translators(raw, &self.translators);
        let origin = path.display().to_string();
        let tree = ConfigValue::lift_root(raw, Source::Local, &origin)?;
        info!(file = %origin, "loaded config file");
        Ok(tree)
    }
}
