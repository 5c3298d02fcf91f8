//! Process-wide settings for the configuration engine itself.
//!
//! Read from three layers, later layers winning:
//! 1. `config-settings.json` in the project root (or `<config_dir>/layerconf/`)
//! 2. Environment variables (`CONFIG_PATH`, `CONFIG_ENV`, `<RESOLVER>_<OPTION>`)
//! 3. Process arguments of the form `NAME=value`
//!
//! Resolver options such as `CONSUL_ADDRESS` are collected into
//! `remote_options["consul"]["address"]` and handed to that resolver's `init`.

use crate::error::{ConfigError, Result};
use crate::resolvers::{Env, ProcessArgs};
use heck::{ToLowerCamelCase, ToShoutySnakeCase};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the settings file.
pub const SETTINGS_FILE: &str = "config-settings.json";

/// Environment used when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "development";

const CONFIG_PATH_VAR: &str = "CONFIG_PATH";
const CONFIG_ENV_VAR: &str = "CONFIG_ENV";

/// Resolved engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Config directory, relative to the project root unless absolute.
    pub config_path: Option<PathBuf>,
    /// Environment name selecting `<environment>.<ext>`.
    pub config_env: String,
    /// Options per resolver name, passed through opaquely.
    pub remote_options: BTreeMap<String, Map<String, Value>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: None,
            config_env: DEFAULT_ENVIRONMENT.to_string(),
            remote_options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    config_path: Option<PathBuf>,
    #[serde(default)]
    config_env: Option<String>,
    #[serde(default)]
    remote_options: BTreeMap<String, Map<String, Value>>,
}

impl Settings {
    /// Load settings for a project rooted at `root`.
    ///
    /// `resolver_names` are the registered resolvers whose `<NAME>_*`
    /// variables and arguments are collected as options.
    pub fn load(
        root: &Path,
        env: &Env,
        args: &ProcessArgs,
        resolver_names: &[&str],
    ) -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(path) = Self::find_file(root) {
            settings.apply_file(&path)?;
        }

        let env_vars = env.vars();
        settings.apply_pairs(
            env_vars.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            resolver_names,
        );
        settings.apply_pairs(args.iter(), resolver_names);
        Ok(settings)
    }

    fn find_file(root: &Path) -> Option<PathBuf> {
        let local = root.join(SETTINGS_FILE);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|d| d.join("layerconf").join(SETTINGS_FILE))
            .filter(|p| p.is_file())
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Settings {
            origin: origin.clone(),
            message: e.to_string(),
        })?;
        let file: SettingsFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::Settings {
                origin: origin.clone(),
                message: e.to_string(),
            })?;
        debug!(file = %origin, "read settings file");

        if let Some(path) = file.config_path {
            self.config_path = Some(path);
        }
        if let Some(env) = file.config_env {
            self.config_env = env;
        }
        for (resolver, options) in file.remote_options {
            self.remote_options.entry(resolver).or_default().extend(options);
        }
        Ok(())
    }

    fn apply_pairs<'a>(
        &mut self,
        pairs: impl Iterator<Item = (&'a str, &'a str)>,
        resolver_names: &[&str],
    ) {
        let prefixes: Vec<(String, &str)> = resolver_names
            .iter()
            .map(|name| (format!("{}_", name.to_shouty_snake_case()), *name))
            .collect();

        for (key, value) in pairs {
            match key {
                CONFIG_PATH_VAR | "configPath" => self.config_path = Some(PathBuf::from(value)),
                CONFIG_ENV_VAR | "configEnv" => self.config_env = value.to_string(),
                _ => {
                    for (prefix, resolver) in &prefixes {
                        if let Some(option) = key.strip_prefix(prefix.as_str())
                            && !option.is_empty()
                        {
                            self.remote_options
                                .entry(resolver.to_string())
                                .or_default()
                                .insert(option.to_lower_camel_case(), Value::String(value.to_string()));
                        }
                    }
                }
            }
        }
    }

    /// Options object for one resolver, if any were given.
    pub fn options_for(&self, resolver: &str) -> Option<Value> {
        self.remote_options
            .get(resolver)
            .map(|options| Value::Object(options.clone()))
    }
}
