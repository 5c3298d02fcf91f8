//! Pluggable remote and secret resolvers.
//!
//! A resolver contributes in two ways:
//! - **Bulk payload**: `init` runs once at startup and may return an object
//!   that is deep-merged over the local files, in registration order.
//! - **Per-key lookups**: `get` answers placeholders such as
//!   `{"_source": "consul", "_key": "db/password"}` and direct
//!   `get_remote_value` / `get_secret_value` queries.
//!
//! `env` and `process` are built in and addressed by name without registration.

pub mod builtin;
pub mod consul;
pub mod registry;
pub mod vault;

use crate::config::{ConfigValue, ExpectedType, RawValue, Source};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use builtin::{Env, ProcessArgs};
pub use consul::ConsulResolver;
pub use registry::ResolverRegistry;
pub use vault::VaultResolver;

/// Whether a resolver serves ordinary remote values or secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    Remote,
    /// Secret resolvers never fall back to a placeholder's `_default`.
    Secret,
}

impl ResolverKind {
    /// Source tag applied to values this kind of resolver produces.
    pub fn source(&self) -> Source {
        match self {
            ResolverKind::Remote => Source::Remote,
            ResolverKind::Secret => Source::Secret,
        }
    }
}

impl std::fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolverKind::Remote => write!(f, "remote"),
            ResolverKind::Secret => write!(f, "secret"),
        }
    }
}

/// A named key/value provider backed by a remote or secret store.
#[async_trait]
pub trait RemoteResolver: Send + Sync {
    /// Unique name, referenced by placeholders' `_source`.
    fn name(&self) -> &str;

    fn kind(&self) -> ResolverKind;

    /// Run once at startup.
    ///
    /// `config` is the tree merged so far (local files plus earlier
    /// resolvers' payloads). `options` are this resolver's entry in the
    /// process-wide remote options. A returned payload is merged over `config`.
    async fn init(&self, config: &ConfigValue, options: Option<&Value>) -> Result<Option<RawValue>> {
        let _ = (config, options);
        Ok(None)
    }

    /// Config key holding this resolver's connection settings, if any.
    fn settings_key(&self) -> Option<&str> {
        None
    }

    /// Receive the resolved value at [`settings_key`](Self::settings_key)
    /// once every bulk payload has been merged.
    async fn configure(&self, settings: Option<&Value>) -> Result<()> {
        let _ = settings;
        Ok(())
    }

    /// Fetch a single key.
    ///
    /// Implementations may ignore `expected`; the engine coerces the result
    /// afterwards. Returning `Value::Null` means the key has no value.
    async fn get(&self, key: &str, expected: Option<ExpectedType>) -> Result<Value>;
}
