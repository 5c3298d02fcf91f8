//! Ordered registry of remote resolvers.

use super::builtin::is_builtin;
use super::{RemoteResolver, ResolverKind};
use crate::error::{ConfigError, Result};
use std::sync::Arc;

/// Resolvers in registration order.
///
/// Registration order is merge priority for bulk payloads and search order
/// for unnamed remote/secret lookups.
#[derive(Default, Clone)]
pub struct ResolverRegistry {
    resolvers: Vec<Arc<dyn RemoteResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolver. Duplicate and built-in names are rejected.
    pub fn register(&mut self, resolver: Arc<dyn RemoteResolver>) -> Result<()> {
        let name = resolver.name();
        if is_builtin(name) {
            return Err(ConfigError::ReservedResolverName {
                name: name.to_string(),
            });
        }
        if self.get(name).is_some() {
            return Err(ConfigError::DuplicateResolver {
                name: name.to_string(),
            });
        }
        self.resolvers.push(resolver);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RemoteResolver>> {
        self.resolvers.iter().find(|r| r.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RemoteResolver>> {
        self.resolvers.iter()
    }

    /// Resolvers of one kind, in registration order.
    pub fn of_kind(&self, kind: ResolverKind) -> impl Iterator<Item = &Arc<dyn RemoteResolver>> {
        self.resolvers.iter().filter(move |r| r.kind() == kind)
    }

    pub fn names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &self.names())
            .finish()
    }
}
