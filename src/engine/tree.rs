//! Asynchronous resolution of whole subtrees.

use super::placeholders::PlaceholderResolver;
use crate::config::{ConfigValue, Lookup, split_path};
use crate::error::{ConfigError, Result};
use futures::future::{BoxFuture, FutureExt, join_all};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// How many promise/placeholder hops a single node may take before
/// resolution gives up.
pub const MAX_RESOLVE_DEPTH: usize = 32;

/// Turns a subtree containing promises and placeholders into a concrete one.
///
/// Siblings resolve concurrently. When several fail, the error of the first
/// failing sibling in structural order is reported; the others still run to
/// completion so their fetches land in the cache.
#[derive(Clone)]
pub struct TreeResolver {
    placeholders: Arc<PlaceholderResolver>,
}

impl TreeResolver {
    pub fn new(placeholders: Arc<PlaceholderResolver>) -> Self {
        Self { placeholders }
    }

    pub fn placeholders(&self) -> &Arc<PlaceholderResolver> {
        &self.placeholders
    }

    /// Resolve `node` until nothing deferred remains.
    pub async fn resolve(&self, node: ConfigValue) -> Result<ConfigValue> {
        if node.is_concrete() {
            return Ok(node);
        }
        self.resolve_at(node, 0).await
    }

    fn resolve_at(&self, node: ConfigValue, hops: usize) -> BoxFuture<'_, Result<ConfigValue>> {
        async move {
            match node {
                ConfigValue::Root { properties } => Ok(ConfigValue::Root {
                    properties: self.resolve_map(properties, hops).await?,
                }),
                ConfigValue::Object { source, properties } => Ok(ConfigValue::Object {
                    source,
                    properties: self.resolve_map(properties, hops).await?,
                }),
                ConfigValue::Array { source, items } => {
                    let results = join_all(items.into_iter().map(|item| self.resolve_at(item, hops))).await;
                    Ok(ConfigValue::Array {
                        source,
                        items: results.into_iter().collect::<Result<Vec<_>>>()?,
                    })
                }
                ConfigValue::Promise { source, pending } => {
                    check_depth(hops)?;
                    let raw = pending.wait().await?;
                    self.resolve_at(ConfigValue::lift(raw, source), hops + 1).await
                }
                ConfigValue::Placeholder { spec, .. } => {
                    check_depth(hops)?;
                    let resolved = self.placeholders.resolve(&spec).await?;
                    self.resolve_at(resolved, hops + 1).await
                }
                primitive @ ConfigValue::Primitive { .. } => Ok(primitive),
            }
        }
        .boxed()
    }

    async fn resolve_map(
        &self,
        properties: BTreeMap<String, ConfigValue>,
        hops: usize,
    ) -> Result<BTreeMap<String, ConfigValue>> {
        let (keys, nodes): (Vec<String>, Vec<ConfigValue>) = properties.into_iter().unzip();
        let results = join_all(nodes.into_iter().map(|node| self.resolve_at(node, hops))).await;
        keys.into_iter()
            .zip(results)
            .map(|(key, result)| result.map(|node| (key, node)))
            .collect()
    }

    /// Resolve every top-level key independently.
    ///
    /// A key that fails keeps its unresolved node; the failure surfaces when
    /// that key is queried.
    pub async fn settle(&self, tree: ConfigValue) -> ConfigValue {
        let ConfigValue::Root { properties } = tree else {
            return tree;
        };
        let settled = join_all(properties.into_iter().map(|(key, node)| async move {
            if node.is_concrete() {
                return (key, node);
            }
            match self.resolve(node.clone()).await {
                Ok(resolved) => (key, resolved),
                Err(err) => {
                    debug!(key = %key, error = %err, "left unresolved at startup");
                    (key, node)
                }
            }
        }))
        .await;
        ConfigValue::Root {
            properties: settled.into_iter().collect(),
        }
    }

    /// Resolve whatever stands between the root of `tree` and `path`,
    /// writing resolved nodes back into `tree`.
    ///
    /// Returns `None` when the path does not exist.
    pub async fn resolve_path(&self, tree: &mut ConfigValue, path: &str) -> Result<Option<ConfigValue>> {
        let segments = split_path(path);
        loop {
            let (depth, pending) = match tree.lookup(path) {
                Lookup::Found(node) if node.is_concrete() => return Ok(Some(node.clone())),
                Lookup::Found(node) => (segments.len(), node.clone()),
                Lookup::Deferred { node, depth } => (depth, node.clone()),
                Lookup::Missing => return Ok(None),
            };
            let resolved = self.resolve(pending).await?;
            if !tree.replace_at(&segments[..depth], resolved) {
                return Ok(None);
            }
        }
    }
}

fn check_depth(hops: usize) -> Result<()> {
    if hops >= MAX_RESOLVE_DEPTH {
        Err(ConfigError::ResolutionDepth {
            limit: MAX_RESOLVE_DEPTH,
        })
    } else {
        Ok(())
    }
}
