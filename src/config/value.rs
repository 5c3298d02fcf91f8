//! The typed configuration tree.
//!
//! Raw documents (from file loaders and resolvers) are lifted into
//! [`ConfigValue`] nodes. Deferred parts of a document stay explicit as
//! `Promise` and `Placeholder` nodes until the engine resolves them.

use super::placeholder::PlaceholderSpec;
use crate::error::{ConfigError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::future::Future;

/// Provenance of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Local,
    Remote,
    Secret,
    Env,
    Process,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Local => write!(f, "local"),
            Source::Remote => write!(f, "remote"),
            Source::Secret => write!(f, "secret"),
            Source::Env => write!(f, "env"),
            Source::Process => write!(f, "process"),
        }
    }
}

/// A shareable deferred computation producing a raw value.
///
/// Cloning a `Deferred` shares the computation: it runs at most once and
/// every clone observes the same outcome.
#[derive(Clone)]
pub struct Deferred(Shared<BoxFuture<'static, Result<RawValue>>>);

impl Deferred {
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = Result<RawValue>> + Send + 'static,
    {
        Self(fut.boxed().shared())
    }

    /// A computation that succeeds with plain JSON.
    pub fn from_json<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::new(async move { fut.await.map(RawValue::Json) })
    }

    pub fn ready(raw: RawValue) -> Self {
        Self::new(futures::future::ready(Ok(raw)))
    }

    pub fn rejected(err: ConfigError) -> Self {
        Self::new(futures::future::ready(Err(err)))
    }

    /// Await the computation.
    pub async fn wait(&self) -> Result<RawValue> {
        self.0.clone().await
    }

    /// Chain a transformation onto the eventual value.
    pub fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(RawValue) -> RawValue + Send + 'static,
    {
        Self::new(async move { self.wait().await.map(f) })
    }

    pub fn ptr_eq(&self, other: &Deferred) -> bool {
        Shared::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// Loosely-typed input to lifting.
///
/// Plain documents are `Json`. Loaders that embed deferred computations build
/// the surrounding structure with `Object`/`Array` and put the computation in
/// `Pending`.
#[derive(Debug, Clone)]
pub enum RawValue {
    Json(Value),
    Object(BTreeMap<String, RawValue>),
    Array(Vec<RawValue>),
    Pending(Deferred),
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        RawValue::Json(value)
    }
}

impl RawValue {
    /// Await a top-level pending value until a concrete shape appears.
    pub async fn settle_top(self) -> Result<RawValue> {
        let mut current = self;
        while let RawValue::Pending(deferred) = current {
            current = deferred.wait().await?;
        }
        Ok(current)
    }
}

/// Terminal scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Primitive {
    pub fn to_json(&self) -> Value {
        match self {
            Primitive::Null => Value::Null,
            Primitive::Bool(b) => Value::Bool(*b),
            Primitive::Number(n) => Value::Number(n.clone()),
            Primitive::String(s) => Value::String(s.clone()),
        }
    }
}

/// A node in the configuration tree.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    Root {
        properties: BTreeMap<String, ConfigValue>,
    },
    Object {
        source: Source,
        properties: BTreeMap<String, ConfigValue>,
    },
    Array {
        source: Source,
        items: Vec<ConfigValue>,
    },
    Primitive {
        source: Source,
        value: Primitive,
    },
    Promise {
        source: Source,
        pending: Deferred,
    },
    Placeholder {
        source: Source,
        spec: PlaceholderSpec,
    },
}

/// Outcome of a dotted-path lookup.
#[derive(Debug)]
pub enum Lookup<'a> {
    Found(&'a ConfigValue),
    /// Traversal hit a deferred node after consuming `depth` segments.
    Deferred {
        node: &'a ConfigValue,
        depth: usize,
    },
    Missing,
}

/// Split a dotted path into segments. The empty path has no segments.
pub fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

impl ConfigValue {
    pub fn empty_root() -> Self {
        ConfigValue::Root {
            properties: BTreeMap::new(),
        }
    }

    /// Lift a raw value, tagging every node with `source`.
    pub fn lift(raw: RawValue, source: Source) -> Self {
        match raw {
            RawValue::Json(value) => Self::lift_json(value, source),
            RawValue::Object(map) => {
                if let Some(spec) = detect_raw_placeholder(&map) {
                    return ConfigValue::Placeholder { source, spec };
                }
                ConfigValue::Object {
                    source,
                    properties: map
                        .into_iter()
                        .map(|(k, v)| (k, Self::lift(v, source)))
                        .collect(),
                }
            }
            RawValue::Array(items) => ConfigValue::Array {
                source,
                items: items.into_iter().map(|v| Self::lift(v, source)).collect(),
            },
            RawValue::Pending(pending) => ConfigValue::Promise { source, pending },
        }
    }

    pub fn lift_json(value: Value, source: Source) -> Self {
        match value {
            Value::Object(map) => {
                if let Some(spec) = PlaceholderSpec::detect(&map) {
                    return ConfigValue::Placeholder { source, spec };
                }
                ConfigValue::Object {
                    source,
                    properties: map
                        .into_iter()
                        .map(|(k, v)| (k, Self::lift_json(v, source)))
                        .collect(),
                }
            }
            Value::Array(items) => ConfigValue::Array {
                source,
                items: items
                    .into_iter()
                    .map(|v| Self::lift_json(v, source))
                    .collect(),
            },
            Value::Null => ConfigValue::Primitive {
                source,
                value: Primitive::Null,
            },
            Value::Bool(b) => ConfigValue::Primitive {
                source,
                value: Primitive::Bool(b),
            },
            Value::Number(n) => ConfigValue::Primitive {
                source,
                value: Primitive::Number(n),
            },
            Value::String(s) => ConfigValue::Primitive {
                source,
                value: Primitive::String(s),
            },
        }
    }

    /// Lift a whole document into a `Root`. The document must be a mapping.
    pub fn lift_root(raw: RawValue, source: Source, origin: &str) -> Result<Self> {
        match Self::lift(raw, source) {
            ConfigValue::Object { properties, .. } => Ok(ConfigValue::Root { properties }),
            root @ ConfigValue::Root { .. } => Ok(root),
            _ => Err(ConfigError::InvalidDocument {
                origin: origin.to_string(),
            }),
        }
    }

    /// Provenance, `None` for the root.
    pub fn source(&self) -> Option<Source> {
        match self {
            ConfigValue::Root { .. } => None,
            ConfigValue::Object { source, .. }
            | ConfigValue::Array { source, .. }
            | ConfigValue::Primitive { source, .. }
            | ConfigValue::Promise { source, .. }
            | ConfigValue::Placeholder { source, .. } => Some(*source),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ConfigValue::Root { .. } => "root",
            ConfigValue::Object { .. } => "object",
            ConfigValue::Array { .. } => "array",
            ConfigValue::Primitive { .. } => "primitive",
            ConfigValue::Promise { .. } => "promise",
            ConfigValue::Placeholder { .. } => "placeholder",
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(
            self,
            ConfigValue::Promise { .. } | ConfigValue::Placeholder { .. }
        )
    }

    pub fn properties(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Root { properties } | ConfigValue::Object { properties, .. } => {
                Some(properties)
            }
            _ => None,
        }
    }

    /// True when no `Promise` or `Placeholder` remains anywhere below.
    pub fn is_concrete(&self) -> bool {
        match self {
            ConfigValue::Root { properties } | ConfigValue::Object { properties, .. } => {
                properties.values().all(ConfigValue::is_concrete)
            }
            ConfigValue::Array { items, .. } => items.iter().all(ConfigValue::is_concrete),
            ConfigValue::Primitive { .. } => true,
            ConfigValue::Promise { .. } | ConfigValue::Placeholder { .. } => false,
        }
    }

    /// Plain JSON for a concrete tree, `None` if anything is still deferred.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            ConfigValue::Root { properties } | ConfigValue::Object { properties, .. } => {
                let mut map = Map::new();
                for (k, v) in properties {
                    map.insert(k.clone(), v.to_json()?);
                }
                Some(Value::Object(map))
            }
            ConfigValue::Array { items, .. } => items
                .iter()
                .map(ConfigValue::to_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            ConfigValue::Primitive { value, .. } => Some(value.to_json()),
            ConfigValue::Promise { .. } | ConfigValue::Placeholder { .. } => None,
        }
    }

    fn child(&self, segment: &str) -> Option<&ConfigValue> {
        match self {
            ConfigValue::Root { properties } | ConfigValue::Object { properties, .. } => {
                properties.get(segment)
            }
            ConfigValue::Array { items, .. } => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    fn child_mut(&mut self, segment: &str) -> Option<&mut ConfigValue> {
        match self {
            ConfigValue::Root { properties } | ConfigValue::Object { properties, .. } => {
                properties.get_mut(segment)
            }
            ConfigValue::Array { items, .. } => segment
                .parse::<usize>()
                .ok()
                .and_then(move |i| items.get_mut(i)),
            _ => None,
        }
    }

    /// Walk a dotted path.
    ///
    /// Stops early at a `Promise` or `Placeholder`, since what lies below it
    /// is unknown until it resolves.
    pub fn lookup(&self, path: &str) -> Lookup<'_> {
        let mut current = self;
        for (depth, segment) in split_path(path).into_iter().enumerate() {
            if current.is_deferred() {
                return Lookup::Deferred {
                    node: current,
                    depth,
                };
            }
            match current.child(segment) {
                Some(next) => current = next,
                None => return Lookup::Missing,
            }
        }
        Lookup::Found(current)
    }

    /// Node at a path, ignoring anything deferred.
    pub fn get_path(&self, path: &str) -> Option<&ConfigValue> {
        match self.lookup(path) {
            Lookup::Found(node) => Some(node),
            _ => None,
        }
    }

    /// Replace the node at `segments`. Returns false if the path no longer
    /// exists.
    pub fn replace_at(&mut self, segments: &[&str], node: ConfigValue) -> bool {
        let mut current = self;
        for segment in segments {
            match current.child_mut(segment) {
                Some(next) => current = next,
                None => return false,
            }
        }
        *current = node;
        true
    }
}

/// Equality on structure and values. Promises compare by identity.
impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConfigValue::Root { properties: a }, ConfigValue::Root { properties: b }) => a == b,
            (
                ConfigValue::Object {
                    source: sa,
                    properties: a,
                },
                ConfigValue::Object {
                    source: sb,
                    properties: b,
                },
            ) => sa == sb && a == b,
            (
                ConfigValue::Array { source: sa, items: a },
                ConfigValue::Array { source: sb, items: b },
            ) => sa == sb && a == b,
            (
                ConfigValue::Primitive { source: sa, value: a },
                ConfigValue::Primitive { source: sb, value: b },
            ) => sa == sb && a == b,
            (
                ConfigValue::Promise {
                    source: sa,
                    pending: a,
                },
                ConfigValue::Promise {
                    source: sb,
                    pending: b,
                },
            ) => sa == sb && a.ptr_eq(b),
            (
                ConfigValue::Placeholder { source: sa, spec: a },
                ConfigValue::Placeholder { source: sb, spec: b },
            ) => sa == sb && a == b,
            _ => false,
        }
    }
}

fn detect_raw_placeholder(map: &BTreeMap<String, RawValue>) -> Option<PlaceholderSpec> {
    if map.is_empty() || !map.keys().all(|k| super::placeholder::is_placeholder_field(k)) {
        return None;
    }
    let mut json = Map::new();
    for (k, v) in map {
        match v {
            RawValue::Json(value) => {
                json.insert(k.clone(), value.clone());
            }
            _ => return None,
        }
    }
    PlaceholderSpec::detect(&json)
}
