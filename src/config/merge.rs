//! Deep merge for configuration trees.
//!
//! Implements key-by-key merging where the overlay takes precedence over the base.
//! Arrays are replaced entirely, not concatenated.

use super::value::ConfigValue;
use serde_json::Value;
use std::collections::BTreeMap;

/// Deep merge two trees, with `overlay` taking precedence over `base`.
///
/// - Mappings (`Root`/`Object`) are merged recursively: keys in overlay override keys in base
/// - Everything else (arrays, primitives, promises, placeholders) is replaced entirely
/// - A type mismatch resolves by replacement, never by blending
///
/// # Example
/// ```
/// use layerconf::config::{ConfigValue, RawValue, Source, merge};
/// use serde_json::json;
///
/// let base = ConfigValue::lift_root(
///     RawValue::Json(json!({"server": {"port": 8080, "host": "localhost"}, "features": ["a", "b"]})),
///     Source::Local,
///     "default",
/// ).unwrap();
/// let overlay = ConfigValue::lift_root(
///     RawValue::Json(json!({"server": {"port": 9000}, "features": ["c"]})),
///     Source::Local,
///     "production",
/// ).unwrap();
/// let merged = merge(base, overlay);
/// assert_eq!(
///     merged.to_json().unwrap(),
///     json!({"server": {"port": 9000, "host": "localhost"}, "features": ["c"]})
/// );
/// ```
pub fn merge(base: ConfigValue, overlay: ConfigValue) -> ConfigValue {
    match (base, overlay) {
        (ConfigValue::Root { properties: base }, ConfigValue::Root { properties: overlay })
        | (
            ConfigValue::Root { properties: base },
            ConfigValue::Object {
                properties: overlay,
                ..
            },
        ) => ConfigValue::Root {
            properties: merge_maps(base, overlay),
        },
        (
            ConfigValue::Object {
                properties: base, ..
            },
            ConfigValue::Object {
                source,
                properties: overlay,
            },
        ) => ConfigValue::Object {
            source,
            properties: merge_maps(base, overlay),
        },
        // Any other case: overlay replaces base entirely
        (_, overlay) => overlay,
    }
}

fn merge_maps(
    mut base: BTreeMap<String, ConfigValue>,
    overlay: BTreeMap<String, ConfigValue>,
) -> BTreeMap<String, ConfigValue> {
    for (key, overlay_value) in overlay {
        let merged_value = if let Some(base_value) = base.remove(&key) {
            merge(base_value, overlay_value)
        } else {
            overlay_value
        };
        base.insert(key, merged_value);
    }
    base
}

/// Merge multiple trees in order, with later trees taking precedence.
///
/// Equivalent to folding `merge` over the list, starting from an empty root.
pub fn merge_all(values: impl IntoIterator<Item = ConfigValue>) -> ConfigValue {
    values.into_iter().fold(ConfigValue::empty_root(), merge)
}

/// The same rule applied to plain JSON, for resolvers that combine several
/// payloads before handing them to the engine.
pub fn deep_merge_json(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = if let Some(base_value) = base_map.remove(&key) {
                    deep_merge_json(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}
