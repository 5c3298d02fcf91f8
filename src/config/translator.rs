//! Translators rewrite loaded documents before they are merged.

use super::value::{RawValue, split_path};
use crate::resolvers::Env;
use regex_lite::{Captures, Regex};
use serde_json::Value;
use std::sync::{Arc, LazyLock};

/// Rewrites values after load and before merge.
pub trait Translator: Send + Sync {
    /// Dotted paths to apply to. `None` applies to the whole document.
    fn paths(&self) -> Option<Vec<String>> {
        None
    }

    fn translate(&self, value: Value) -> Value;
}

/// Translator built from a closure.
pub struct FnTranslator<F> {
    paths: Option<Vec<String>>,
    f: F,
}

impl<F> FnTranslator<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    pub fn global(f: F) -> Self {
        Self { paths: None, f }
    }

    pub fn at(paths: impl IntoIterator<Item = impl Into<String>>, f: F) -> Self {
        Self {
            paths: Some(paths.into_iter().map(Into::into).collect()),
            f,
        }
    }
}

impl<F> Translator for FnTranslator<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    fn paths(&self) -> Option<Vec<String>> {
        self.paths.clone()
    }

    fn translate(&self, value: Value) -> Value {
        (self.f)(value)
    }
}

static INTERPOLATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("interpolation pattern is valid")
});

/// Replaces `${NAME}` in every string with the environment variable `NAME`.
///
/// Unknown variables are left as written.
#[derive(Debug, Clone, Default)]
pub struct EnvInterpolation {
    env: Env,
}

impl EnvInterpolation {
    pub fn new(env: Env) -> Self {
        Self { env }
    }

    fn interpolate(&self, s: &str) -> String {
        INTERPOLATION
            .replace_all(s, |caps: &Captures| {
                self.env
                    .var(&caps[1])
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

impl Translator for EnvInterpolation {
    fn translate(&self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.interpolate(&s)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.translate(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.translate(v)))
                    .collect(),
            ),
            other => other,
        }
    }
}

/// Run every translator over a raw document, in registration order.
pub fn apply_translators(mut raw: RawValue, translators: &[Arc<dyn Translator>]) -> RawValue {
    for translator in translators {
        raw = match translator.paths() {
            None => translate_raw(raw, translator.clone()),
            Some(paths) => paths.iter().fold(raw, |doc, path| {
                translate_at(doc, &split_path(path), translator.clone())
            }),
        };
    }
    raw
}

/// Translate every concrete fragment of `raw`. Deferred parts are translated
/// once they resolve.
fn translate_raw(raw: RawValue, translator: Arc<dyn Translator>) -> RawValue {
    match raw {
        RawValue::Json(value) => RawValue::Json(translator.translate(value)),
        RawValue::Object(map) => RawValue::Object(
            map.into_iter()
                .map(|(k, v)| (k, translate_raw(v, translator.clone())))
                .collect(),
        ),
        RawValue::Array(items) => RawValue::Array(
            items
                .into_iter()
                .map(|v| translate_raw(v, translator.clone()))
                .collect(),
        ),
        RawValue::Pending(deferred) => {
            RawValue::Pending(deferred.map(move |resolved| translate_raw(resolved, translator)))
        }
    }
}

/// Translate the node at `segments`; documents without that path are
/// returned unchanged.
fn translate_at(raw: RawValue, segments: &[&str], translator: Arc<dyn Translator>) -> RawValue {
    let Some((head, rest)) = segments.split_first() else {
        return translate_raw(raw, translator);
    };
    match raw {
        RawValue::Json(value) => RawValue::Json(translate_json_at(value, segments, translator.as_ref())),
        RawValue::Object(mut map) => {
            if let Some(child) = map.remove(*head) {
                map.insert(head.to_string(), translate_at(child, rest, translator));
            }
            RawValue::Object(map)
        }
        RawValue::Array(mut items) => {
            if let Some(index) = head.parse::<usize>().ok().filter(|i| *i < items.len()) {
                let child = std::mem::replace(&mut items[index], RawValue::Json(Value::Null));
                items[index] = translate_at(child, rest, translator);
            }
            RawValue::Array(items)
        }
        RawValue::Pending(deferred) => {
            let owned: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
            RawValue::Pending(deferred.map(move |resolved| {
                let segments: Vec<&str> = owned.iter().map(String::as_str).collect();
                translate_at(resolved, &segments, translator)
            }))
        }
    }
}

fn translate_json_at(mut value: Value, segments: &[&str], translator: &dyn Translator) -> Value {
    let pointer: String = segments.iter().map(|s| format!("/{}", escape_pointer(s))).collect();
    if let Some(target) = value.pointer_mut(&pointer) {
        let current = std::mem::take(target);
        *target = translator.translate(current);
    }
    value
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
