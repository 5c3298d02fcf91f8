//! Built-in `env` and `process` resolvers.
//!
//! Both are addressed by name from placeholders and need no registration.
//! [`Env`] wraps environment lookups so tests can supply a controlled set of
//! variables instead of mutating the real process environment.

use regex_lite::Regex;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::sync::LazyLock;
use tracing::debug;

/// Name of the built-in environment resolver.
pub const ENV_RESOLVER: &str = "env";
/// Name of the built-in process-argument resolver.
pub const PROCESS_RESOLVER: &str = "process";

/// True for names that cannot be registered as remote resolvers.
pub fn is_builtin(name: &str) -> bool {
    name == ENV_RESOLVER || name == PROCESS_RESOLVER
}

/// Environment variable reader.
#[derive(Clone, Debug, Default)]
pub struct Env {
    overrides: Option<HashMap<String, String>>,
}

impl Env {
    /// Read from the real process environment.
    pub fn real() -> Self {
        Self { overrides: None }
    }

    /// An environment backed by explicit key-value pairs.
    pub fn from_vars(
        vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        Self {
            overrides: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn var(&self, name: &str) -> Option<String> {
        match &self.overrides {
            Some(map) => map.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    /// All variables, sorted by name.
    pub fn vars(&self) -> BTreeMap<String, String> {
        match &self.overrides {
            Some(map) => map.clone().into_iter().collect(),
            None => utf8_vars(std::env::vars_os()),
        }
    }
}

/// Keep the variables whose name and value are both valid UTF-8.
fn utf8_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> BTreeMap<String, String> {
    vars.into_iter()
        .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (Ok(name), Err(_)) => {
                debug!(variable = name, "ignoring environment variable with a non-UTF-8 value");
                None
            }
            (Err(name), _) => {
                debug!(variable = ?name, "ignoring environment variable with a non-UTF-8 name");
                None
            }
        })
        .collect()
}

static ARG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_.\-]*)=(.*)$").expect("argument pattern is valid")
});

/// Process arguments of the form `<name>=<value>`.
///
/// Anything else on the command line is ignored.
#[derive(Clone, Debug, Default)]
pub struct ProcessArgs {
    values: BTreeMap<String, String>,
}

impl ProcessArgs {
    /// Arguments of the current process, skipping the program name.
    pub fn from_env() -> Self {
        Self::from_os(std::env::args_os().skip(1))
    }

    /// Like [`new`](Self::new), ignoring arguments that are not UTF-8.
    pub fn from_os(args: impl IntoIterator<Item = OsString>) -> Self {
        Self::new(args.into_iter().filter_map(|arg| match arg.into_string() {
            Ok(arg) => Some(arg),
            Err(arg) => {
                debug!(argument = ?arg, "ignoring process argument that is not UTF-8");
                None
            }
        }))
    }

    pub fn new(args: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let mut values = BTreeMap::new();
        for arg in args {
            let arg = arg.as_ref();
            match ARG_PATTERN.captures(arg) {
                Some(caps) => {
                    values.insert(caps[1].to_string(), caps[2].to_string());
                }
                None => debug!(argument = arg, "ignoring malformed process argument"),
            }
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_env_reads_cargo_manifest_dir() {
        assert!(Env::real().var("CARGO_MANIFEST_DIR").is_some());
    }

    #[test]
    fn mock_env_returns_set_values() {
        let env = Env::from_vars([("FOO", "bar"), ("BAZ", "qux")]);
        assert_eq!(env.var("FOO").as_deref(), Some("bar"));
        assert_eq!(env.var("MISSING"), None);
        assert_eq!(env.vars().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let vars = utf8_vars([
            (OsString::from("GOOD"), OsString::from("yes")),
            (OsString::from("BAD_VALUE"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![0xff]), OsString::from("x")),
        ]);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("GOOD").map(String::as_str), Some("yes"));
    }

    #[test]
    fn real_env_listing_does_not_panic() {
        assert!(Env::real().vars().contains_key("CARGO_MANIFEST_DIR"));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_arguments_are_ignored() {
        use std::os::unix::ffi::OsStringExt;

        let args = ProcessArgs::from_os([
            OsString::from("PORT=8080"),
            OsString::from_vec(vec![b'X', b'=', 0xff]),
        ]);
        assert_eq!(args.get("PORT"), Some("8080"));
        assert_eq!(args.get("X"), None);
        assert_eq!(args.iter().count(), 1);
    }

    #[test]
    fn parses_name_value_arguments() {
        let args = ProcessArgs::new(["PORT=8080", "CONFIG_ENV=production", "db.url=a=b"]);
        assert_eq!(args.get("PORT"), Some("8080"));
        assert_eq!(args.get("CONFIG_ENV"), Some("production"));
        assert_eq!(args.get("db.url"), Some("a=b"));
    }

    #[test]
    fn malformed_arguments_are_ignored() {
        let args = ProcessArgs::new(["--verbose", "=value", "9LIVES=x", "plain", "EMPTY="]);
        assert_eq!(args.get("EMPTY"), Some(""));
        assert_eq!(args.iter().count(), 1);
    }

    #[test]
    fn builtin_names() {
        assert!(is_builtin("env"));
        assert!(is_builtin("process"));
        assert!(!is_builtin("consul"));
    }
}
