//! Structured error types for configuration resolution.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Resolution errors
    MissingConfigPlaceholder,
    MissingEnvironmentVariable,
    MissingProcessVariable,
    ResolverUnavailable,
    InvalidType,
    Rejected,
    ResolutionDepth,

    // Query errors
    DynamicConfigMissingKey,
    DynamicConfigInvalidObject,

    // Store errors
    NotConfigured,
    StoreFailed,

    // Setup errors
    DuplicateResolver,
    ReservedResolverName,
    ConfigDirNotFound,
    DefaultConfigMissing,
    FileLoad,
    InvalidDocument,
    Settings,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingConfigPlaceholder => "MISSING_CONFIG_PLACEHOLDER",
            ErrorCode::MissingEnvironmentVariable => "MISSING_ENVIRONMENT_VARIABLE",
            ErrorCode::MissingProcessVariable => "MISSING_PROCESS_VARIABLE",
            ErrorCode::ResolverUnavailable => "RESOLVER_UNAVAILABLE",
            ErrorCode::InvalidType => "INVALID_TYPE",
            ErrorCode::Rejected => "REJECTED",
            ErrorCode::ResolutionDepth => "RESOLUTION_DEPTH",
            ErrorCode::DynamicConfigMissingKey => "DYNAMIC_CONFIG_MISSING_KEY",
            ErrorCode::DynamicConfigInvalidObject => "DYNAMIC_CONFIG_INVALID_OBJECT",
            ErrorCode::NotConfigured => "NOT_CONFIGURED",
            ErrorCode::StoreFailed => "STORE_FAILED",
            ErrorCode::DuplicateResolver => "DUPLICATE_RESOLVER",
            ErrorCode::ReservedResolverName => "RESERVED_RESOLVER_NAME",
            ErrorCode::ConfigDirNotFound => "CONFIG_DIR_NOT_FOUND",
            ErrorCode::DefaultConfigMissing => "DEFAULT_CONFIG_MISSING",
            ErrorCode::FileLoad => "FILE_LOAD",
            ErrorCode::InvalidDocument => "INVALID_DOCUMENT",
            ErrorCode::Settings => "SETTINGS",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure the resolution engine can report.
///
/// Errors are `Clone` because resolution outcomes are cached and shared
/// between concurrent callers waiting on the same fetch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unable to resolve placeholder {source_name}:{key}: {reason}")]
    MissingConfigPlaceholder {
        source_name: String,
        key: String,
        reason: String,
    },

    #[error("environment variable '{name}' is not set")]
    MissingEnvironmentVariable { name: String },

    #[error("process argument '{name}' was not provided")]
    MissingProcessVariable { name: String },

    #[error("no resolver available for '{name}'")]
    ResolverUnavailable { name: String },

    #[error("expected a value of type {expected}: {message}")]
    InvalidType { expected: String, message: String },

    #[error("deferred value rejected: {message}")]
    Rejected { message: String },

    #[error("placeholder nesting exceeded the limit of {limit}")]
    ResolutionDepth { limit: usize },

    #[error("no value found at config path '{path}'")]
    DynamicConfigMissingKey { path: String },

    #[error("value at '{path}' is invalid: {}", errors.join("; "))]
    DynamicConfigInvalidObject { path: String, errors: Vec<String> },

    #[error("{store} is not configured")]
    NotConfigured { store: String },

    #[error("{store} request failed: {message}")]
    StoreFailed { store: String, message: String },

    #[error("a resolver named '{name}' is already registered")]
    DuplicateResolver { name: String },

    #[error("'{name}' is a built-in resolver name and cannot be registered")]
    ReservedResolverName { name: String },

    #[error("no config directory found under {}", root.display())]
    ConfigDirNotFound { root: PathBuf },

    #[error("no default config file found in {}", dir.display())]
    DefaultConfigMissing { dir: PathBuf },

    #[error("failed to load {}: {message}", path.display())]
    FileLoad { path: PathBuf, message: String },

    #[error("{origin} must contain a mapping at the top level")]
    InvalidDocument { origin: String },

    #[error("invalid settings in {origin}: {message}")]
    Settings { origin: String, message: String },
}

impl ConfigError {
    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfigError::MissingConfigPlaceholder { .. } => ErrorCode::MissingConfigPlaceholder,
            ConfigError::MissingEnvironmentVariable { .. } => ErrorCode::MissingEnvironmentVariable,
            ConfigError::MissingProcessVariable { .. } => ErrorCode::MissingProcessVariable,
            ConfigError::ResolverUnavailable { .. } => ErrorCode::ResolverUnavailable,
            ConfigError::InvalidType { .. } => ErrorCode::InvalidType,
            ConfigError::Rejected { .. } => ErrorCode::Rejected,
            ConfigError::ResolutionDepth { .. } => ErrorCode::ResolutionDepth,
            ConfigError::DynamicConfigMissingKey { .. } => ErrorCode::DynamicConfigMissingKey,
            ConfigError::DynamicConfigInvalidObject { .. } => ErrorCode::DynamicConfigInvalidObject,
            ConfigError::NotConfigured { .. } => ErrorCode::NotConfigured,
            ConfigError::StoreFailed { .. } => ErrorCode::StoreFailed,
            ConfigError::DuplicateResolver { .. } => ErrorCode::DuplicateResolver,
            ConfigError::ReservedResolverName { .. } => ErrorCode::ReservedResolverName,
            ConfigError::ConfigDirNotFound { .. } => ErrorCode::ConfigDirNotFound,
            ConfigError::DefaultConfigMissing { .. } => ErrorCode::DefaultConfigMissing,
            ConfigError::FileLoad { .. } => ErrorCode::FileLoad,
            ConfigError::InvalidDocument { .. } => ErrorCode::InvalidDocument,
            ConfigError::Settings { .. } => ErrorCode::Settings,
        }
    }

    /// True for errors that mean "no value here", as opposed to a broken
    /// store or an invalid value.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            ConfigError::DynamicConfigMissingKey { .. }
                | ConfigError::MissingConfigPlaceholder { .. }
                | ConfigError::MissingEnvironmentVariable { .. }
                | ConfigError::MissingProcessVariable { .. }
        )
    }

    // Convenience constructors

    pub fn missing_key(path: &str) -> Self {
        ConfigError::DynamicConfigMissingKey {
            path: path.to_string(),
        }
    }

    pub fn unavailable(name: &str) -> Self {
        ConfigError::ResolverUnavailable {
            name: name.to_string(),
        }
    }

    pub fn not_configured(store: &str) -> Self {
        ConfigError::NotConfigured {
            store: store.to_string(),
        }
    }

    pub fn store_failed(store: &str, err: impl std::fmt::Display) -> Self {
        ConfigError::StoreFailed {
            store: store.to_string(),
            message: err.to_string(),
        }
    }

    pub fn rejected(err: impl std::fmt::Display) -> Self {
        ConfigError::Rejected {
            message: err.to_string(),
        }
    }

    pub fn file_load(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        ConfigError::FileLoad {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::DynamicConfigMissingKey).unwrap();
        assert_eq!(json, "\"DYNAMIC_CONFIG_MISSING_KEY\"");
        assert_eq!(
            ErrorCode::DynamicConfigMissingKey.as_str(),
            "DYNAMIC_CONFIG_MISSING_KEY"
        );
    }

    #[test]
    fn invalid_object_lists_every_violation() {
        let err = ConfigError::DynamicConfigInvalidObject {
            path: "server".into(),
            errors: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "value at 'server' is invalid: a; b");
        assert_eq!(err.code(), ErrorCode::DynamicConfigInvalidObject);
    }

    #[test]
    fn absence_errors_are_classified() {
        assert!(ConfigError::missing_key("a").is_absent());
        assert!(!ConfigError::not_configured("vault").is_absent());
        assert!(!ConfigError::store_failed("consul", "boom").is_absent());
    }
}
