//! Layered configuration resolution.
//!
//! Local files are merged with remote and secret stores into one tree, and
//! `{"_source", "_key"}` placeholders anywhere in that tree are resolved on
//! demand through pluggable resolvers.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod logging;
pub mod resolvers;

pub use engine::{DynamicConfig, DynamicConfigBuilder};
pub use error::{ConfigError, ErrorCode, Result};
