//! Configuration errors.

use thiserror::Error;

/// Errors raised while loading or overlaying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {reason}")]
    FileRead {
        /// The offending path.
        path: String,
        /// The I/O error text.
        reason: String,
    },

    /// The configuration file did not parse.
    #[error("failed to parse config file '{path}': {reason}")]
    FileParse {
        /// The offending path.
        path: String,
        /// The parse error text.
        reason: String,
    },

    /// A command-line flag did not have the `--section.key=value` shape.
    #[error("malformed flag '{0}': expected --section.key=value")]
    MalformedFlag(String),

    /// An override named a key that does not exist.
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    /// An override value did not parse for its key.
    #[error("invalid value {value:?} for configuration key '{key}'")]
    InvalidValue {
        /// The key being set.
        key: String,
        /// The rejected value.
        value: String,
    },
}
