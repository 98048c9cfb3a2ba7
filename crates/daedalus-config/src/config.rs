//! The configuration tree.

use serde::{Deserialize, Serialize};

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The interface to bind.
    pub host: String,
    /// The port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Cooperative-runtime knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Size of the bounded pool for synchronous user code.
    pub sync_workers: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { sync_workers: 8 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum buffered request body, in bytes.
    pub max_body_size: usize,
    /// Maximum size of one uploaded file, in bytes.
    pub max_file_size: usize,
    /// Maximum number of uploaded files per form field.
    pub max_files: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 8 * 1024 * 1024,
            max_file_size: 10 * 1024 * 1024,
            max_files: 16,
        }
    }
}

/// Error-response rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ProblemsConfig {
    /// When `true`, unexpected errors carry their message in the detail
    /// instead of an opaque placeholder.
    pub verbose: bool,
}

/// The root configuration tree.
///
/// # Example
///
/// ```rust
/// use daedalus_config::AppConfig;
///
/// let config = AppConfig::default();
/// assert_eq!(config.server.port, 8000);
/// assert!(!config.problems.verbose);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Listener settings.
    pub server: ServerConfig,
    /// Runtime settings.
    pub runtime: RuntimeConfig,
    /// Request limits.
    pub limits: LimitsConfig,
    /// Problem rendering.
    pub problems: ProblemsConfig,
}

impl AppConfig {
    /// Applies one `section.key = value` override.
    ///
    /// # Errors
    ///
    /// Returns the unknown key or unparsable value.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), crate::ConfigError> {
        let invalid = |key: &str, value: &str| crate::ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "server.host" => self.server.host = value.to_string(),
            "server.port" => self.server.port = value.parse().map_err(|_| invalid(key, value))?,
            "runtime.sync_workers" => {
                self.runtime.sync_workers = value.parse().map_err(|_| invalid(key, value))?;
            }
            "limits.max_body_size" => {
                self.limits.max_body_size = value.parse().map_err(|_| invalid(key, value))?;
            }
            "limits.max_file_size" => {
                self.limits.max_file_size = value.parse().map_err(|_| invalid(key, value))?;
            }
            "limits.max_files" => {
                self.limits.max_files = value.parse().map_err(|_| invalid(key, value))?;
            }
            "problems.verbose" => {
                self.problems.verbose = value.parse().map_err(|_| invalid(key, value))?;
            }
            unknown => {
                return Err(crate::ConfigError::UnknownKey(unknown.to_string()));
            }
        }
        Ok(())
    }

    /// The flattened key list with documentation, for `--help` output.
    #[must_use]
    pub fn key_docs() -> &'static [(&'static str, &'static str)] {
        &[
            ("server.host", "Interface the server binds (default 127.0.0.1)"),
            ("server.port", "Port the server binds (default 8000)"),
            (
                "runtime.sync_workers",
                "Bound of the pool running synchronous user code (default 8)",
            ),
            (
                "limits.max_body_size",
                "Maximum buffered request body in bytes (default 8 MiB)",
            ),
            (
                "limits.max_file_size",
                "Maximum size of one uploaded file in bytes (default 10 MiB)",
            ),
            (
                "limits.max_files",
                "Maximum uploaded files per form field (default 16)",
            ),
            (
                "problems.verbose",
                "Render unexpected error messages in problem details (default false)",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.runtime.sync_workers, 8);
        assert_eq!(config.limits.max_files, 16);
    }

    #[test]
    fn test_apply_known_keys() {
        let mut config = AppConfig::default();
        config.apply("server.port", "9001").unwrap();
        config.apply("problems.verbose", "true").unwrap();
        assert_eq!(config.server.port, 9001);
        assert!(config.problems.verbose);
    }

    #[test]
    fn test_apply_unknown_key() {
        let mut config = AppConfig::default();
        let err = config.apply("server.workers", "4").unwrap_err();
        assert!(matches!(err, crate::ConfigError::UnknownKey(_)));
    }

    #[test]
    fn test_apply_invalid_value() {
        let mut config = AppConfig::default();
        let err = config.apply("server.port", "not-a-port").unwrap_err();
        assert!(matches!(err, crate::ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let rendered = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_every_documented_key_applies() {
        let mut config = AppConfig::default();
        for (key, _) in AppConfig::key_docs() {
            let value = match *key {
                "server.host" => "0.0.0.0",
                "problems.verbose" => "true",
                _ => "1",
            };
            config.apply(key, value).unwrap_or_else(|e| panic!("{key}: {e}"));
        }
    }
}
