//! The layered loader.

use crate::config::AppConfig;
use crate::error::ConfigError;
use std::path::Path;

/// Loads configuration in layers: defaults, file, command-line overlay.
///
/// # Example
///
/// ```rust
/// use daedalus_config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .apply_args(["--server.port=9001", "--problems.verbose=true"])
///     .unwrap()
///     .load();
/// assert_eq!(config.server.port, 9001);
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: AppConfig,
}

impl ConfigLoader {
    /// Starts from the built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlays a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.config = toml::from_str(&text).map_err(|e| ConfigError::FileParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(self)
    }

    /// Overlays `--section.key=value` flags; unrecognised arguments are
    /// left for the caller.
    ///
    /// # Errors
    ///
    /// Fails on a malformed flag, unknown key, or unparsable value.
    pub fn apply_args<I, S>(mut self, args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            let arg = arg.as_ref();
            let Some(flag) = arg.strip_prefix("--") else {
                continue;
            };
            if flag == "help" {
                continue;
            }
            let Some((key, value)) = flag.split_once('=') else {
                return Err(ConfigError::MalformedFlag(arg.to_string()));
            };
            if !key.contains('.') {
                return Err(ConfigError::MalformedFlag(arg.to_string()));
            }
            self.config.apply(key, value)?;
        }
        Ok(self)
    }

    /// Returns the assembled configuration.
    #[must_use]
    pub fn load(self) -> AppConfig {
        self.config
    }

    /// Renders the flattened key list with documentation.
    #[must_use]
    pub fn help_text() -> String {
        let mut out = String::from("Configuration keys (override with --section.key=value):\n");
        for (key, doc) in AppConfig::key_docs() {
            out.push_str(&format!("  --{key:<24} {doc}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_layer() {
        let config = ConfigLoader::new().load();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_args_overlay() {
        let config = ConfigLoader::new()
            .apply_args(["--server.host=0.0.0.0", "--limits.max_files=3"])
            .unwrap()
            .load();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.limits.max_files, 3);
    }

    #[test]
    fn test_non_flag_args_are_skipped() {
        let config = ConfigLoader::new()
            .apply_args(["serve", "--server.port=9001"])
            .unwrap()
            .load();
        assert_eq!(config.server.port, 9001);
    }

    #[test]
    fn test_malformed_flag() {
        let err = ConfigLoader::new()
            .apply_args(["--server.port"])
            .unwrap_err();
        assert!(matches!(err, ConfigError::MalformedFlag(_)));
    }

    #[test]
    fn test_help_text_lists_every_key() {
        let help = ConfigLoader::help_text();
        for (key, _) in AppConfig::key_docs() {
            assert!(help.contains(key), "missing {key}");
        }
    }
}
