//! Layered configuration for Daedalus.
//!
//! Configuration is applied in layers, later layers overriding earlier
//! ones: built-in defaults, an optional TOML file, then command-line
//! flags of the form `--section.key=value`. The loaded tree is reachable
//! process-wide through [`global`] with explicit read and reset.

mod config;
mod error;
pub mod global;
mod loader;

pub use config::{AppConfig, LimitsConfig, ProblemsConfig, RuntimeConfig, ServerConfig};
pub use error::ConfigError;
pub use loader::ConfigLoader;
