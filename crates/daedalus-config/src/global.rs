//! The process-wide configuration singleton.
//!
//! Reads return the current snapshot as a cheap `Arc` clone; [`replace`]
//! installs a new tree and [`reset`] restores the defaults (used between
//! tests).

use crate::config::AppConfig;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

fn cell() -> &'static RwLock<Arc<AppConfig>> {
    static CELL: OnceLock<RwLock<Arc<AppConfig>>> = OnceLock::new();
    CELL.get_or_init(|| RwLock::new(Arc::new(AppConfig::default())))
}

/// Returns the current configuration snapshot.
#[must_use]
pub fn current() -> Arc<AppConfig> {
    Arc::clone(&cell().read())
}

/// Installs a new configuration tree.
pub fn replace(config: AppConfig) {
    *cell().write() = Arc::new(config);
}

/// Restores the built-in defaults.
pub fn reset() {
    replace(AppConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_replace_reset() {
        reset();
        assert_eq!(current().server.port, 8000);

        let mut config = AppConfig::default();
        config.server.port = 9100;
        replace(config);
        assert_eq!(current().server.port, 9100);

        reset();
        assert_eq!(current().server.port, 8000);
    }
}
