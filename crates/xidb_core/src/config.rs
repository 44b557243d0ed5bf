//! Store and log configuration.

use std::time::Duration;

/// Configuration for a [`RecordStore`](crate::RecordStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Deadline applied to every operation whose caller did not set one.
    /// `Duration::ZERO` disables it.
    pub default_timeout: Duration,

    /// Whether `create` honors idempotency keys.
    ///
    /// When false, a supplied key is ignored and every create inserts.
    pub enable_idempotency: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            enable_idempotency: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default per-operation timeout.
    #[must_use]
    pub const fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets whether idempotency keys are honored.
    #[must_use]
    pub const fn enable_idempotency(mut self, value: bool) -> Self {
        self.enable_idempotency = value;
        self
    }
}

/// Configuration for opening a [`LogBackend`](crate::log::LogBackend)
/// directory.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the log after every mutation (safer but slower).
    pub sync_on_write: bool,

    /// Whether to rewrite the log down to its live rows when opening.
    pub compact_on_open: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            compact_on_open: false,
        }
    }
}

impl LogConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync after every mutation.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether to compact when opening.
    #[must_use]
    pub const fn compact_on_open(mut self, value: bool) -> Self {
        self.compact_on_open = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_store_config() {
        let config = StoreConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(10));
        assert!(config.enable_idempotency);
    }

    #[test]
    fn builder_pattern() {
        let store = StoreConfig::new()
            .default_timeout(Duration::ZERO)
            .enable_idempotency(false);
        assert_eq!(store.default_timeout, Duration::ZERO);
        assert!(!store.enable_idempotency);

        let log = LogConfig::new().sync_on_write(false).compact_on_open(true);
        assert!(log.create_if_missing);
        assert!(!log.sync_on_write);
        assert!(log.compact_on_open);
    }
}
