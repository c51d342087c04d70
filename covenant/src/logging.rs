//! Log output for tests and tools using covenant.
//!
//! The library only emits `tracing` events. Call [`init`] to print them.

use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_ENV: &str = "COVENANT_LOG";

#[derive(Debug, Clone)]
pub struct LogConfig {
    level: String,
    json: bool,
    test_writer: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            test_writer: true,
        }
    }
}

impl LogConfig {
    /// Used when neither `COVENANT_LOG` nor `RUST_LOG` is set.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Write through the test harness so output is captured per test. On
    /// by default.
    #[must_use]
    pub fn with_test_writer(mut self, value: bool) -> Self {
        self.test_writer = value;
        self
    }

    fn filter(&self) -> EnvFilter {
        env::var(LOG_ENV)
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(&self.level))
    }
}

/// Install the global subscriber. Returns false if one was already
/// installed, which is expected when many tests call this.
pub fn init(config: &LogConfig) -> bool {
    let registry = tracing_subscriber::registry().with(config.filter());
    let result = match (config.json, config.test_writer) {
        (true, true) => registry
            .with(tracing_subscriber::fmt::layer().json().with_test_writer())
            .try_init(),
        (true, false) => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        (false, true) => registry
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init(),
        (false, false) => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_is_harmless() {
        let config = LogConfig::default().with_level("debug");
        init(&config);
        assert!(!init(&config));
    }
}
