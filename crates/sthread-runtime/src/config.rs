//! Engine configuration

use sthread_core::constants::{
    DEFAULT_MAX_BALANCER_TRIES, DEFAULT_MAX_THREADS, DEFAULT_MAX_WAITS,
};
use sthread_core::env::{env_get, env_get_bool};

/// Configuration for the phase engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum script threads per connection (entry + user threads)
    pub max_threads: usize,

    /// Maximum pending suspension-registry entries per connection
    pub max_waits: usize,

    /// Upper bound on the retry budget a balancer script may request
    pub max_balancer_tries: u32,

    /// Run the preread script at the end of the preread chain instead
    /// of its configured slot (applied at most once per connection)
    pub preread_postponed: bool,

    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_threads: DEFAULT_MAX_THREADS,
            max_waits: DEFAULT_MAX_WAITS,
            max_balancer_tries: DEFAULT_MAX_BALANCER_TRIES,
            preread_postponed: false,
            debug_logging: false,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from `STH_*` environment variables
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_threads: env_get("STH_MAX_THREADS", defaults.max_threads),
            max_waits: env_get("STH_MAX_WAITS", defaults.max_waits),
            max_balancer_tries: env_get("STH_MAX_BALANCER_TRIES", defaults.max_balancer_tries),
            preread_postponed: env_get_bool("STH_PREREAD_POSTPONED", defaults.preread_postponed),
            debug_logging: env_get_bool("STH_DEBUG", defaults.debug_logging),
        }
    }

    /// Set maximum script threads per connection
    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = n;
        self
    }

    /// Set maximum pending waits per connection
    pub fn max_waits(mut self, n: usize) -> Self {
        self.max_waits = n;
        self
    }

    /// Set the balancer retry budget cap
    pub fn max_balancer_tries(mut self, n: u32) -> Self {
        self.max_balancer_tries = n;
        self
    }

    /// Defer the preread script to the end of the preread chain
    pub fn preread_postponed(mut self, postpone: bool) -> Self {
        self.preread_postponed = postpone;
        self
    }

    /// Enable debug logging
    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_threads == 0 {
            return Err("max_threads must be at least 1");
        }
        if self.max_waits == 0 {
            return Err("max_waits must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .max_threads(8)
            .max_waits(16)
            .max_balancer_tries(2)
            .preread_postponed(true)
            .debug_logging(true);
        assert_eq!(config.max_threads, 8);
        assert_eq!(config.max_waits, 16);
        assert_eq!(config.max_balancer_tries, 2);
        assert!(config.preread_postponed);
        assert!(config.debug_logging);
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(EngineConfig::new().max_threads(0).validate().is_err());
        assert!(EngineConfig::new().max_waits(0).validate().is_err());
    }
}
