//! Environment variable utilities
//!
//! Generic `env_get<T>` for parsing environment variables with defaults.
//! Engine knobs use the `STH_` prefix.
//!
//! # Usage
//!
//! ```ignore
//! use sthread_core::env::{env_get, env_get_bool};
//!
//! let max_threads: usize = env_get("STH_MAX_THREADS", 128);
//! let debug: bool = env_get_bool("STH_DEBUG", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Works with any type that implements `FromStr`. Parse failures fall
/// back to the default.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts: "1", "true", "yes", "on" (case-insensitive) as true.
/// Everything else (including unset) returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get environment variable as optional value
///
/// Returns `Some(T)` if the variable is set and parses successfully,
/// `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Get environment variable as string, or return default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Check if environment variable is set (regardless of value)
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__STH_TEST_UNSET__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_bool_default() {
        assert!(env_get_bool("__STH_TEST_UNSET__", true));
        assert!(!env_get_bool("__STH_TEST_UNSET__", false));
    }

    #[test]
    fn test_env_get_opt_none() {
        let val: Option<usize> = env_get_opt("__STH_TEST_UNSET__");
        assert!(val.is_none());
    }

    #[test]
    fn test_env_get_str_default() {
        assert_eq!(env_get_str("__STH_TEST_UNSET__", "hello"), "hello");
    }

    #[test]
    fn test_env_is_set() {
        assert!(!env_is_set("__STH_TEST_UNSET__"));
        assert!(env_is_set("PATH"));
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__STH_TEST_NUM__", "123");
        let val: usize = env_get("__STH_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__STH_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__STH_TEST_BAD__", "not_a_number");
        let val: usize = env_get("__STH_TEST_BAD__", 99);
        assert_eq!(val, 99); // Default on parse failure
        std::env::remove_var("__STH_TEST_BAD__");
    }
}
