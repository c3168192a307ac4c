//! Central configuration for the authstep crate
//!
//! All tunables are read from the environment once, through `LazyLock`
//! statics. Invalid values log a warning and fall back to the default.

use std::{env, sync::LazyLock};

/// Lifetime of a newly created operation in seconds.
///
/// Default: 300
pub static OPERATION_TTL_SECS: LazyLock<i64> =
    LazyLock::new(|| parse_env_or("AUTHSTEP_OPERATION_TTL_SECS", 300));

/// Lifetime of a single resolution round in seconds, applied to the
/// response expiration on every UPDATE. Per-operation overrides loaded
/// into the step catalog take precedence.
///
/// Default: 300
pub static RESPONSE_TTL_SECS: LazyLock<i64> =
    LazyLock::new(|| parse_env_or("AUTHSTEP_RESPONSE_TTL_SECS", 300));

/// Maximum failed authentication attempts per method when the method
/// policy does not configure its own limit.
///
/// Default: 5
pub static DEFAULT_MAX_AUTH_FAILS: LazyLock<u32> =
    LazyLock::new(|| parse_env_or("AUTHSTEP_DEFAULT_MAX_AUTH_FAILS", 5));

fn parse_env_or<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v.parse::<T>().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {}. Using default {}", key, v, default);
            default
        }),
        Err(_) => default,
    }
}
