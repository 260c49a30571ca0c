//! Environment variable utilities
//!
//! Every tunable in the runtime (`LEAP_NUM_WORKERS`, `LEAP_QUEUE_DEPTH`,
//! `LEAP_CHANIO_CREDITS`, ...) is read through these helpers so that a bad
//! value silently falls back to the compiled-in default.
//!
//! ```ignore
//! use leap_core::env::{env_get, env_get_bool, env_get_ms};
//!
//! let workers: usize = env_get("LEAP_NUM_WORKERS", 4);
//! let debug = env_get_bool("LEAP_DEBUG", false);
//! let poll = env_get_ms("LEAP_POLL_INTERVAL_MS", 1);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as type T, or return default
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Accepts "1", "true", "yes", "on" (case-insensitive) as true; any other
/// value is false. Unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_bool(&val),
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses, `None` otherwise
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Millisecond duration, e.g. `LEAP_POLL_INTERVAL_MS=5`
#[inline]
pub fn env_get_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}

/// Microsecond duration, e.g. `LEAP_MONITOR_IDLE_US=50`
#[inline]
pub fn env_get_us(key: &str, default_us: u64) -> Duration {
    Duration::from_micros(env_get(key, default_us))
}

#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

fn parse_bool(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
