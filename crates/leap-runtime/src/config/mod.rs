//! Runtime configuration
//!
//! Library defaults with environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env()` only)
//! 3. Library defaults (`defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use leap_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .num_workers(2)
//!     .stall_warn_threshold(10_000);
//! ```

pub mod defaults;

use leap_core::constants::MAX_WORKERS;
use leap_core::env::{env_get, env_get_bool, env_get_ms};
use leap_core::{kprintln, LeapError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of worker threads
    pub num_workers: usize,
    /// Queue depth for channels wired during elaboration
    pub queue_depth: usize,
    /// Max rule steps per slice before a module yields to others
    pub fairness_quantum: u32,
    /// Warn after this many consecutive stalls (0 = off)
    pub stall_warn_threshold: u64,
    /// Terminate a module after this many consecutive stalls (0 = off)
    pub stall_fatal_threshold: u64,
    /// Interval of the `execute()` completion poll
    pub poll_interval: Duration,
    /// Spins before parking an idle worker
    pub idle_spins: u32,
    /// Worker park timeout
    pub park_timeout: Duration,
    /// Verbose lifecycle logging
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `LEAP_NUM_WORKERS`
    /// - `LEAP_QUEUE_DEPTH`
    /// - `LEAP_FAIRNESS_QUANTUM`
    /// - `LEAP_STALL_WARN`
    /// - `LEAP_STALL_FATAL`
    /// - `LEAP_POLL_INTERVAL_MS`
    /// - `LEAP_IDLE_SPINS`
    /// - `LEAP_PARK_TIMEOUT_MS`
    /// - `LEAP_DEBUG` (0/1)
    pub fn from_env() -> Self {
        Self {
            num_workers: env_get("LEAP_NUM_WORKERS", defaults::NUM_WORKERS),
            queue_depth: env_get("LEAP_QUEUE_DEPTH", defaults::QUEUE_DEPTH),
            fairness_quantum: env_get("LEAP_FAIRNESS_QUANTUM", defaults::FAIRNESS_QUANTUM),
            stall_warn_threshold: env_get("LEAP_STALL_WARN", defaults::STALL_WARN),
            stall_fatal_threshold: env_get("LEAP_STALL_FATAL", defaults::STALL_FATAL),
            poll_interval: env_get_ms("LEAP_POLL_INTERVAL_MS", defaults::POLL_INTERVAL_MS),
            idle_spins: env_get("LEAP_IDLE_SPINS", defaults::IDLE_SPINS),
            park_timeout: env_get_ms("LEAP_PARK_TIMEOUT_MS", defaults::PARK_TIMEOUT_MS),
            debug: env_get_bool("LEAP_DEBUG", defaults::DEBUG),
        }
    }

    /// Library defaults only, no environment lookups.
    /// Useful for tests.
    pub fn new() -> Self {
        Self {
            num_workers: defaults::NUM_WORKERS,
            queue_depth: defaults::QUEUE_DEPTH,
            fairness_quantum: defaults::FAIRNESS_QUANTUM,
            stall_warn_threshold: defaults::STALL_WARN,
            stall_fatal_threshold: defaults::STALL_FATAL,
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            idle_spins: defaults::IDLE_SPINS,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            debug: defaults::DEBUG,
        }
    }

    // Builder methods

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn fairness_quantum(mut self, steps: u32) -> Self {
        self.fairness_quantum = steps;
        self
    }

    pub fn stall_warn_threshold(mut self, stalls: u64) -> Self {
        self.stall_warn_threshold = stalls;
        self
    }

    pub fn stall_fatal_threshold(mut self, stalls: u64) -> Self {
        self.stall_fatal_threshold = stalls;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    pub fn idle_spins(mut self, spins: u32) -> Self {
        self.idle_spins = spins;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn debug(mut self, enable: bool) -> Self {
        self.debug = enable;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue("num_workers must be > 0"));
        }
        if self.num_workers > MAX_WORKERS {
            return Err(ConfigError::InvalidValue("num_workers exceeds MAX_WORKERS"));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::InvalidValue("queue_depth must be > 0"));
        }
        if self.fairness_quantum == 0 {
            return Err(ConfigError::InvalidValue("fairness_quantum must be > 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue("poll_interval must be > 0"));
        }
        if self.stall_fatal_threshold != 0
            && self.stall_warn_threshold != 0
            && self.stall_fatal_threshold < self.stall_warn_threshold
        {
            return Err(ConfigError::InvalidValue(
                "stall_fatal_threshold must be >= stall_warn_threshold",
            ));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        kprintln!("LEAP runtime configuration:");
        kprintln!("  num_workers:            {}", self.num_workers);
        kprintln!("  queue_depth:            {}", self.queue_depth);
        kprintln!("  fairness_quantum:       {}", self.fairness_quantum);
        kprintln!("  stall_warn_threshold:   {}", self.stall_warn_threshold);
        kprintln!("  stall_fatal_threshold:  {}", self.stall_fatal_threshold);
        kprintln!("  poll_interval:          {:?}", self.poll_interval);
        kprintln!("  idle_spins:             {}", self.idle_spins);
        kprintln!("  park_timeout:           {:?}", self.park_timeout);
        kprintln!("  debug:                  {}", self.debug);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for LeapError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => LeapError::InvalidConfig(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RuntimeConfig::new();
        assert_eq!(config.queue_depth, leap_core::constants::LINC_QUEUE_DEPTH);
        assert_eq!(config.stall_fatal_threshold, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::new()
            .num_workers(2)
            .fairness_quantum(8)
            .poll_interval(Duration::from_millis(5));

        assert_eq!(config.num_workers, 2);
        assert_eq!(config.fairness_quantum, 8);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
    }

    #[test]
    fn test_validation() {
        assert!(RuntimeConfig::new().num_workers(0).validate().is_err());
        assert!(RuntimeConfig::new().num_workers(1000).validate().is_err());
        assert!(RuntimeConfig::new().queue_depth(0).validate().is_err());

        let bad = RuntimeConfig::new().stall_warn_threshold(100).stall_fatal_threshold(10);
        assert_eq!(
            bad.validate(),
            Err(ConfigError::InvalidValue(
                "stall_fatal_threshold must be >= stall_warn_threshold"
            ))
        );
        let err: LeapError = bad.validate().unwrap_err().into();
        assert!(matches!(err, LeapError::InvalidConfig(_)));
    }
}
