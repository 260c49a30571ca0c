//! Channel I/O configuration
//!
//! Both ends of a link must use the same credit budget: the receiver sizes
//! its inbound queues from it.

use crate::error::ChanioError;
use leap_core::env::env_get;
use leap_core::kprintln;

pub mod defaults {
    /// Chunk credits per directional channel
    pub const CREDITS: u32 = 64;
}

#[derive(Debug, Clone)]
pub struct ChanioConfig {
    /// Credits (in chunks) each outbound channel starts with
    pub credits: u32,
}

impl Default for ChanioConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ChanioConfig {
    /// Defaults with `LEAP_CHANIO_CREDITS` applied
    pub fn from_env() -> Self {
        Self { credits: env_get("LEAP_CHANIO_CREDITS", defaults::CREDITS) }
    }

    pub fn new() -> Self {
        Self { credits: defaults::CREDITS }
    }

    pub fn credits(mut self, n: u32) -> Self {
        self.credits = n;
        self
    }

    pub fn validate(&self) -> Result<(), ChanioError> {
        if self.credits == 0 {
            return Err(ChanioError::InvalidConfig("credits must be > 0"));
        }
        if self.credits > u16::MAX as u32 * 64 {
            return Err(ChanioError::InvalidConfig("credits unreasonably large"));
        }
        Ok(())
    }

    pub fn print(&self) {
        kprintln!("LEAP channel I/O configuration:");
        kprintln!("  credits:  {}", self.credits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(ChanioConfig::new().validate().is_ok());
        assert_eq!(
            ChanioConfig::new().credits(0).validate(),
            Err(ChanioError::InvalidConfig("credits must be > 0"))
        );
    }
}
