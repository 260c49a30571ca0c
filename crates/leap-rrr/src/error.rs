//! RRR error types

use core::fmt;
use leap_core::LeapError;

pub type RrrResult<T> = Result<T, RrrError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RrrError {
    /// The physical channel or its peer went away
    Disconnected,

    /// A chunk sequence did not form a valid message
    Framing(String),

    /// No service registered under this id
    UnknownService(u16),

    /// Service exists but has no such method
    UnknownMethod { service: u16, method: u16 },

    /// Second registration of a service id
    DuplicateService(u16),

    /// Payload ended before a field could be read
    ShortPayload { needed: usize, remaining: usize },

    /// A client response arrived that no outstanding request expects
    UnexpectedResponse { service: u16, method: u16 },

    /// Handler-defined failure
    Service(String),

    /// Monitor thread could not be started or died
    Monitor(String),
}

impl fmt::Display for RrrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RrrError::Disconnected => write!(f, "physical channel disconnected"),
            RrrError::Framing(msg) => write!(f, "framing error: {}", msg),
            RrrError::UnknownService(id) => write!(f, "unknown service {}", id),
            RrrError::UnknownMethod { service, method } => {
                write!(f, "service {} has no method {}", service, method)
            }
            RrrError::DuplicateService(id) => write!(f, "service {} registered twice", id),
            RrrError::ShortPayload { needed, remaining } => write!(
                f,
                "payload too short: need {} bytes, {} remaining",
                needed, remaining
            ),
            RrrError::UnexpectedResponse { service, method } => write!(
                f,
                "unexpected response for service {} method {}",
                service, method
            ),
            RrrError::Service(msg) => write!(f, "service error: {}", msg),
            RrrError::Monitor(msg) => write!(f, "monitor: {}", msg),
        }
    }
}

impl std::error::Error for RrrError {}

impl From<RrrError> for LeapError {
    fn from(e: RrrError) -> Self {
        LeapError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_conversion() {
        let e = RrrError::UnknownMethod { service: 3, method: 9 };
        assert_eq!(e.to_string(), "service 3 has no method 9");
        let leap: LeapError = RrrError::Disconnected.into();
        assert_eq!(leap, LeapError::Transport("physical channel disconnected".into()));
    }
}
