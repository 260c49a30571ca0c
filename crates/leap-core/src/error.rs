//! Error types for the LEAP runtime

use core::fmt;

/// Result type for runtime operations
pub type LeapResult<T> = Result<T, LeapError>;

/// Errors that can occur while wiring or running a system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeapError {
    /// A named half-channel was registered twice on the same side
    DuplicateChannel { name: String, side: ChannelSide },

    /// A SEND and RECV with the same name carry different payload types
    TypeMismatch {
        name: String,
        send_type: &'static str,
        recv_type: &'static str,
    },

    /// Lifecycle call made out of order (e.g. `execute` before `route`)
    InvalidPhase {
        expected: &'static str,
        actual: &'static str,
    },

    /// Rule registration after the scheduler was spawned
    AlreadySpawned(String),

    /// Invalid configuration value
    InvalidConfig(&'static str),

    /// A string UID that the string table does not know
    UnknownString(u32),

    /// Worker thread could not be spawned
    WorkerSpawn(String),

    /// Error raised by a transport layer (RRR, channel I/O)
    Transport(String),

    /// OS call failed (signal installation and the like)
    Os(String),
}

/// Which half of a channel an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSide {
    Send,
    Recv,
}

impl fmt::Display for ChannelSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelSide::Send => write!(f, "SEND"),
            ChannelSide::Recv => write!(f, "RECV"),
        }
    }
}

impl fmt::Display for LeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeapError::DuplicateChannel { name, side } => {
                write!(f, "duplicate {} channel '{}'", side, name)
            }
            LeapError::TypeMismatch { name, send_type, recv_type } => write!(
                f,
                "channel '{}' type mismatch: SEND carries {}, RECV carries {}",
                name, send_type, recv_type
            ),
            LeapError::InvalidPhase { expected, actual } => {
                write!(f, "invalid phase: expected {}, context is {}", expected, actual)
            }
            LeapError::AlreadySpawned(name) => {
                write!(f, "scheduler '{}' already spawned", name)
            }
            LeapError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            LeapError::UnknownString(uid) => write!(f, "unknown string uid {}", uid),
            LeapError::WorkerSpawn(msg) => write!(f, "worker spawn failed: {}", msg),
            LeapError::Transport(msg) => write!(f, "transport error: {}", msg),
            LeapError::Os(msg) => write!(f, "os error: {}", msg),
        }
    }
}

impl std::error::Error for LeapError {}

/// Error returned when pushing into a full (or credit-starved) channel.
/// Carries the rejected value back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryPushError<T>(pub T);

impl<T> TryPushError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel full")
    }
}
