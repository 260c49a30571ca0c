//! Channel I/O error types

use core::fmt;
use leap_core::LeapError;
use leap_rrr::RrrError;

pub type ChanioResult<T> = Result<T, ChanioError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChanioError {
    /// Transport failure underneath
    Rrr(RrrError),

    /// A message named a channel id nobody registered
    UnknownChannel { direction: &'static str, id: u16 },

    /// Channel name registered twice in the same direction
    DuplicateName(String),

    /// Message needs more chunks than the channel's whole credit budget
    TooLarge { chunks: u32, credits: u32 },

    /// The peer sent more than its credits allowed
    Overflow(String),

    /// The channel I/O layer was closed while waiting for credit
    Closed,

    /// Delivered on a channel id this layer does not handle
    UnexpectedChannel(u8),

    InvalidConfig(&'static str),
}

impl fmt::Display for ChanioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChanioError::Rrr(e) => write!(f, "{}", e),
            ChanioError::UnknownChannel { direction, id } => {
                write!(f, "no {} channel with id {}", direction, id)
            }
            ChanioError::DuplicateName(name) => write!(f, "channel '{}' registered twice", name),
            ChanioError::TooLarge { chunks, credits } => write!(
                f,
                "message of {} chunks exceeds the {} credit budget",
                chunks, credits
            ),
            ChanioError::Overflow(name) => write!(f, "channel '{}' received past its credits", name),
            ChanioError::Closed => write!(f, "channel I/O closed"),
            ChanioError::UnexpectedChannel(id) => write!(f, "unexpected channel id {}", id),
            ChanioError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ChanioError {}

impl From<RrrError> for ChanioError {
    fn from(e: RrrError) -> Self {
        ChanioError::Rrr(e)
    }
}

impl From<ChanioError> for RrrError {
    fn from(e: ChanioError) -> Self {
        match e {
            ChanioError::Rrr(inner) => inner,
            other => RrrError::Service(other.to_string()),
        }
    }
}

impl From<ChanioError> for LeapError {
    fn from(e: ChanioError) -> Self {
        match e {
            ChanioError::InvalidConfig(msg) => LeapError::InvalidConfig(msg),
            other => LeapError::Transport(other.to_string()),
        }
    }
}
