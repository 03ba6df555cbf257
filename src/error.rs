use thiserror::Error as ThisError;

use crate::frame::{self, Frame};

/// Everything that can make a store operation fail. Absent data is never an error, callers get
/// the empty value of the shape they asked for instead.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error; {0}")]
    Protocol(#[from] frame::Error),
    #[error("protocol error; frame size exceeds limit of {0} bytes")]
    FrameTooLarge(usize),
    /// Error reply sent by the store, e.g. `WRONGTYPE ...`.
    #[error("{0}")]
    Server(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("connection closed")]
    Closed,
    #[error("protocol error; unexpected reply, expected {expected}, got {actual}")]
    UnexpectedReply {
        expected: &'static str,
        actual: Frame,
    },
}

impl Error {
    /// Whether the failure came from the store rejecting the command rather than from the
    /// transport itself.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Server(_))
    }
}
