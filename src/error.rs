use thiserror::Error;

use crate::api::RoomCode;

#[derive(Error, Debug, PartialEq)]
pub enum RaceError {
    #[error("couldn't fetch price for {symbol}: {reason}")]
    QuoteFetch { symbol: String, reason: String },
    #[error("race in room {room} aborted after {failures} consecutive quote failures")]
    TooManyQuoteFailures { room: RoomCode, failures: u32 },
    #[error("room {0} doesn't exist")]
    RoomNotFound(RoomCode),
    #[error("{0}")]
    Validation(String),
    #[error("race in room {0} has already started")]
    RaceAlreadyStarted(RoomCode),
    #[error("only the host can do this in room {0}")]
    NotHost(RoomCode),
    #[error("race is {actual} but needs to be {expected}")]
    InvalidState { expected: String, actual: String },
}

impl RaceError {
    /// Transient errors leave the race untouched and are retried on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QuoteFetch { .. })
    }
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
