//! Boundary with whatever moves reports to and from the token.
//!
//! A transport is synchronous and blocking: one request report in, one
//! response report out. It never retries on its own. Timeouts are the
//! transport's business and surface as [`TransportError::Timeout`].

use std::time::Duration;

use thiserror::Error;

use crate::codec::Report;
use crate::error::StatusCode;

/// Failures below the command layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device disconnected")]
    Disconnected,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),

    /// Response report CRC does not match its contents.
    #[error("response CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },

    /// Response answers a different request than the one just sent.
    #[error("response echoes request CRC {actual:#010x}, sent {expected:#010x}")]
    StaleResponse { expected: u32, actual: u32 },

    #[error("response is for command {actual:#04x}, sent {expected:#04x}")]
    CommandMismatch { expected: u8, actual: u8 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Disconnected | Self::Timeout(_) | Self::Io(_) => StatusCode::Disconnected,
            Self::Malformed(_)
            | Self::CrcMismatch { .. }
            | Self::StaleResponse { .. }
            | Self::CommandMismatch { .. } => StatusCode::UnknownError,
        }
    }
}

/// Sends one fixed-size request report and returns the response report.
pub trait Transport {
    /// Perform one round trip.
    ///
    /// # Errors
    ///
    /// Any [`TransportError`]; the in-flight command is lost.
    fn send(&mut self, request: &Report) -> Result<Report, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, request: &Report) -> Result<Report, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, request: &Report) -> Result<Report, TransportError> {
        (**self).send(request)
    }
}
