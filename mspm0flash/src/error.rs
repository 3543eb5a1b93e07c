//! Error types for mspm0flash.
//!
//! Failures are split into three families that are never folded into each
//! other:
//!
//! - [`TransportError`]: the local exchange failed (timeout, short read,
//!   device could not be opened, bus transaction rejected by the driver).
//! - [`NackCode`]: the bootloader rejected the outer frame before running
//!   the command.
//! - [`CoreStatus`]: the command ran and the bootloader core reported a
//!   semantic failure.

use std::io;
use thiserror::Error;

use crate::protocol::response::{CoreStatus, NackCode, ResponseKind};

/// Result type for mspm0flash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Local I/O failure while exchanging bytes with the target.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The target stopped sending before the full response arrived.
    #[error("Timeout waiting for response ({received}/{expected} bytes received)")]
    Timeout {
        /// Number of bytes the exchange expected.
        expected: usize,
        /// Number of bytes received before the deadline passed.
        received: usize,
    },

    /// A read reported readiness but returned no data.
    #[error("Short read: {received}/{expected} bytes received")]
    ShortRead {
        /// Number of bytes the exchange expected.
        expected: usize,
        /// Number of bytes received before the read came back empty.
        received: usize,
    },

    /// The request could not be written completely.
    #[error("Short write: {written}/{expected} bytes written")]
    ShortWrite {
        /// Length of the request frame.
        expected: usize,
        /// Bytes accepted by the driver.
        written: usize,
    },

    /// The interface device could not be opened.
    #[error("Cannot open device {path}: {source}")]
    Open {
        /// Device path.
        path: String,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// The underlying driver call failed.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether the target never answered (as opposed to answering partially).
    pub fn is_no_response(&self) -> bool {
        matches!(self, Self::Timeout { received: 0, .. })
    }
}

/// Error type for mspm0flash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The byte exchange with the target failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The bootloader rejected the frame (link-level acknowledgement).
    #[error("Bootloader rejected packet: {0}")]
    Nack(NackCode),

    /// The bootloader core reported a failure status.
    #[error("Bootloader error: {0}")]
    Core(CoreStatus),

    /// The bootloader answered with a detailed error response.
    #[error("Bootloader detailed error: {}", hex::encode(.0))]
    DetailedError(Vec<u8>),

    /// The response frame is malformed.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The response type does not belong to the command that was sent.
    #[error("Unexpected response type {actual:#04x}, expected {expected}")]
    UnexpectedResponse {
        /// Response type the command produces.
        expected: ResponseKind,
        /// Raw response type byte received.
        actual: u8,
    },

    /// A command argument does not fit the protocol limits.
    #[error("Payload too large for {command}: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Command name.
        command: &'static str,
        /// Offending length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// The device-side CRC of the flashed region differs from the image.
    #[error("Verification failed: device CRC {actual:#010x}, expected {expected:#010x}")]
    VerifyMismatch {
        /// CRC32 of the local image region.
        expected: u32,
        /// CRC32 reported by the device.
        actual: u32,
    },

    /// Invalid firmware image.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Operation not supported by this transport.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The embedding application requested to stop.
    #[error("Operation interrupted")]
    Interrupted,

    /// I/O error (file operations, port configuration).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<NackCode> for Error {
    fn from(code: NackCode) -> Self {
        Self::Nack(code)
    }
}

impl From<CoreStatus> for Error {
    fn from(status: CoreStatus) -> Self {
        Self::Core(status)
    }
}

impl Error {
    /// Whether this error came from the local exchange rather than the device.
    ///
    /// Only these are worth retrying: a device rejection repeats identically.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether the device itself refused the request (link or core level).
    pub fn is_device_rejection(&self) -> bool {
        matches!(
            self,
            Self::Nack(_) | Self::Core(_) | Self::DetailedError(_) | Self::VerifyMismatch { .. }
        )
    }
}
