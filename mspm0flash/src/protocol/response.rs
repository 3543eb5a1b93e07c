//! Response classification: link acknowledgements and core status codes.
//!
//! The interpreter only classifies. It never retries or recovers; that
//! decision belongs to the caller.

use std::fmt;

use thiserror::Error;

use crate::error::{Error, Result};

/// Link acknowledgement byte for an accepted frame.
pub const ACK: u8 = 0x00;

/// Link-level rejection reported in place of the acknowledgement byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum NackCode {
    /// Header byte was not 0x80 (0x51).
    #[error("incorrect packet header")]
    HeaderIncorrect,
    /// CRC32 of the packet did not match (0x52).
    #[error("packet checksum incorrect")]
    ChecksumIncorrect,
    /// Declared packet size was zero (0x53).
    #[error("packet size is zero")]
    PacketSizeZero,
    /// Declared packet size exceeds the bootloader buffer (0x54).
    #[error("packet size too big")]
    PacketSizeTooBig,
    /// Bootloader reported an unspecified error (0x55).
    #[error("unknown bootloader error")]
    UnknownError,
    /// Requested baud rate code is not supported (0x56).
    #[error("unknown baud rate")]
    UnknownBaudRate,
    /// Byte value not defined by the protocol.
    #[error("unrecognized acknowledgement {0:#04x}")]
    Unrecognized(u8),
}

impl NackCode {
    /// Raw acknowledgement byte.
    pub fn code(self) -> u8 {
        match self {
            Self::HeaderIncorrect => 0x51,
            Self::ChecksumIncorrect => 0x52,
            Self::PacketSizeZero => 0x53,
            Self::PacketSizeTooBig => 0x54,
            Self::UnknownError => 0x55,
            Self::UnknownBaudRate => 0x56,
            Self::Unrecognized(code) => code,
        }
    }
}

impl From<u8> for NackCode {
    fn from(value: u8) -> Self {
        match value {
            0x51 => Self::HeaderIncorrect,
            0x52 => Self::ChecksumIncorrect,
            0x53 => Self::PacketSizeZero,
            0x54 => Self::PacketSizeTooBig,
            0x55 => Self::UnknownError,
            0x56 => Self::UnknownBaudRate,
            other => Self::Unrecognized(other),
        }
    }
}

/// Status code carried by a core "message" response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CoreStatus {
    /// Operation successful (0x00).
    #[error("operation successful")]
    Success,
    /// Command requires an unlocked bootloader (0x01).
    #[error("bootloader is locked")]
    Locked,
    /// Wrong unlock password (0x02).
    #[error("incorrect unlock password")]
    PasswordError,
    /// Repeated wrong unlock passwords (0x03).
    #[error("multiple incorrect unlock passwords")]
    MultiplePasswordError,
    /// Command id not known to the core (0x04).
    #[error("unknown command")]
    UnknownCommand,
    /// Address range outside valid memory (0x05).
    #[error("invalid memory range")]
    InvalidMemoryRange,
    /// Command malformed for the core (0x06).
    #[error("invalid command")]
    InvalidCommand,
    /// Factory reset disabled in the BCR configuration (0x07).
    #[error("factory reset is disabled in the BCR configuration")]
    FactoryResetDisabled,
    /// Wrong or missing factory reset password (0x08).
    #[error("incorrect factory reset password")]
    FactoryResetPasswordError,
    /// Read-out disabled in the BCR configuration (0x09).
    #[error("read out is disabled in the BCR configuration")]
    ReadOutDisabled,
    /// Start address or length not 8-byte aligned (0x0A).
    #[error("start address or data length is not 8-byte aligned")]
    InvalidAddress,
    /// Data size below the 1 KiB minimum (0x0B).
    #[error("data size is less than 1 KiB")]
    InvalidLength,
    /// Status value not defined by the protocol.
    #[error("unrecognized status {0:#04x}")]
    Unrecognized(u8),
}

impl CoreStatus {
    /// Raw status byte.
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::Locked => 0x01,
            Self::PasswordError => 0x02,
            Self::MultiplePasswordError => 0x03,
            Self::UnknownCommand => 0x04,
            Self::InvalidMemoryRange => 0x05,
            Self::InvalidCommand => 0x06,
            Self::FactoryResetDisabled => 0x07,
            Self::FactoryResetPasswordError => 0x08,
            Self::ReadOutDisabled => 0x09,
            Self::InvalidAddress => 0x0a,
            Self::InvalidLength => 0x0b,
            Self::Unrecognized(code) => code,
        }
    }

    /// Whether this status reports success.
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Turn a failure status into an error.
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::Core(self))
        }
    }
}

impl From<u8> for CoreStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Success,
            0x01 => Self::Locked,
            0x02 => Self::PasswordError,
            0x03 => Self::MultiplePasswordError,
            0x04 => Self::UnknownCommand,
            0x05 => Self::InvalidMemoryRange,
            0x06 => Self::InvalidCommand,
            0x07 => Self::FactoryResetDisabled,
            0x08 => Self::FactoryResetPasswordError,
            0x09 => Self::ReadOutDisabled,
            0x0a => Self::InvalidAddress,
            0x0b => Self::InvalidLength,
            other => Self::Unrecognized(other),
        }
    }
}

/// Core response type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// Memory read-back data (0x30).
    MemoryReadBack,
    /// Device information block (0x31).
    DeviceInfo,
    /// Standalone verification CRC (0x32).
    StandaloneVerification,
    /// Detailed error report (0x3A).
    DetailedError,
    /// Generic message with a status byte (0x3B).
    Message,
    /// Type byte not defined by the protocol.
    Unknown(u8),
}

impl ResponseKind {
    /// Raw response type byte.
    pub fn code(self) -> u8 {
        match self {
            Self::MemoryReadBack => 0x30,
            Self::DeviceInfo => 0x31,
            Self::StandaloneVerification => 0x32,
            Self::DetailedError => 0x3a,
            Self::Message => 0x3b,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u8> for ResponseKind {
    fn from(value: u8) -> Self {
        match value {
            0x30 => Self::MemoryReadBack,
            0x31 => Self::DeviceInfo,
            0x32 => Self::StandaloneVerification,
            0x3a => Self::DetailedError,
            0x3b => Self::Message,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemoryReadBack => write!(f, "memory read back (0x30)"),
            Self::DeviceInfo => write!(f, "device info (0x31)"),
            Self::StandaloneVerification => write!(f, "standalone verification (0x32)"),
            Self::DetailedError => write!(f, "detailed error (0x3a)"),
            Self::Message => write!(f, "message (0x3b)"),
            Self::Unknown(code) => write!(f, "unknown ({code:#04x})"),
        }
    }
}

/// Classify the link acknowledgement byte.
pub fn check_ack(ack: u8) -> Result<()> {
    if ack == ACK {
        Ok(())
    } else {
        Err(Error::Nack(NackCode::from(ack)))
    }
}
