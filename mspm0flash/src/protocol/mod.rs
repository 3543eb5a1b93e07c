//! BSL protocol implementation.
//!
//! - [`crc`]: bootloader CRC32
//! - [`frame`]: request framing and core response decoding
//! - [`command`]: core commands and their arguments
//! - [`response`]: acknowledgement and status classification

pub mod command;
pub mod crc;
pub mod frame;
pub mod response;

// Re-export common types
pub use command::{BaudRate, Command, PROGRAM_DATA_MAX_LEN, Password};
pub use frame::CoreMessage;
pub use response::{CoreStatus, NackCode, ResponseKind};
