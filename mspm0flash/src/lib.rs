//! # mspm0flash
//!
//! A library for talking to the TI MSPM0 ROM bootloader (BSL).
//!
//! This crate provides the host side of the BSL protocol over either
//! interface the bootloader listens on:
//!
//! - Packet framing with the bootloader CRC32
//! - I2C (combined write/read transactions) and UART (polled reads) transports
//! - Acknowledgement and core status classification
//! - One method per BSL command
//! - Erase/program/verify workflows for raw binary images
//!
//! ## Features
//!
//! - `native` (default): serial ports via `serialport`, I2C via Linux i2c-dev
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use mspm0flash::{Bsl, transport::LinkTransport};
//! use mspm0flash::port::{NativePort, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!     let mut bsl = Bsl::new(LinkTransport::new(port)?);
//!
//!     bsl.connect()?;
//!     println!("{}", bsl.get_device_info()?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod bsl;
pub mod device;
pub mod error;
pub mod flasher;
pub mod image;
pub mod port;
pub mod protocol;
pub mod transport;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). It is consulted
/// between chunks, never during an exchange.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    bsl::Bsl,
    device::DeviceInfo,
    error::{Error, Result, TransportError},
    flasher::{FlashOptions, Flasher},
    image::{FirmwareImage, VerifyRegion},
    port::{FlowControl, Port, SerialConfig},
    protocol::{
        BaudRate, Command, CoreStatus, NackCode, Password, ResponseKind, crc::crc32,
    },
    transport::{BusTransport, I2cBus, LinkTransport, Transport, TransportKind},
};
