//! Byte exchange with the bootloader.
//!
//! Every command is one complete request/response exchange: the request
//! frame is written, then exactly the number of response bytes the command
//! produces is collected. Two strategies implement [`Transport`]:
//!
//! - [`BusTransport`]: a combined write/read I2C transaction.
//! - [`LinkTransport`]: a UART write followed by a polling read loop with a
//!   fixed per-wait deadline.
//!
//! Nothing is buffered across exchanges and nothing is retried here. A
//! caller that repeats an exchange after a failure drops leftover input with
//! [`Transport::discard_input`] first.

pub mod bus;
pub mod link;

pub use bus::{BusTransport, I2cBus};
#[cfg(all(feature = "native", target_os = "linux"))]
pub use bus::I2cDevice;
pub use link::{LinkTransport, POLL_TIMEOUT};

use std::fmt;

use crate::error::{Error, Result, TransportError};

/// Kind of interface a transport talks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Addressed I2C bus.
    Bus,
    /// UART link.
    Link,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "I2C"),
            Self::Link => write!(f, "UART"),
        }
    }
}

/// One request/response exchange with the bootloader.
pub trait Transport {
    /// Write `request` and collect `response_len` response bytes.
    ///
    /// A link transport may return a single byte early when the bootloader
    /// rejects the frame, since nothing follows a negative acknowledgement.
    fn exchange(
        &mut self,
        request: &[u8],
        response_len: usize,
    ) -> std::result::Result<Vec<u8>, TransportError>;

    /// Interface kind.
    fn kind(&self) -> TransportKind;

    /// Drop input that arrived after the last exchange ended.
    ///
    /// A bus transaction leaves nothing behind, so the default does nothing.
    fn discard_input(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reconfigure the local baud rate. Only meaningful on a link.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        Err(Error::Unsupported(format!(
            "cannot set baud rate {baud_rate} on an {} interface",
            self.kind()
        )))
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exchange(
        &mut self,
        request: &[u8],
        response_len: usize,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        (**self).exchange(request, response_len)
    }

    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        (**self).set_baud_rate(baud_rate)
    }
}
