//! UART link transport.
//!
//! The request is written unbuffered, then the response is drained from the
//! port until the expected number of bytes has arrived. Each read waits at
//! most [`POLL_TIMEOUT`]; a wait that ends without data fails the exchange
//! with [`TransportError::Timeout`] instead of blocking.

use std::io::ErrorKind;
use std::time::Duration;

use log::trace;

use crate::error::{Result, TransportError};
use crate::port::Port;
use crate::protocol::response::ACK;
use crate::transport::{Transport, TransportKind};

/// Deadline of a single wait for readable data.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Bootloader reached over a UART.
pub struct LinkTransport<P: Port> {
    port: P,
}

impl<P: Port> LinkTransport<P> {
    /// Wrap an opened port, applying the polling deadline as its read timeout.
    pub fn new(mut port: P) -> Result<Self> {
        port.set_timeout(POLL_TIMEOUT)?;
        Ok(Self { port })
    }

    /// Underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Release the port.
    pub fn into_inner(self) -> P {
        self.port
    }

    fn write_request(&mut self, request: &[u8]) -> std::result::Result<(), TransportError> {
        let mut written = 0;
        while written < request.len() {
            match self.port.write(&request[written..]) {
                Ok(0) => {
                    return Err(TransportError::ShortWrite {
                        expected: request.len(),
                        written,
                    });
                },
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }
        self.port.flush()?;
        Ok(())
    }

    fn read_response(
        &mut self,
        response_len: usize,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        let mut rx = vec![0u8; response_len];
        let mut received = 0;

        while received < response_len {
            match self.port.read(&mut rx[received..]) {
                Ok(0) => {
                    return Err(TransportError::ShortRead {
                        expected: response_len,
                        received,
                    });
                },
                Ok(n) => {
                    trace!("received {n} bytes ({}/{response_len})", received + n);
                    received += n;
                    // A rejected frame is answered by the acknowledgement byte alone
                    if rx[0] != ACK {
                        rx.truncate(received);
                        return Ok(rx);
                    }
                },
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    trace!("timeout after {received}/{response_len} bytes");
                    return Err(TransportError::Timeout {
                        expected: response_len,
                        received,
                    });
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }

        Ok(rx)
    }
}

impl<P: Port> Transport for LinkTransport<P> {
    fn exchange(
        &mut self,
        request: &[u8],
        response_len: usize,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        self.write_request(request)?;
        self.read_response(response_len)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Link
    }

    fn discard_input(&mut self) -> Result<()> {
        trace!("discarding pending input");
        self.port.clear_buffers()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.port.set_baud_rate(baud_rate)
    }
}
