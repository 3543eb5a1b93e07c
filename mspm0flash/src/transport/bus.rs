//! I2C bus transport.
//!
//! The request write and the response read are issued as one combined bus
//! transaction addressed to the bootloader, so no other traffic can land
//! between them.

use std::io;

use log::trace;

use crate::error::TransportError;
use crate::transport::{Transport, TransportKind};

/// Default 7-bit I2C address of the bootloader.
pub const DEFAULT_ADDRESS: u16 = 0x48;

/// An I2C bus capable of a combined write-then-read transaction.
pub trait I2cBus {
    /// Write `tx` to `address`, then read `rx.len()` bytes back, atomically.
    fn write_read(&mut self, address: u16, tx: &[u8], rx: &mut [u8]) -> io::Result<()>;
}

impl<B: I2cBus + ?Sized> I2cBus for &mut B {
    fn write_read(&mut self, address: u16, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
        (**self).write_read(address, tx, rx)
    }
}

/// Bootloader reached over an addressed I2C bus.
pub struct BusTransport<B: I2cBus> {
    bus: B,
    address: u16,
}

impl<B: I2cBus> BusTransport<B> {
    /// Talk to the bootloader at `address` on `bus`.
    pub fn new(bus: B, address: u16) -> Self {
        Self { bus, address }
    }

    /// Target bus address.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Release the bus.
    pub fn into_inner(self) -> B {
        self.bus
    }
}

impl<B: I2cBus> Transport for BusTransport<B> {
    fn exchange(
        &mut self,
        request: &[u8],
        response_len: usize,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        let mut rx = vec![0u8; response_len];
        self.bus
            .write_read(self.address, request, &mut rx)
            .map_err(TransportError::Io)?;
        trace!(
            "i2c {:#04x}: wrote {} bytes, read {response_len}",
            self.address,
            request.len()
        );
        Ok(rx)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Bus
    }
}

#[cfg(all(feature = "native", target_os = "linux"))]
pub use linux::I2cDevice;

#[cfg(all(feature = "native", target_os = "linux"))]
mod linux {
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::fd::AsRawFd;

    use log::debug;

    use super::I2cBus;
    use crate::error::TransportError;

    mod syscalls {
        use nix::{ioctl_write_int_bad, ioctl_write_ptr_bad};

        /// Message flag: read from the slave.
        pub const I2C_M_RD: u16 = 0x0001;

        /// `struct i2c_msg` from `<linux/i2c.h>`.
        #[repr(C)]
        pub struct I2cMsg {
            pub addr: u16,
            pub flags: u16,
            pub len: u16,
            pub buf: *mut u8,
        }

        /// `struct i2c_rdwr_ioctl_data` from `<linux/i2c-dev.h>`.
        #[repr(C)]
        pub struct I2cRdwrData {
            pub msgs: *mut I2cMsg,
            pub nmsgs: u32,
        }

        ioctl_write_int_bad!(i2c_slave_force, 0x0706);
        ioctl_write_ptr_bad!(i2c_rdwr, 0x0707, I2cRdwrData);
    }

    /// Linux i2c-dev character device (`/dev/i2c-N`).
    pub struct I2cDevice {
        file: File,
        path: String,
    }

    impl I2cDevice {
        /// Open an i2c-dev device node.
        pub fn open(path: &str) -> Result<Self, TransportError> {
            debug!("Opening I2C device {path}");
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|source| TransportError::Open {
                    path: path.to_string(),
                    source,
                })?;
            Ok(Self {
                file,
                path: path.to_string(),
            })
        }

        /// Device node path.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    fn msg_len(len: usize) -> io::Result<u16> {
        u16::try_from(len).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("I2C message of {len} bytes exceeds the transfer limit"),
            )
        })
    }

    impl I2cBus for I2cDevice {
        #[allow(unsafe_code)]
        fn write_read(&mut self, address: u16, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
            let fd = self.file.as_raw_fd();

            // SAFETY: I2C_SLAVE_FORCE takes the address by value.
            unsafe { syscalls::i2c_slave_force(fd, i32::from(address)) }?;

            let mut msgs = [
                syscalls::I2cMsg {
                    addr: address,
                    flags: 0,
                    len: msg_len(tx.len())?,
                    // The kernel only reads from a message without I2C_M_RD
                    buf: tx.as_ptr().cast_mut(),
                },
                syscalls::I2cMsg {
                    addr: address,
                    flags: syscalls::I2C_M_RD,
                    len: msg_len(rx.len())?,
                    buf: rx.as_mut_ptr(),
                },
            ];
            let data = syscalls::I2cRdwrData {
                msgs: msgs.as_mut_ptr(),
                nmsgs: 2,
            };

            // SAFETY: both message buffers outlive the call and their lengths
            // match the slices they point into.
            unsafe { syscalls::i2c_rdwr(fd, &data) }?;
            Ok(())
        }
    }
}
