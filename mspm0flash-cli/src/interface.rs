//! Opening the bootloader interface selected on the command line.

use std::fmt;

use mspm0flash::{FlowControl, LinkTransport, NativePort, SerialConfig, Transport};

/// Bootloader interface of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Interface {
    /// I2C character device and 7-bit target address.
    I2c {
        /// Device node.
        device: String,
        /// Bootloader address.
        address: u16,
    },
    /// Serial device.
    Serial {
        /// Device node.
        device: String,
        /// Baud rate the port is opened at.
        baud_rate: u32,
        /// Flow control mode.
        flow_control: FlowControl,
    },
}

impl Interface {
    /// Whether this is a serial link.
    pub(crate) fn is_serial(&self) -> bool {
        matches!(self, Self::Serial { .. })
    }

    /// Open the device and wrap it in the matching transport.
    pub(crate) fn open(&self) -> mspm0flash::Result<Box<dyn Transport>> {
        match self {
            Self::I2c { device, address } => open_i2c(device, *address),
            Self::Serial {
                device,
                baud_rate,
                flow_control,
            } => {
                let config =
                    SerialConfig::new(device.as_str(), *baud_rate).with_flow_control(*flow_control);
                let port = NativePort::open(&config)?;
                Ok(Box::new(LinkTransport::new(port)?))
            },
        }
    }
}

#[cfg(target_os = "linux")]
fn open_i2c(device: &str, address: u16) -> mspm0flash::Result<Box<dyn Transport>> {
    use mspm0flash::{BusTransport, transport::I2cDevice};

    let bus = I2cDevice::open(device)?;
    Ok(Box::new(BusTransport::new(bus, address)))
}

#[cfg(not(target_os = "linux"))]
fn open_i2c(device: &str, _address: u16) -> mspm0flash::Result<Box<dyn Transport>> {
    Err(mspm0flash::Error::Unsupported(format!(
        "I2C device {device}: I2C is only available on Linux"
    )))
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c { device, address } => write!(f, "{device} (I2C address {address:#04x})"),
            Self::Serial {
                device, baud_rate, ..
            } => write!(f, "{device} @ {baud_rate} baud"),
        }
    }
}
