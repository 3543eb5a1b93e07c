//! BSL core commands.
//!
//! Each [`Command`] owns its arguments, knows its command id and the exact
//! response length the bootloader produces for it, and encodes itself into a
//! request frame. Argument limits are checked before any byte is built.

use std::fmt;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::protocol::frame::{self, MAX_PAYLOAD_LEN};

/// Command id bytes.
pub mod commands {
    /// Establish the connection with the bootloader.
    pub const CONNECTION: u8 = 0x12;
    /// Erase the whole main flash.
    pub const MASS_ERASE: u8 = 0x15;
    /// Read version and buffer information.
    pub const GET_DEVICE_INFO: u8 = 0x19;
    /// Write a block of data.
    pub const PROGRAM_DATA: u8 = 0x20;
    /// Unlock the protected commands with the BSL password.
    pub const UNLOCK_BOOTLOADER: u8 = 0x21;
    /// CRC32 of a memory region computed by the device.
    pub const STANDALONE_VERIFICATION: u8 = 0x26;
    /// Read memory back.
    pub const MEMORY_READ_BACK: u8 = 0x29;
    /// Leave the bootloader and run the application.
    pub const START_APPLICATION: u8 = 0x40;
    /// Switch the UART baud rate.
    pub const CHANGE_BAUD_RATE: u8 = 0x52;
}

/// Largest data block accepted by a single Program Data command.
pub const PROGRAM_DATA_MAX_LEN: usize = 256;

/// Largest Memory Read-Back count that fits one core response.
pub const READ_BACK_MAX_LEN: usize = MAX_PAYLOAD_LEN;

/// Length of the bootloader unlock password.
pub const PASSWORD_LEN: usize = 32;

/// Response length of commands answered with a bare acknowledgement.
const ACK_ONLY_LEN: usize = 1;

/// Response length of commands answered with a core message.
const MESSAGE_LEN: usize = 10;

/// ACK + core header + length + type + CRC32, without data.
const CORE_OVERHEAD: usize = 9;

/// Bootloader unlock password.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Password([u8; PASSWORD_LEN]);

impl Password {
    /// Password from raw bytes.
    pub fn new(bytes: [u8; PASSWORD_LEN]) -> Self {
        Self(bytes)
    }

    /// Password from a slice that must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; PASSWORD_LEN] = bytes.try_into().map_err(|_| {
            Error::Config(format!(
                "password must be {PASSWORD_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Password from a hexadecimal string (whitespace and `_` ignored).
    pub fn from_hex(s: &str) -> Result<Self> {
        let cleaned: String = s
            .trim()
            .trim_start_matches("0x")
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect();
        let bytes =
            hex::decode(&cleaned).map_err(|e| Error::Config(format!("invalid password: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Raw password bytes.
    pub fn as_bytes(&self) -> &[u8; PASSWORD_LEN] {
        &self.0
    }
}

impl Default for Password {
    /// Erased password area: all bytes 0xFF.
    fn default() -> Self {
        Self([0xFF; PASSWORD_LEN])
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::default() {
            write!(f, "Password(default)")
        } else {
            write!(f, "Password(<redacted>)")
        }
    }
}

/// UART baud rates understood by the Change Baud Rate command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaudRate {
    /// 4800 baud.
    B4800,
    /// 9600 baud (bootloader default).
    B9600,
    /// 19200 baud.
    B19200,
    /// 38400 baud.
    B38400,
    /// 57600 baud.
    B57600,
    /// 115200 baud.
    B115200,
    /// 1000000 baud.
    B1000000,
}

impl BaudRate {
    /// All supported rates, slowest first.
    pub const ALL: [Self; 7] = [
        Self::B4800,
        Self::B9600,
        Self::B19200,
        Self::B38400,
        Self::B57600,
        Self::B115200,
        Self::B1000000,
    ];

    /// Code sent in the Change Baud Rate command.
    pub fn code(self) -> u8 {
        match self {
            Self::B4800 => 1,
            Self::B9600 => 2,
            Self::B19200 => 3,
            Self::B38400 => 4,
            Self::B57600 => 5,
            Self::B115200 => 6,
            Self::B1000000 => 7,
        }
    }

    /// Bits per second.
    pub fn bps(self) -> u32 {
        match self {
            Self::B4800 => 4_800,
            Self::B9600 => 9_600,
            Self::B19200 => 19_200,
            Self::B38400 => 38_400,
            Self::B57600 => 57_600,
            Self::B115200 => 115_200,
            Self::B1000000 => 1_000_000,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;

    fn try_from(bps: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|rate| rate.bps() == bps)
            .ok_or_else(|| Error::Unsupported(format!("baud rate {bps} not supported by the BSL")))
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bps())
    }
}

/// BSL core command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Establish the connection over the selected interface.
    Connect,
    /// Read version and buffer information.
    GetDeviceInfo,
    /// Unlock the protected commands.
    Unlock {
        /// 32-byte BSL password.
        password: Password,
    },
    /// Erase the main flash. Requires an unlocked bootloader.
    MassErase,
    /// Write up to [`PROGRAM_DATA_MAX_LEN`] bytes at `address`.
    ProgramData {
        /// Target flash address.
        address: u32,
        /// Data block.
        data: Vec<u8>,
    },
    /// Read `count` bytes starting at `address`.
    MemoryReadBack {
        /// Start address.
        address: u32,
        /// Number of bytes.
        count: u32,
    },
    /// Ask the device for the CRC32 of a memory region.
    StandaloneVerification {
        /// Start address.
        address: u32,
        /// Region length in bytes.
        length: u32,
    },
    /// Leave the bootloader and start the application.
    ///
    /// The device sends nothing after the acknowledgement.
    StartApplication,
    /// Switch the UART baud rate after the acknowledgement.
    ChangeBaudRate {
        /// New rate.
        rate: BaudRate,
    },
}

impl Command {
    /// Program Data command, checking the block size.
    pub fn program_data(address: u32, data: impl Into<Vec<u8>>) -> Result<Self> {
        let cmd = Self::ProgramData {
            address,
            data: data.into(),
        };
        cmd.validate()?;
        Ok(cmd)
    }

    /// Memory Read-Back command, checking the count.
    pub fn memory_read_back(address: u32, count: u32) -> Result<Self> {
        let cmd = Self::MemoryReadBack { address, count };
        cmd.validate()?;
        Ok(cmd)
    }

    /// Command id byte.
    pub fn id(&self) -> u8 {
        match self {
            Self::Connect => commands::CONNECTION,
            Self::GetDeviceInfo => commands::GET_DEVICE_INFO,
            Self::Unlock { .. } => commands::UNLOCK_BOOTLOADER,
            Self::MassErase => commands::MASS_ERASE,
            Self::ProgramData { .. } => commands::PROGRAM_DATA,
            Self::MemoryReadBack { .. } => commands::MEMORY_READ_BACK,
            Self::StandaloneVerification { .. } => commands::STANDALONE_VERIFICATION,
            Self::StartApplication => commands::START_APPLICATION,
            Self::ChangeBaudRate { .. } => commands::CHANGE_BAUD_RATE,
        }
    }

    /// Human readable command name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "Connect",
            Self::GetDeviceInfo => "Get Device Info",
            Self::Unlock { .. } => "Unlock Bootloader",
            Self::MassErase => "Mass Erase",
            Self::ProgramData { .. } => "Program Data",
            Self::MemoryReadBack { .. } => "Memory Read Back",
            Self::StandaloneVerification { .. } => "Standalone Verification",
            Self::StartApplication => "Start Application",
            Self::ChangeBaudRate { .. } => "Change Baud Rate",
        }
    }

    /// Exact number of response bytes the bootloader sends for this command.
    pub fn response_len(&self) -> usize {
        match self {
            Self::Connect | Self::StartApplication | Self::ChangeBaudRate { .. } => ACK_ONLY_LEN,
            Self::GetDeviceInfo => CORE_OVERHEAD + crate::device::DEVICE_INFO_LEN,
            Self::Unlock { .. } | Self::MassErase | Self::ProgramData { .. } => MESSAGE_LEN,
            Self::MemoryReadBack { count, .. } => CORE_OVERHEAD + *count as usize,
            Self::StandaloneVerification { .. } => CORE_OVERHEAD + 4,
        }
    }

    /// Whether the response carries a core frame after the acknowledgement.
    pub fn has_core_response(&self) -> bool {
        self.response_len() > ACK_ONLY_LEN
    }

    /// Check argument limits.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::ProgramData { data, .. } if data.len() > PROGRAM_DATA_MAX_LEN => {
                Err(Error::PayloadTooLarge {
                    command: self.name(),
                    len: data.len(),
                    max: PROGRAM_DATA_MAX_LEN,
                })
            },
            Self::MemoryReadBack { count, .. } if *count as usize > READ_BACK_MAX_LEN => {
                Err(Error::PayloadTooLarge {
                    command: self.name(),
                    len: *count as usize,
                    max: READ_BACK_MAX_LEN,
                })
            },
            _ => Ok(()),
        }
    }

    /// Command arguments as sent after the id byte.
    pub fn payload(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut buf = Vec::new();
        match self {
            Self::Connect | Self::GetDeviceInfo | Self::MassErase | Self::StartApplication => {},
            Self::Unlock { password } => buf.extend_from_slice(password.as_bytes()),
            Self::ProgramData { address, data } => {
                buf.write_u32::<LittleEndian>(*address)?;
                buf.extend_from_slice(data);
            },
            Self::MemoryReadBack { address, count } => {
                buf.write_u32::<LittleEndian>(*address)?;
                buf.write_u32::<LittleEndian>(*count)?;
            },
            Self::StandaloneVerification { address, length } => {
                buf.write_u32::<LittleEndian>(*address)?;
                buf.write_u32::<LittleEndian>(*length)?;
            },
            Self::ChangeBaudRate { rate } => buf.push(rate.code()),
        }
        Ok(buf)
    }

    /// Encode the complete request frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        frame::encode(self.id(), &self.payload()?)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramData { address, data } => {
                write!(f, "{} @ {address:#010x} ({} bytes)", self.name(), data.len())
            },
            Self::MemoryReadBack { address, count } => {
                write!(f, "{} @ {address:#010x} ({count} bytes)", self.name())
            },
            Self::StandaloneVerification { address, length } => {
                write!(f, "{} @ {address:#010x} ({length} bytes)", self.name())
            },
            Self::ChangeBaudRate { rate } => write!(f, "{} to {rate}", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}
