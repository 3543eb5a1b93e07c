//! Bootloader device information.

use std::fmt;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

/// Size of the Get Device Info response data.
pub const DEVICE_INFO_LEN: usize = 24;

/// Version and buffer information reported by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// Command interpreter version.
    pub version: u16,
    /// Bootloader build id.
    pub build_id: u16,
    /// Application version word.
    pub app_version: u32,
    /// Plug-in interface version.
    pub interface_version: u16,
    /// Largest data buffer the bootloader accepts.
    pub max_buffer_size: u16,
    /// Start address of the bootloader buffer in SRAM.
    pub buffer_start: u32,
    /// BCR configuration id.
    pub bcr_config_id: u32,
    /// BSL configuration id.
    pub bsl_config_id: u32,
}

impl DeviceInfo {
    /// Parse the data part of a device info response.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DEVICE_INFO_LEN {
            return Err(Error::InvalidFrame(format!(
                "device info too short: {} bytes (expected {DEVICE_INFO_LEN})",
                data.len()
            )));
        }

        let mut cursor = &data[..DEVICE_INFO_LEN];
        Ok(Self {
            version: cursor.read_u16::<LittleEndian>()?,
            build_id: cursor.read_u16::<LittleEndian>()?,
            app_version: cursor.read_u32::<LittleEndian>()?,
            interface_version: cursor.read_u16::<LittleEndian>()?,
            max_buffer_size: cursor.read_u16::<LittleEndian>()?,
            buffer_start: cursor.read_u32::<LittleEndian>()?,
            bcr_config_id: cursor.read_u32::<LittleEndian>()?,
            bsl_config_id: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CMD interpreter version:    {:#06x}", self.version)?;
        writeln!(f, "Build ID:                   {:#06x}", self.build_id)?;
        writeln!(f, "Application version:        {:#010x}", self.app_version)?;
        writeln!(f, "Plug-in interface version:  {:#06x}", self.interface_version)?;
        writeln!(f, "BSL max buffer size:        {:#06x}", self.max_buffer_size)?;
        writeln!(f, "BSL buffer start address:   {:#010x}", self.buffer_start)?;
        writeln!(f, "BCR configuration ID:       {:#010x}", self.bcr_config_id)?;
        write!(f, "BSL configuration ID:       {:#010x}", self.bsl_config_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0100u16.to_le_bytes());
        data.extend_from_slice(&0x0012u16.to_le_bytes());
        data.extend_from_slice(&0x0000_0001u32.to_le_bytes());
        data.extend_from_slice(&0x0002u16.to_le_bytes());
        data.extend_from_slice(&0x0600u16.to_le_bytes());
        data.extend_from_slice(&0x2000_0160u32.to_le_bytes());
        data.extend_from_slice(&0x0000_0003u32.to_le_bytes());
        data.extend_from_slice(&0x0000_0004u32.to_le_bytes());
        data
    }

    #[test]
    fn test_parse_device_info() {
        let info = DeviceInfo::parse(&sample()).unwrap();
        assert_eq!(info.version, 0x0100);
        assert_eq!(info.build_id, 0x0012);
        assert_eq!(info.app_version, 1);
        assert_eq!(info.interface_version, 2);
        assert_eq!(info.max_buffer_size, 0x0600);
        assert_eq!(info.buffer_start, 0x2000_0160);
        assert_eq!(info.bcr_config_id, 3);
        assert_eq!(info.bsl_config_id, 4);
    }

    #[test]
    fn test_parse_too_short() {
        let data = sample();
        assert!(matches!(
            DeviceInfo::parse(&data[..23]),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_display() {
        let info = DeviceInfo::parse(&sample()).unwrap();
        let text = info.to_string();
        assert!(text.contains("BSL max buffer size:        0x0600"));
        assert!(text.contains("BSL buffer start address:   0x20000160"));
        assert_eq!(text.lines().count(), 8);
    }
}
