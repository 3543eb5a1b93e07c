//! Raw binary firmware images.
//!
//! An image is loaded into a buffer padded with 0xFF (the erased flash
//! value) to a 4 KiB boundary. Programming covers the logical length; the
//! standalone verification covers whole 1 KiB blocks.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};
use crate::protocol::crc::{CRC32_INIT, crc32_update};

/// Load buffer alignment.
pub const PAGE_ALIGN: usize = 4096;

/// Granularity of the device-side CRC.
pub const VERIFY_ALIGN: usize = 1024;

/// Granularity of Program Data addresses and lengths.
pub const PROGRAM_ALIGN: usize = 8;

/// Erased flash value used for padding.
pub const FILL_BYTE: u8 = 0xFF;

const fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Region checked by a standalone verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyRegion {
    /// Length in bytes, starting at the image base.
    pub length: u32,
    /// Expected CRC32 of the region.
    pub crc: u32,
}

/// A raw binary image ready to be programmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
    len: usize,
}

impl FirmwareImage {
    /// Load an image from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading image from: {}", path.display());

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        Self::from_bytes(data)
    }

    /// Build an image from raw bytes.
    pub fn from_bytes(mut data: Vec<u8>) -> Result<Self> {
        let len = data.len();
        if len == 0 {
            return Err(Error::InvalidImage("empty image".into()));
        }
        if u32::try_from(align_up(len, PAGE_ALIGN)).is_err() {
            return Err(Error::InvalidImage(format!(
                "image of {len} bytes exceeds the 32-bit address space"
            )));
        }

        data.resize(align_up(len, PAGE_ALIGN), FILL_BYTE);
        debug!("image_size={len} padded={}", data.len());

        Ok(Self { data, len })
    }

    /// Logical image length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: empty images are rejected on load.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The 0xFF-padded buffer.
    pub fn padded(&self) -> &[u8] {
        &self.data
    }

    /// Bytes to program: the logical length rounded up to the program
    /// granularity, padding included.
    pub fn program_data(&self) -> &[u8] {
        &self.data[..align_up(self.len, PROGRAM_ALIGN)]
    }

    /// Region to verify.
    ///
    /// Without an explicit length this is the image length rounded up to
    /// whole 1 KiB blocks. An explicit length may reach past the padded
    /// buffer, in which case the CRC continues over 0xFF fill.
    pub fn verify_region(&self, explicit_len: Option<u32>) -> Result<VerifyRegion> {
        let length = match explicit_len {
            Some(len) => len,
            None => u32::try_from(align_up(self.len, VERIFY_ALIGN))
                .map_err(|_| Error::InvalidImage("verification region too large".into()))?,
        };

        let covered = (length as usize).min(self.data.len());
        let mut crc = crc32_update(CRC32_INIT, &self.data[..covered]);

        let fill = [FILL_BYTE; 256];
        let mut remaining = length as usize - covered;
        while remaining > 0 {
            let n = remaining.min(fill.len());
            crc = crc32_update(crc, &fill[..n]);
            remaining -= n;
        }

        Ok(VerifyRegion { length, crc })
    }
}
