//! CRC32 as computed by the MSPM0 bootloader.
//!
//! Reflected polynomial 0xEDB88320, initial value 0xFFFFFFFF and **no** final
//! inversion (the JAMCRC variant). The same checksum protects every packet
//! and is what the bootloader reports for a standalone verification, so it
//! must not be replaced by the zlib CRC32.

/// Reflected CRC32 polynomial.
pub const CRC32_POLY: u32 = 0xEDB8_8320;

/// Initial register value.
pub const CRC32_INIT: u32 = 0xFFFF_FFFF;

const CRC32_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (CRC32_POLY & mask);
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Feed `data` into a running CRC register.
///
/// Start from [`CRC32_INIT`]; the returned register is already the final
/// value since no output inversion is applied.
pub fn crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    crc
}

/// Compute the bootloader CRC32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(CRC32_INIT, data)
}
