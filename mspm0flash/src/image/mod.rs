//! Firmware image handling.

pub mod binary;

pub use binary::{FirmwareImage, VerifyRegion};
