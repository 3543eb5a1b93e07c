//! BSL packet framing.
//!
//! ## Request Frame
//!
//! ```text
//! +--------+---------+-----+-------------------+---------+
//! | Header | Length  | CMD |     Arguments     |  CRC32  |
//! +--------+---------+-----+-------------------+---------+
//! |   1    |    2    |  1  |     variable      |    4    |
//! +--------+---------+-----+-------------------+---------+
//! |  0x80  | 1 + len | id  |                   | CMD..   |
//! +--------+---------+-----+-------------------+---------+
//! ```
//!
//! ## Response
//!
//! The first byte is always the link acknowledgement. Commands that produce
//! a core response append a complete core frame in the same transaction:
//!
//! ```text
//! +-----+--------+---------+------+---------------+---------+
//! | ACK | Header | Length  | Type |     Data      |  CRC32  |
//! +-----+--------+---------+------+---------------+---------+
//! |  1  |   1    |    2    |  1   |   variable    |    4    |
//! +-----+--------+---------+------+---------------+---------+
//! | 0x00|  0x08  |    N    |      |   N - 1       | Type..  |
//! +-----+--------+---------+------+---------------+---------+
//! ```
//!
//! All multi-byte integers are little-endian. Both CRC32 trailers cover
//! exactly the bytes counted by the preceding length field.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::protocol::crc::crc32;
use crate::protocol::response::{CoreStatus, ResponseKind};

/// Request header byte.
pub const HEADER: u8 = 0x80;

/// Header byte plus the 16-bit length field.
pub const HEADER_SIZE: usize = 3;

/// CRC32 trailer size.
pub const CRC_SIZE: usize = 4;

/// Header byte of a core response.
pub const CORE_HEADER: u8 = 0x08;

/// Largest argument block that still fits the 16-bit length field.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - 1;

/// Total request frame size for a command with `payload_len` argument bytes.
pub const fn frame_length(payload_len: usize) -> usize {
    HEADER_SIZE + 1 + payload_len + CRC_SIZE
}

/// Encode a request frame.
pub fn encode(command_id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let core_len = u16::try_from(1 + payload.len()).map_err(|_| Error::PayloadTooLarge {
        command: "frame",
        len: payload.len(),
        max: MAX_PAYLOAD_LEN,
    })?;

    let mut buf = Vec::with_capacity(frame_length(payload.len()));
    buf.push(HEADER);
    buf.write_u16::<LittleEndian>(core_len)?;
    buf.push(command_id);
    buf.extend_from_slice(payload);

    let crc = crc32(&buf[HEADER_SIZE..]);
    buf.write_u32::<LittleEndian>(crc)?;

    debug_assert_eq!(buf.len(), frame_length(payload.len()));
    Ok(buf)
}

/// A request frame taken apart again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Command id byte.
    pub command_id: u8,
    /// Command arguments.
    pub payload: Vec<u8>,
}

/// Decode and validate a request frame.
pub fn decode(frame: &[u8]) -> Result<DecodedFrame> {
    if frame.len() < frame_length(0) {
        return Err(Error::InvalidFrame(format!(
            "frame too short: {} bytes",
            frame.len()
        )));
    }
    if frame[0] != HEADER {
        return Err(Error::InvalidFrame(format!(
            "bad header {:#04x}",
            frame[0]
        )));
    }

    let core_len = usize::from((&frame[1..3]).read_u16::<LittleEndian>()?);
    if core_len == 0 || frame.len() != HEADER_SIZE + core_len + CRC_SIZE {
        return Err(Error::InvalidFrame(format!(
            "declared length {core_len} does not match {} frame bytes",
            frame.len()
        )));
    }

    let core = &frame[HEADER_SIZE..HEADER_SIZE + core_len];
    let crc = (&frame[HEADER_SIZE + core_len..]).read_u32::<LittleEndian>()?;
    if crc != crc32(core) {
        return Err(Error::InvalidFrame(format!(
            "checksum mismatch: frame {crc:#010x}, computed {:#010x}",
            crc32(core)
        )));
    }

    Ok(DecodedFrame {
        command_id: core[0],
        payload: core[1..].to_vec(),
    })
}

/// Return the link acknowledgement byte of a response.
pub fn decode_ack(raw: &[u8]) -> Result<u8> {
    raw.first()
        .copied()
        .ok_or_else(|| Error::InvalidFrame("empty response".into()))
}

/// Core response carried after the acknowledgement byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreMessage {
    /// Response type.
    pub kind: ResponseKind,
    /// Response data (without type byte and CRC).
    pub data: Vec<u8>,
}

impl CoreMessage {
    /// Smallest response that can carry a core frame:
    /// ACK + header + length + type + CRC32.
    pub const MIN_RESPONSE_LEN: usize = 1 + HEADER_SIZE + 1 + CRC_SIZE;

    /// Decode and validate the core response following the acknowledgement.
    ///
    /// The acknowledgement byte itself is not interpreted here.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < Self::MIN_RESPONSE_LEN {
            return Err(Error::InvalidFrame(format!(
                "core response too short: {} bytes",
                raw.len()
            )));
        }
        if raw[1] != CORE_HEADER {
            return Err(Error::InvalidFrame(format!(
                "invalid core response header {:#04x}",
                raw[1]
            )));
        }

        let core_len = usize::from((&raw[2..4]).read_u16::<LittleEndian>()?);
        let core_start = 1 + HEADER_SIZE;
        let core_end = core_start + core_len;
        if core_len == 0 || raw.len() < core_end + CRC_SIZE {
            return Err(Error::InvalidFrame(format!(
                "declared core length {core_len} exceeds {} response bytes",
                raw.len()
            )));
        }

        let core = &raw[core_start..core_end];
        let crc = (&raw[core_end..core_end + CRC_SIZE]).read_u32::<LittleEndian>()?;
        let computed = crc32(core);
        if crc != computed {
            return Err(Error::InvalidFrame(format!(
                "core response checksum mismatch: frame {crc:#010x}, computed {computed:#010x}"
            )));
        }

        let kind = ResponseKind::from(core[0]);
        if kind == ResponseKind::Message && core.len() < 2 {
            return Err(Error::InvalidFrame("message response without status".into()));
        }

        Ok(Self {
            kind,
            data: core[1..].to_vec(),
        })
    }

    /// Status byte of a message response.
    ///
    /// Only the generic message type carries a status; other response types
    /// return `None`.
    pub fn status(&self) -> Option<CoreStatus> {
        match self.kind {
            ResponseKind::Message => self.data.first().copied().map(CoreStatus::from),
            _ => None,
        }
    }
}

/// Decode the core response of `raw`.
pub fn decode_core_message(raw: &[u8]) -> Result<CoreMessage> {
    CoreMessage::decode(raw)
}

/// Build an acknowledged core response as the bootloader would send it.
#[cfg(test)]
pub(crate) fn encode_response(kind: u8, data: &[u8]) -> Vec<u8> {
    let core_len = u16::try_from(1 + data.len()).unwrap();
    let mut buf = vec![0x00, CORE_HEADER];
    buf.extend_from_slice(&core_len.to_le_bytes());
    buf.push(kind);
    buf.extend_from_slice(data);
    let crc = crc32(&buf[1 + HEADER_SIZE..]);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Build an acknowledged message response carrying `status`.
#[cfg(test)]
pub(crate) fn encode_message(status: u8) -> Vec<u8> {
    encode_response(0x3b, &[status])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_length() {
        assert_eq!(frame_length(0), 8);
        assert_eq!(frame_length(8), 16);
        assert_eq!(frame_length(260), 268);
    }

    #[test]
    fn test_encode_connect() {
        let frame = encode(0x12, &[]).unwrap();
        assert_eq!(&frame[..4], &[0x80, 0x01, 0x00, 0x12]);
        assert_eq!(&frame[4..], &crc32(&[0x12]).to_le_bytes());
    }

    #[test]
    fn test_encode_program_data_scenario() {
        let mut payload = 0u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        let frame = encode(0x20, &payload).unwrap();

        assert_eq!(
            &frame[..12],
            &[0x80, 0x09, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04]
        );
        let crc = crc32(&frame[3..12]);
        assert_eq!(&frame[12..], &crc.to_le_bytes());
        assert_eq!(frame.len(), frame_length(8));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for len in [0usize, 1, 4, 33, 252] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let frame = encode(0x26, &payload).unwrap();
            let decoded = decode(&frame).unwrap();
            assert_eq!(decoded.command_id, 0x26);
            assert_eq!(decoded.payload, payload);

            let trailer = u32::from_le_bytes(frame[frame.len() - 4..].try_into().unwrap());
            assert_eq!(trailer, crc32(&frame[HEADER_SIZE..frame.len() - CRC_SIZE]));
        }
    }

    #[test]
    fn test_encode_rejects_oversize_payload() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            encode(0x20, &payload),
            Err(Error::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let mut frame = encode(0x19, &[]).unwrap();
        frame[3] = 0x18;
        assert!(matches!(decode(&frame), Err(Error::InvalidFrame(_))));

        let mut frame = encode(0x19, &[]).unwrap();
        frame[0] = 0x81;
        assert!(matches!(decode(&frame), Err(Error::InvalidFrame(_))));

        let frame = encode(0x19, &[1, 2, 3]).unwrap();
        assert!(matches!(
            decode(&frame[..frame.len() - 1]),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_decode_ack() {
        assert_eq!(decode_ack(&[0x52]).unwrap(), 0x52);
        assert!(matches!(decode_ack(&[]), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_decode_message() {
        let raw = encode_message(0x00);
        assert_eq!(raw.len(), 10);
        let msg = decode_core_message(&raw).unwrap();
        assert_eq!(msg.kind, ResponseKind::Message);
        assert_eq!(msg.status(), Some(CoreStatus::Success));

        let raw = encode_message(0x0a);
        let msg = decode_core_message(&raw).unwrap();
        assert_eq!(msg.status(), Some(CoreStatus::InvalidAddress));
    }

    #[test]
    fn test_non_message_has_no_status() {
        let raw = encode_response(0x32, &0xAABB_CCDDu32.to_le_bytes());
        assert_eq!(raw.len(), 13);
        let msg = decode_core_message(&raw).unwrap();
        assert_eq!(msg.kind, ResponseKind::StandaloneVerification);
        assert_eq!(msg.status(), None);
        assert_eq!(msg.data, 0xAABB_CCDDu32.to_le_bytes());
    }

    #[test]
    fn test_decode_short_response_is_invalid() {
        let raw = encode_message(0x00);
        for len in 0..raw.len() {
            assert!(
                matches!(decode_core_message(&raw[..len]), Err(Error::InvalidFrame(_))),
                "truncated to {len} bytes"
            );
        }
    }

    #[test]
    fn test_decode_bad_marker_is_invalid() {
        let mut raw = encode_message(0x00);
        raw[1] = 0x00;
        assert!(matches!(
            decode_core_message(&raw),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_decode_overlong_declared_length_is_invalid() {
        let mut raw = encode_message(0x00);
        raw[2] = 0x40;
        assert!(matches!(
            decode_core_message(&raw),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_decode_bad_crc_is_invalid() {
        let mut raw = encode_message(0x00);
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        assert!(matches!(
            decode_core_message(&raw),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut raw = encode_message(0x05);
        raw.extend_from_slice(&[0xEE; 16]);
        let msg = decode_core_message(&raw).unwrap();
        assert_eq!(msg.status(), Some(CoreStatus::InvalidMemoryRange));
    }
}
