//! BSL command API.
//!
//! One method per bootloader command. Each call encodes the request, runs a
//! single exchange over the transport with the response length the command
//! produces, checks the link acknowledgement, then decodes and classifies the
//! core response where the command has one.

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, trace};

use crate::device::DeviceInfo;
use crate::error::{Error, Result};
use crate::protocol::command::{BaudRate, Command, Password};
use crate::protocol::frame::{CoreMessage, decode_ack};
use crate::protocol::response::{ResponseKind, check_ack};
use crate::transport::{Transport, TransportKind};

/// Bootloader session over a transport.
pub struct Bsl<T: Transport> {
    transport: T,
}

impl<T: Transport> Bsl<T> {
    /// Create a session on an opened transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Run one exchange and check the acknowledgement byte.
    fn transact(&mut self, cmd: &Command) -> Result<Vec<u8>> {
        let request = cmd.encode()?;
        debug!("{cmd}");
        trace!("TX [{}] {}", request.len(), hex::encode(&request));

        let rx = self.transport.exchange(&request, cmd.response_len())?;
        trace!("RX [{}] {}", rx.len(), hex::encode(&rx));

        check_ack(decode_ack(&rx)?)?;
        Ok(rx)
    }

    /// Exchange a command answered by a plain status message.
    fn status_command(&mut self, cmd: &Command) -> Result<()> {
        let rx = self.transact(cmd)?;
        let msg = CoreMessage::decode(&rx)?;
        match msg.kind {
            ResponseKind::Message => status_of(&msg),
            ResponseKind::DetailedError => Err(Error::DetailedError(msg.data)),
            other => Err(Error::UnexpectedResponse {
                expected: ResponseKind::Message,
                actual: other.code(),
            }),
        }
    }

    /// Exchange a command answered with a typed data response.
    fn data_command(&mut self, cmd: &Command, expected: ResponseKind) -> Result<Vec<u8>> {
        let rx = self.transact(cmd)?;
        let msg = CoreMessage::decode(&rx)?;
        trace!("{} response: {}", cmd.name(), msg.kind);
        match msg.kind {
            kind if kind == expected => Ok(msg.data),
            ResponseKind::Message => {
                // A refused command is answered by a message instead of data
                status_of(&msg)?;
                Err(Error::UnexpectedResponse {
                    expected,
                    actual: msg.kind.code(),
                })
            },
            ResponseKind::DetailedError => Err(Error::DetailedError(msg.data)),
            other => Err(Error::UnexpectedResponse {
                expected,
                actual: other.code(),
            }),
        }
    }

    /// Establish the connection. Answered by the acknowledgement only.
    pub fn connect(&mut self) -> Result<()> {
        self.transact(&Command::Connect)?;
        Ok(())
    }

    /// Read the bootloader version and buffer information.
    pub fn get_device_info(&mut self) -> Result<DeviceInfo> {
        let data = self.data_command(&Command::GetDeviceInfo, ResponseKind::DeviceInfo)?;
        DeviceInfo::parse(&data)
    }

    /// Unlock the protected commands.
    pub fn unlock(&mut self, password: &Password) -> Result<()> {
        self.status_command(&Command::Unlock {
            password: *password,
        })
    }

    /// Erase the main flash. The bootloader must be unlocked.
    pub fn mass_erase(&mut self) -> Result<()> {
        self.status_command(&Command::MassErase)
    }

    /// Program up to 256 bytes at `address`.
    pub fn program_data(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let cmd = Command::program_data(address, data)?;
        self.status_command(&cmd)
    }

    /// Read `count` bytes of target memory starting at `address`.
    pub fn read_back(&mut self, address: u32, count: u32) -> Result<Vec<u8>> {
        let cmd = Command::memory_read_back(address, count)?;
        let data = self.data_command(&cmd, ResponseKind::MemoryReadBack)?;
        if data.len() != count as usize {
            return Err(Error::InvalidFrame(format!(
                "read back returned {} bytes, requested {count}",
                data.len()
            )));
        }
        Ok(data)
    }

    /// CRC32 of `length` bytes at `address`, computed by the device.
    pub fn verify(&mut self, address: u32, length: u32) -> Result<u32> {
        let cmd = Command::StandaloneVerification { address, length };
        let data = self.data_command(&cmd, ResponseKind::StandaloneVerification)?;
        let mut cursor = data.as_slice();
        cursor.read_u32::<LittleEndian>().map_err(|_| {
            Error::InvalidFrame(format!("verification response has {} data bytes", data.len()))
        })
    }

    /// Leave the bootloader and start the application.
    pub fn start_application(&mut self) -> Result<()> {
        self.transact(&Command::StartApplication)?;
        Ok(())
    }

    /// Switch the UART to `rate`.
    ///
    /// The command is sent at the current rate and the local port is only
    /// reconfigured after the bootloader acknowledged it.
    pub fn change_baud_rate(&mut self, rate: BaudRate) -> Result<()> {
        if self.transport.kind() == TransportKind::Bus {
            return Err(Error::Unsupported(
                "baud rate change on an I2C interface".into(),
            ));
        }

        self.transact(&Command::ChangeBaudRate { rate })?;
        self.transport.set_baud_rate(rate.bps())?;
        debug!("Link switched to {rate} baud");
        Ok(())
    }
}

fn status_of(msg: &CoreMessage) -> Result<()> {
    msg.status()
        .ok_or_else(|| Error::InvalidFrame("message response without status".into()))?
        .into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::protocol::command::commands;
    use crate::protocol::crc::crc32;
    use crate::protocol::frame::{decode, encode_message, encode_response};
    use crate::protocol::response::{CoreStatus, NackCode};
    use crate::transport::mock::MockTransport;

    fn info_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0001u16.to_le_bytes());
        data.extend_from_slice(&0x0203u16.to_le_bytes());
        data.extend_from_slice(&0x0405_0607u32.to_le_bytes());
        data.extend_from_slice(&0x0001u16.to_le_bytes());
        data.extend_from_slice(&0x0600u16.to_le_bytes());
        data.extend_from_slice(&0x2000_0160u32.to_le_bytes());
        data.extend_from_slice(&0x0000_0001u32.to_le_bytes());
        data.extend_from_slice(&0x0000_0002u32.to_le_bytes());
        data
    }

    #[test]
    fn test_connect_sends_connection_frame() {
        let mut mock = MockTransport::link();
        mock.respond([0x00]);
        let mut bsl = Bsl::new(mock);

        bsl.connect().unwrap();

        let mock = bsl.into_inner();
        assert_eq!(mock.response_lens, [1]);
        let frame = decode(&mock.requests[0]).unwrap();
        assert_eq!(frame.command_id, commands::CONNECTION);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_connect_and_info_are_idempotent() {
        let mut mock = MockTransport::bus();
        for _ in 0..3 {
            mock.respond([0x00]);
            mock.respond(encode_response(0x31, &info_bytes()));
        }
        let mut bsl = Bsl::new(mock);

        let mut seen = Vec::new();
        for _ in 0..3 {
            bsl.connect().unwrap();
            seen.push(bsl.get_device_info().unwrap());
        }
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(seen[0].max_buffer_size, 0x0600);

        let mock = bsl.into_inner();
        assert_eq!(mock.requests[0], mock.requests[2]);
        assert_eq!(mock.requests[1], mock.requests[3]);
        assert_eq!(mock.response_lens[1], 33);
    }

    #[test]
    fn test_nack_is_reported_before_core_parsing() {
        let mut mock = MockTransport::link();
        mock.respond([0x52]);
        let mut bsl = Bsl::new(mock);

        assert!(matches!(
            bsl.mass_erase(),
            Err(Error::Nack(NackCode::ChecksumIncorrect))
        ));
    }

    #[test]
    fn test_core_status_failure() {
        let mut mock = MockTransport::link();
        mock.respond(encode_message(0x01));
        let mut bsl = Bsl::new(mock);

        assert!(matches!(
            bsl.mass_erase(),
            Err(Error::Core(CoreStatus::Locked))
        ));
    }

    #[test]
    fn test_transport_failure_stays_transport() {
        let mut mock = MockTransport::link();
        mock.fail(TransportError::Timeout {
            expected: 10,
            received: 3,
        });
        let mut bsl = Bsl::new(mock);

        let err = bsl.unlock(&Password::default()).unwrap_err();
        assert!(err.is_transport());
        assert!(!err.is_device_rejection());
    }

    #[test]
    fn test_unlock_sends_password() {
        let mut mock = MockTransport::link();
        mock.respond(encode_message(0x00));
        let mut bsl = Bsl::new(mock);

        bsl.unlock(&Password::default()).unwrap();
        let mock = bsl.into_inner();
        let frame = decode(&mock.requests[0]).unwrap();
        assert_eq!(frame.command_id, commands::UNLOCK_BOOTLOADER);
        assert_eq!(frame.payload, [0xFF; 32]);
        assert_eq!(mock.response_lens, [10]);
    }

    #[test]
    fn test_unlock_wrong_password() {
        let mut mock = MockTransport::link();
        mock.respond(encode_message(0x02));
        let mut bsl = Bsl::new(mock);

        assert!(matches!(
            bsl.unlock(&Password::new([0x11; 32])),
            Err(Error::Core(CoreStatus::PasswordError))
        ));
    }

    #[test]
    fn test_program_data_request() {
        let mut mock = MockTransport::link();
        mock.respond(encode_message(0x00));
        let mut bsl = Bsl::new(mock);

        bsl.program_data(0, &[0x01, 0x02, 0x03, 0x04]).unwrap();

        let mock = bsl.into_inner();
        let mut expected = vec![
            0x80, 0x09, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04,
        ];
        expected.extend_from_slice(&crc32(&expected[3..]).to_le_bytes());
        assert_eq!(mock.requests[0], expected);
    }

    #[test]
    fn test_program_data_too_large_sends_nothing() {
        let mut bsl = Bsl::new(MockTransport::link());

        assert!(matches!(
            bsl.program_data(0, &[0u8; 257]),
            Err(Error::PayloadTooLarge { .. })
        ));
        assert!(bsl.transport().requests.is_empty());
    }

    #[test]
    fn test_program_data_misaligned() {
        let mut mock = MockTransport::bus();
        mock.respond(encode_message(0x0a));
        let mut bsl = Bsl::new(mock);

        assert!(matches!(
            bsl.program_data(0x3, &[0xAA; 8]),
            Err(Error::Core(CoreStatus::InvalidAddress))
        ));
    }

    #[test]
    fn test_read_back_returns_data() {
        let data: Vec<u8> = (0..64u8).collect();
        let mut mock = MockTransport::link();
        mock.respond(encode_response(0x30, &data));
        let mut bsl = Bsl::new(mock);

        assert_eq!(bsl.read_back(0x0000_1000, 64).unwrap(), data);
        assert_eq!(bsl.transport().response_lens, [73]);
    }

    #[test]
    fn test_read_back_refused_with_message() {
        let mut mock = MockTransport::bus();
        let mut raw = encode_message(0x09);
        raw.resize(9 + 16, 0x00);
        mock.respond(raw);
        let mut bsl = Bsl::new(mock);

        assert!(matches!(
            bsl.read_back(0, 16),
            Err(Error::Core(CoreStatus::ReadOutDisabled))
        ));
    }

    #[test]
    fn test_read_back_short_data_is_invalid() {
        let mut mock = MockTransport::link();
        mock.respond(encode_response(0x30, &[0x01, 0x02]));
        let mut bsl = Bsl::new(mock);

        assert!(matches!(
            bsl.read_back(0, 4),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_verify_returns_device_crc() {
        let mut mock = MockTransport::link();
        mock.respond(encode_response(0x32, &0x1234_5678u32.to_le_bytes()));
        let mut bsl = Bsl::new(mock);

        assert_eq!(bsl.verify(0, 2048).unwrap(), 0x1234_5678);
        let mock = bsl.into_inner();
        let frame = decode(&mock.requests[0]).unwrap();
        assert_eq!(frame.command_id, commands::STANDALONE_VERIFICATION);
        assert_eq!(&frame.payload[4..], &2048u32.to_le_bytes());
        assert_eq!(mock.response_lens, [13]);
    }

    #[test]
    fn test_verify_length_error() {
        let mut mock = MockTransport::link();
        let mut raw = encode_message(0x0b);
        raw.resize(13, 0x00);
        mock.respond(raw);
        let mut bsl = Bsl::new(mock);

        assert!(matches!(
            bsl.verify(0, 512),
            Err(Error::Core(CoreStatus::InvalidLength))
        ));
    }

    #[test]
    fn test_detailed_error_response() {
        let mut mock = MockTransport::link();
        let mut raw = encode_response(0x3a, &[0xDE, 0xAD]);
        raw.resize(33, 0x00);
        mock.respond(raw);
        let mut bsl = Bsl::new(mock);

        match bsl.get_device_info() {
            Err(Error::DetailedError(data)) => assert_eq!(data, [0xDE, 0xAD]),
            other => panic!("expected detailed error, got {other:?}"),
        }
    }

    #[test]
    fn test_success_message_in_place_of_data() {
        let mut mock = MockTransport::link();
        let mut raw = encode_message(0x00);
        raw.resize(13, 0x00);
        mock.respond(raw);
        let mut bsl = Bsl::new(mock);

        assert!(matches!(
            bsl.verify(0, 1024),
            Err(Error::UnexpectedResponse {
                expected: ResponseKind::StandaloneVerification,
                actual: 0x3b
            })
        ));
    }

    #[test]
    fn test_corrupt_core_response() {
        let mut mock = MockTransport::link();
        let mut raw = encode_message(0x00);
        raw[6] ^= 0x01;
        mock.respond(raw);
        let mut bsl = Bsl::new(mock);

        assert!(matches!(bsl.mass_erase(), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_start_application() {
        let mut mock = MockTransport::link();
        mock.respond([0x00]);
        let mut bsl = Bsl::new(mock);

        bsl.start_application().unwrap();
        assert_eq!(bsl.transport().command_ids(), [commands::START_APPLICATION]);
        assert_eq!(bsl.transport().response_lens, [1]);
    }

    #[test]
    fn test_change_baud_rate_order() {
        let mut mock = MockTransport::link();
        mock.respond([0x00]);
        let mut bsl = Bsl::new(mock);

        bsl.change_baud_rate(BaudRate::B115200).unwrap();
        let mock = bsl.into_inner();
        assert_eq!(mock.command_ids(), [commands::CHANGE_BAUD_RATE]);
        assert_eq!(mock.baud_changes, [115_200]);
    }

    #[test]
    fn test_change_baud_rate_nack_keeps_local_rate() {
        let mut mock = MockTransport::link();
        mock.respond([0x56]);
        let mut bsl = Bsl::new(mock);

        assert!(matches!(
            bsl.change_baud_rate(BaudRate::B1000000),
            Err(Error::Nack(NackCode::UnknownBaudRate))
        ));
        assert!(bsl.transport().baud_changes.is_empty());
    }

    #[test]
    fn test_change_baud_rate_on_bus_is_unsupported() {
        let mut bsl = Bsl::new(MockTransport::bus());

        assert!(matches!(
            bsl.change_baud_rate(BaudRate::B9600),
            Err(Error::Unsupported(_))
        ));
        assert!(bsl.transport().requests.is_empty());
        assert_eq!(bsl.transport().pending(), 0);
    }
}
