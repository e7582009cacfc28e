use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Encoder;

use super::checksum::checksum;
use super::message::{Command, CommandKind, Preamble, ResponseFrame, Telegram};
use super::{CHECKSUM_LEN, PREAMBLE_LEN, RESPONSE_OPCODE_OFFSET};
use crate::core::{DeviceAddress, Error, ValidationError};

/// Longest command payload (single channel control)
const MAX_PAYLOAD_LEN: usize = 13;

/// Builds telegrams for commands under a fixed preamble
#[derive(Debug, Clone, Default)]
pub struct TelegramCodec {
    preamble: Preamble,
}

impl TelegramCodec {
    /// Creates a codec using the default preamble
    pub fn new() -> Self {
        TelegramCodec::default()
    }

    /// Creates a codec announcing a custom preamble
    pub fn with_preamble(preamble: Preamble) -> Self {
        TelegramCodec { preamble }
    }

    /// The preamble opening every telegram from this codec
    pub fn preamble(&self) -> &Preamble {
        &self.preamble
    }

    /// Encodes `command` into a standalone telegram
    pub fn telegram(&self, command: &Command) -> Telegram {
        let layout = command.kind().layout();
        let mut dst = BytesMut::with_capacity(PREAMBLE_LEN + layout.payload_len + CHECKSUM_LEN);
        self.write(command, &mut dst);
        Telegram::new(command.kind(), command.address(), dst.freeze())
    }

    fn write(&self, command: &Command, dst: &mut BytesMut) {
        let layout = command.kind().layout();

        // Fresh buffer per call; trailing bytes stay zero (reserved)
        let mut payload = [0u8; MAX_PAYLOAD_LEN];
        payload[..layout.header.len()].copy_from_slice(&layout.header);
        let fields = &mut payload[layout.header.len()..];
        match *command {
            Command::SetRelay {
                address,
                channel,
                level,
            } => {
                fields[0] = address.subnet;
                fields[1] = address.device;
                fields[2] = channel;
                fields[3] = level;
            }
            Command::ReadRelayStatus { address } => {
                fields[0] = address.subnet;
                fields[1] = address.device;
            }
        }
        let payload = &payload[..layout.payload_len];

        dst.reserve(PREAMBLE_LEN + payload.len() + CHECKSUM_LEN);
        dst.put_slice(self.preamble.as_bytes());
        dst.put_slice(payload);
        dst.put_u16(checksum(payload));
    }
}

impl Encoder<Command> for TelegramCodec {
    type Error = Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.write(&item, dst);
        Ok(())
    }
}

/// Encodes `command` with the default preamble
pub fn encode(command: &Command) -> Telegram {
    TelegramCodec::new().telegram(command)
}

/// Validates `raw` as the response to a `kind` request sent to `address`.
///
/// Checks run in order and stop at the first failure: total length,
/// response opcode, responding address.
pub fn decode(
    raw: &[u8],
    kind: CommandKind,
    address: DeviceAddress,
) -> Result<ResponseFrame, ValidationError> {
    let frame = parse(raw, kind)?;
    if frame.address() != address {
        return Err(ValidationError::Address {
            expected: address,
            actual: frame.address(),
        });
    }
    Ok(frame)
}

fn parse(raw: &[u8], kind: CommandKind) -> Result<ResponseFrame, ValidationError> {
    let layout = kind.layout();
    if raw.len() != layout.response_len {
        return Err(ValidationError::Length {
            expected: layout.response_len,
            actual: raw.len(),
        });
    }

    let opcode = u16::from_be_bytes([raw[RESPONSE_OPCODE_OFFSET], raw[RESPONSE_OPCODE_OFFSET + 1]]);
    if opcode != layout.response_opcode {
        return Err(ValidationError::Opcode {
            expected: layout.response_opcode,
            actual: opcode,
        });
    }

    Ok(ResponseFrame::new(kind, Bytes::copy_from_slice(raw)))
}
