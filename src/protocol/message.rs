use std::fmt;
use std::net::Ipv4Addr;

use bytes::Bytes;

use super::checksum::checksum;
use super::{
    CHANNEL_DATA_OFFSET, CHECKSUM_LEN, PREAMBLE_LEN, RESPONSE_DEVICE_OFFSET,
    RESPONSE_OPCODE_OFFSET, RESPONSE_SUBNET_OFFSET, SET_RELAY_RESPONSE_LEN,
    STATUS_RESPONSE_LEN,
};
use crate::core::{byte_field, ChannelState, DeviceAddress, Result};

/// Commands understood by relay and dimmer modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Single channel control (opcode 0x0031)
    SetRelay,
    /// Read status of all channels (opcode 0x0033)
    ReadRelayStatus,
}

/// Fixed frame layout of one command kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLayout {
    /// Payload bytes covered by the checksum
    pub payload_len: usize,
    /// Leading payload bytes: length marker, address filler and opcode
    pub header: [u8; 7],
    /// Request opcode
    pub opcode: u16,
    /// Opcode the device answers with
    pub response_opcode: u16,
    /// Total length of the answering datagram
    pub response_len: usize,
}

const SET_RELAY_LAYOUT: CommandLayout = CommandLayout {
    payload_len: 13,
    header: [0x0F, 0xEE, 0xEE, 0xEE, 0xEE, 0x00, 0x31],
    opcode: 0x0031,
    response_opcode: 0x0032,
    response_len: SET_RELAY_RESPONSE_LEN,
};

const READ_RELAY_STATUS_LAYOUT: CommandLayout = CommandLayout {
    payload_len: 9,
    header: [0x0B, 0xEE, 0xEE, 0xEE, 0xEE, 0x00, 0x33],
    opcode: 0x0033,
    response_opcode: 0x0034,
    response_len: STATUS_RESPONSE_LEN,
};

impl CommandKind {
    /// Returns the frame layout for this command
    pub const fn layout(self) -> &'static CommandLayout {
        match self {
            CommandKind::SetRelay => &SET_RELAY_LAYOUT,
            CommandKind::ReadRelayStatus => &READ_RELAY_STATUS_LAYOUT,
        }
    }
}

/// The 16 bytes that open every datagram: source IPv4, `SMARTCLOUD`, `AA AA`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble([u8; PREAMBLE_LEN]);

impl Preamble {
    /// Builds the preamble announcing `source` as the sender
    pub fn with_source_ip(source: Ipv4Addr) -> Self {
        let mut bytes = [0u8; PREAMBLE_LEN];
        bytes[..4].copy_from_slice(&source.octets());
        bytes[4..14].copy_from_slice(b"SMARTCLOUD");
        bytes[14..].copy_from_slice(&[0xAA, 0xAA]);
        Preamble(bytes)
    }

    /// Raw preamble bytes
    pub fn as_bytes(&self) -> &[u8; PREAMBLE_LEN] {
        &self.0
    }
}

impl Default for Preamble {
    fn default() -> Self {
        Preamble::with_source_ip(crate::core::DEFAULT_SOURCE_IP)
    }
}

/// A logical command before encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetRelay {
        address: DeviceAddress,
        channel: u8,
        level: u8,
    },
    ReadRelayStatus {
        address: DeviceAddress,
    },
}

impl Command {
    /// Builds a channel control command, rejecting fields wider than a byte
    pub fn set_relay<T>(address: DeviceAddress, channel: T, level: T) -> Result<Self>
    where
        T: TryInto<u8> + Into<i64> + Copy,
    {
        Ok(Command::SetRelay {
            address,
            channel: byte_field("channel", channel)?,
            level: byte_field("level", level)?,
        })
    }

    /// Builds a status request for every channel of `address`
    pub fn read_relay_status(address: DeviceAddress) -> Self {
        Command::ReadRelayStatus { address }
    }

    /// Kind of this command
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::SetRelay { .. } => CommandKind::SetRelay,
            Command::ReadRelayStatus { .. } => CommandKind::ReadRelayStatus,
        }
    }

    /// Target device
    pub fn address(&self) -> DeviceAddress {
        match *self {
            Command::SetRelay { address, .. } | Command::ReadRelayStatus { address } => address,
        }
    }
}

/// One encoded outbound frame
#[derive(Clone, PartialEq, Eq)]
pub struct Telegram {
    kind: CommandKind,
    address: DeviceAddress,
    bytes: Bytes,
}

impl Telegram {
    pub(crate) fn new(kind: CommandKind, address: DeviceAddress, bytes: Bytes) -> Self {
        Telegram {
            kind,
            address,
            bytes,
        }
    }

    /// Kind of the encoded command
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Target device of the encoded command
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// The complete datagram
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The command-specific bytes covered by the checksum
    pub fn payload(&self) -> &[u8] {
        &self.bytes[PREAMBLE_LEN..self.bytes.len() - CHECKSUM_LEN]
    }

    /// The checksum embedded at the end of the frame
    pub fn checksum(&self) -> u16 {
        let n = self.bytes.len();
        u16::from_be_bytes([self.bytes[n - 2], self.bytes[n - 1]])
    }

    /// Whether the embedded checksum matches the payload
    pub fn checksum_is_valid(&self) -> bool {
        checksum(self.payload()) == self.checksum()
    }

    /// Datagram length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telegram")
            .field("kind", &self.kind)
            .field("address", &self.address)
            .field("bytes", &crate::util::hex(&self.bytes))
            .finish()
    }
}

/// A validated response datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    kind: CommandKind,
    address: DeviceAddress,
    opcode: u16,
    raw: Bytes,
}

impl ResponseFrame {
    pub(crate) fn new(kind: CommandKind, raw: Bytes) -> Self {
        let address = DeviceAddress::new(raw[RESPONSE_SUBNET_OFFSET], raw[RESPONSE_DEVICE_OFFSET]);
        let opcode = u16::from_be_bytes([
            raw[RESPONSE_OPCODE_OFFSET],
            raw[RESPONSE_OPCODE_OFFSET + 1],
        ]);
        ResponseFrame {
            kind,
            address,
            opcode,
            raw,
        }
    }

    /// The request kind this frame answers
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// The device that sent the frame
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Response opcode read from the frame
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Content bytes between the header and the trailing checksum.
    ///
    /// For status responses these are the per-channel levels, channel 0 first.
    pub fn levels(&self) -> &[u8] {
        &self.raw[CHANNEL_DATA_OFFSET..self.raw.len() - CHECKSUM_LEN]
    }

    /// Level byte reported for `channel`
    pub fn level(&self, channel: u8) -> Option<u8> {
        match self.kind {
            CommandKind::ReadRelayStatus => self.levels().get(channel as usize).copied(),
            // channel, 0xF8 success marker, level
            CommandKind::SetRelay => match self.levels() {
                [ch, _, level, ..] if *ch == channel => Some(*level),
                _ => None,
            },
        }
    }

    /// On/off state and level of `channel`, if the frame reports it
    pub fn channel_state(&self, channel: u8) -> Option<ChannelState> {
        self.level(channel).map(ChannelState::from_level)
    }

    /// Whether the trailing checksum matches the frame body.
    ///
    /// Gateways in the field do not always fill it in, so decoding never requires it.
    pub fn checksum_matches(&self) -> bool {
        let n = self.raw.len();
        let body = &self.raw[PREAMBLE_LEN..n - CHECKSUM_LEN];
        checksum(body) == u16::from_be_bytes([self.raw[n - 2], self.raw[n - 1]])
    }

    /// The frame as received
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}
