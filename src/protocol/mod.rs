//! Smart-Bus G4 protocol implementation
//!
//! This module defines the telegram layouts, the CRC-16 checksum and the
//! codec that turns commands into datagrams and datagrams into validated
//! response frames.

pub mod checksum;
pub mod codec;
pub mod message;

pub use self::checksum::checksum;
pub use self::codec::{decode, encode, TelegramCodec};
pub use self::message::{Command, CommandKind, CommandLayout, Preamble, ResponseFrame, Telegram};

/// Length of the fixed datagram preamble
pub const PREAMBLE_LEN: usize = 16;

/// Length of the trailing checksum
pub const CHECKSUM_LEN: usize = 2;

/// Total length of a relay status response
pub const STATUS_RESPONSE_LEN: usize = 43;

/// Total length of a single channel control response
pub const SET_RELAY_RESPONSE_LEN: usize = 30;

/// Offset of the responding device's subnet id
pub const RESPONSE_SUBNET_OFFSET: usize = 17;

/// Offset of the responding device's device id
pub const RESPONSE_DEVICE_OFFSET: usize = 18;

/// Offset of the big-endian response opcode
pub const RESPONSE_OPCODE_OFFSET: usize = 21;

/// Offset of the first content byte; channel levels in status responses
pub const CHANNEL_DATA_OFFSET: usize = 25;

/// Level sent by a plain "on" command
pub const ON_LEVEL: u8 = 100;

/// Level sent by an "off" command
pub const OFF_LEVEL: u8 = 0;

/// Converts a 0-255 brightness into the 0-100 level dimmers expect
pub fn level_from_brightness(brightness: u8) -> u8 {
    (brightness as u16 * 100 / 255) as u8
}
