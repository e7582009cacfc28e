//! Core types for the Smart-Bus G4 integration
//!
//! Error taxonomy, device addressing, channel state and runtime configuration.

use std::net::Ipv4Addr;

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{byte_field, Error, Result, ValidationError};
pub use self::types::{ChannelState, Config, DeviceAddress};

/// UDP port used by Smart-Bus G4 gateways
pub const DEFAULT_PORT: u16 = 6000;

/// Source address embedded in the default preamble
pub const DEFAULT_SOURCE_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 222);

/// Maximum datagram size read from the socket
pub const MAX_PACKET_SIZE: usize = 1024;
