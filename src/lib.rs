//! Smart-Bus G4: relay and dimmer control over UDP broadcast
//!
//! This library encodes CRC-sealed Smart-Bus G4 telegrams, broadcasts them
//! on the local segment and polls relay modules for their channel levels.
//! The entity layer of a home-automation platform talks to [`SmartBus`].
pub mod bus;
pub mod core;
pub mod network;
pub mod polling;
pub mod protocol;
mod util;

// Re-export commonly used items
pub use crate::bus::SmartBus;
pub use crate::core::{ChannelState, Config, DeviceAddress, Error, Result, ValidationError};
pub use crate::protocol::{Command, CommandKind, ResponseFrame, Telegram};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
