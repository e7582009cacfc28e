use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{byte_field, Error, Result};

/// Identifies one physical node on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceAddress {
    /// Subnet id (first addressing level)
    pub subnet: u8,
    /// Device id within the subnet
    pub device: u8,
}

impl DeviceAddress {
    /// Creates a new device address
    pub const fn new(subnet: u8, device: u8) -> Self {
        DeviceAddress { subnet, device }
    }

    /// Creates an address from wider integers, rejecting values outside a byte
    pub fn try_new<T>(subnet: T, device: T) -> Result<Self>
    where
        T: TryInto<u8> + Into<i64> + Copy,
    {
        Ok(DeviceAddress {
            subnet: byte_field("subnet", subnet)?,
            device: byte_field("device", device)?,
        })
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.subnet, self.device)
    }
}

/// Last known state of one relay/dimmer channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    /// Whether the output is energised
    pub on: bool,
    /// Raw level byte reported by the device
    pub level: u8,
}

impl ChannelState {
    /// Derives the state from a reported level byte
    pub fn from_level(level: u8) -> Self {
        ChannelState {
            on: level != 0,
            level,
        }
    }
}

/// Configuration for the Smart-Bus G4 endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Local address to bind to
    pub bind_addr: SocketAddr,
    /// Destination for every outbound telegram
    pub broadcast_addr: SocketAddr,
    /// Source address embedded in the telegram preamble
    pub source_ip: Ipv4Addr,
    /// Interval between status requests
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub request_interval: Duration,
    /// Interval between response drains
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub drain_interval: Duration,
    /// Upper bound a single drain waits for a datagram
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub receive_timeout: Duration,
    /// Receive buffer size in bytes
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], super::DEFAULT_PORT)),
            broadcast_addr: SocketAddr::from(([255, 255, 255, 255], super::DEFAULT_PORT)),
            source_ip: super::DEFAULT_SOURCE_IP,
            request_interval: Duration::from_secs(12),
            drain_interval: Duration::from_secs(1),
            receive_timeout: Duration::from_millis(200),
            recv_buffer_size: super::MAX_PACKET_SIZE,
        }
    }
}

impl Config {
    /// Checks the configuration for values the polling cycle cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.request_interval.is_zero() || self.drain_interval.is_zero() {
            return Err(Error::config("polling intervals must be non-zero"));
        }
        if self.receive_timeout.is_zero() || self.receive_timeout >= self.drain_interval {
            return Err(Error::config(format!(
                "receive timeout {:?} must be non-zero and shorter than the drain interval {:?}",
                self.receive_timeout, self.drain_interval
            )));
        }
        if self.recv_buffer_size < crate::protocol::STATUS_RESPONSE_LEN {
            return Err(Error::config(format!(
                "receive buffer of {} bytes cannot hold a {}-byte status response",
                self.recv_buffer_size,
                crate::protocol::STATUS_RESPONSE_LEN
            )));
        }
        if self.broadcast_addr.port() == 0 {
            return Err(Error::config("broadcast port must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_address() {
        let addr = DeviceAddress::new(1, 27);
        assert_eq!(addr.to_string(), "1.27");
        assert_eq!(DeviceAddress::try_new(1u32, 27u32).unwrap(), addr);
        assert!(matches!(
            DeviceAddress::try_new(1u32, 256u32),
            Err(Error::InvalidField { field: "device", .. })
        ));
    }

    #[test]
    fn test_channel_state() {
        assert_eq!(ChannelState::from_level(0), ChannelState { on: false, level: 0 });
        assert_eq!(ChannelState::from_level(80), ChannelState { on: true, level: 80 });
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.bind_addr.port(), 6000);
        assert_eq!(config.broadcast_addr.port(), 6000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = Config {
            receive_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config {
            recv_buffer_size: 42,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config {
            request_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
