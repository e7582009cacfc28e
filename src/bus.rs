//! Command and state interface consumed by the entity layer.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::{debug, warn};

use crate::core::{ChannelState, Config, DeviceAddress, Error, Result};
use crate::network::{Transport, UdpTransport};
use crate::polling::{PollingCycle, PollingHandle, StateStore};
use crate::protocol::{Command, Preamble, ResponseFrame, TelegramCodec, OFF_LEVEL, ON_LEVEL};
use crate::util::hex;

/// Smart-Bus G4 endpoint: issues commands and serves the last known state
pub struct SmartBus<T: Transport = UdpTransport> {
    transport: Arc<T>,
    store: Arc<StateStore>,
    codec: TelegramCodec,
    config: Config,
}

impl SmartBus<UdpTransport> {
    /// Validates `config` and binds a UDP endpoint for it
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = UdpTransport::bind(config.bind_addr).await?;
        Ok(SmartBus::new(Arc::new(transport), config))
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }
}

impl<T: Transport> SmartBus<T> {
    /// Creates a bus over an already opened transport
    pub fn new(transport: Arc<T>, config: Config) -> Self {
        SmartBus {
            transport,
            store: Arc::new(StateStore::new()),
            codec: TelegramCodec::with_preamble(Preamble::with_source_ip(config.source_ip)),
            config,
        }
    }

    /// Sets `channel` of `address` to `level`.
    ///
    /// Out-of-range fields fail with `Error::InvalidField` before anything is
    /// sent. The cached status of the device is dropped until the next poll.
    pub async fn set_relay<L>(&self, address: DeviceAddress, channel: L, level: L) -> Result<()>
    where
        L: TryInto<u8> + Into<i64> + Copy,
    {
        let command = Command::set_relay(address, channel, level)?;
        self.send(command).await?;
        self.store.invalidate(address);
        Ok(())
    }

    /// Switches `channel` fully on
    pub async fn turn_on(&self, address: DeviceAddress, channel: u8) -> Result<()> {
        self.set_relay(address, channel, ON_LEVEL).await
    }

    /// Switches `channel` off
    pub async fn turn_off(&self, address: DeviceAddress, channel: u8) -> Result<()> {
        self.set_relay(address, channel, OFF_LEVEL).await
    }

    /// Broadcasts a status request; the polling cycle picks up the answer.
    ///
    /// The device is tracked from now on and polled on every request tick.
    pub async fn request_status(&self, address: DeviceAddress) -> Result<()> {
        self.store.register(address);
        self.send(Command::read_relay_status(address)).await?;
        self.store.begin_request(address);
        Ok(())
    }

    /// State of `channel` from the last valid status response, if any
    pub fn read_last_known_state(&self, address: DeviceAddress, channel: u8) -> Option<ChannelState> {
        self.store.channel_state(address, channel)
    }

    /// Last valid status response from `address`
    pub fn last_frame(&self, address: DeviceAddress) -> Option<ResponseFrame> {
        self.store.frame(address)
    }

    /// Starts polling `devices` on a background task sharing this transport
    pub fn spawn_polling(&self, devices: impl IntoIterator<Item = DeviceAddress>) -> PollingHandle {
        PollingCycle::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            &self.config,
            devices,
        )
        .spawn()
    }

    /// Shared device state, also updated by the polling task
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Closes the transport; calling it again is a no-op
    pub fn close(&self) {
        self.transport.close();
    }

    /// Whether the transport has been closed
    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Only `Error::Closed` reaches the caller; other send failures are logged.
    async fn send(&self, command: Command) -> Result<()> {
        let mut buf = BytesMut::new();
        self.codec.clone().encode(command, &mut buf)?;

        match self.transport.send(&buf, self.config.broadcast_addr).await {
            Ok(()) => {
                debug!(address = %command.address(), kind = ?command.kind(), bytes = %hex(&buf), "telegram sent");
                Ok(())
            }
            Err(Error::Closed) => Err(Error::Closed),
            Err(e) => {
                warn!(address = %command.address(), error = %e, "telegram send failed");
                Ok(())
            }
        }
    }
}
