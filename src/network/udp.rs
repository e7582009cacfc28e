use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Transport;
use crate::core::{Error, Result};
use crate::util::hex;

/// Broadcast-capable UDP endpoint
#[derive(Debug)]
pub struct UdpTransport {
    /// Bound socket, taken on close
    socket: Mutex<Option<Arc<UdpSocket>>>,
    /// Cancels receives still waiting when the transport closes
    shutdown: CancellationToken,
    /// Address the socket is bound to
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Binds a broadcast-enabled socket to `bind_addr`.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self> {
        let domain = if bind_addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.bind(&bind_addr.into())?;
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;
        let local_addr = socket.local_addr()?;
        info!(%local_addr, "Smart-Bus endpoint bound");

        Ok(UdpTransport {
            socket: Mutex::new(Some(Arc::new(socket))),
            shutdown: CancellationToken::new(),
            local_addr,
        })
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn socket(&self) -> Result<Arc<UdpSocket>> {
        self.socket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(Error::Closed)
    }
}

impl Transport for UdpTransport {
    async fn send(&self, data: &[u8], dest: SocketAddr) -> Result<()> {
        let socket = self.socket()?;
        socket.send_to(data, dest).await?;
        debug!(%dest, bytes = %hex(data), "sent datagram");
        Ok(())
    }

    async fn receive(&self, buf: &mut [u8], timeout: Duration) -> Result<(usize, SocketAddr)> {
        let socket = self.socket()?;
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(Error::Closed),
            received = tokio::time::timeout(timeout, socket.recv_from(buf)) => match received {
                Ok(Ok((len, source))) => Ok((len, source)),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(Error::Timeout),
            },
        }
    }

    fn close(&self) {
        let socket = self
            .socket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if socket.is_some() {
            self.shutdown.cancel();
            info!(local_addr = %self.local_addr, "Smart-Bus endpoint closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.socket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
