//! Network transport module
//!
//! This module abstracts the broadcast datagram endpoint the polling cycle
//! and the bus interface share. `UdpTransport` is the production
//! implementation; tests drive the same code through `MockTransport`.

#[cfg(test)]
pub mod mock;
mod udp;

#[cfg(test)]
pub use self::mock::MockTransport;
pub use self::udp::UdpTransport;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use crate::core::Result;

/// Datagram endpoint shared between the polling timers and command callers.
///
/// All methods take `&self` so one instance can be shared through an `Arc`;
/// implementations serialise their own internal state.
pub trait Transport: Send + Sync + 'static {
    /// Sends one datagram without waiting for any acknowledgment.
    ///
    /// Fails with `Error::Closed` once the transport has been closed.
    fn send(&self, data: &[u8], dest: SocketAddr) -> impl Future<Output = Result<()>> + Send;

    /// Waits up to `timeout` for one datagram.
    ///
    /// Returns `Error::Timeout` when the window elapses and `Error::Closed`
    /// when the transport is closed before or during the wait.
    fn receive(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<(usize, SocketAddr)>> + Send;

    /// Releases the endpoint. Closing twice is a no-op.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
