use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::store::{PollState, StateStore};
use crate::core::{Config, DeviceAddress, Error, Result};
use crate::network::Transport;
use crate::protocol::{decode, Command, CommandKind, Preamble, TelegramCodec};
use crate::util::hex;

/// Periodically requests relay status and folds valid responses into the store.
///
/// Two timers drive the cycle: the request timer broadcasts a status request
/// to every idle device, the faster drain timer reads responses. Responses
/// carry no request id, so they are matched by length, opcode and address
/// only; two requests in flight to the same device are never issued.
pub struct PollingCycle<T: Transport> {
    transport: Arc<T>,
    store: Arc<StateStore>,
    codec: TelegramCodec,
    broadcast_addr: SocketAddr,
    request_interval: Duration,
    drain_interval: Duration,
    receive_timeout: Duration,
    recv_buffer: Vec<u8>,
}

impl<T: Transport> PollingCycle<T> {
    /// Creates a cycle polling `devices` in addition to any already tracked by `store`
    pub fn new(
        transport: Arc<T>,
        store: Arc<StateStore>,
        config: &Config,
        devices: impl IntoIterator<Item = DeviceAddress>,
    ) -> Self {
        for address in devices {
            store.register(address);
        }

        PollingCycle {
            transport,
            store,
            codec: TelegramCodec::with_preamble(Preamble::with_source_ip(config.source_ip)),
            broadcast_addr: config.broadcast_addr,
            request_interval: config.request_interval,
            drain_interval: config.drain_interval,
            receive_timeout: config.receive_timeout,
            recv_buffer: vec![0u8; config.recv_buffer_size],
        }
    }

    /// Runs both timers until `shutdown` fires or a tick hits an
    /// unrecoverable error such as `Error::Closed`, then closes the transport.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let mut request_timer = interval(self.request_interval);
        request_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut drain_timer = interval(self.drain_interval);
        drain_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(devices = self.store.devices().len(), "polling cycle started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = request_timer.tick() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = self.request_tick() => {
                            if let Err(e) = result {
                                info!(error = %e, "polling cycle interrupted");
                                break;
                            }
                        }
                    }
                }

                _ = drain_timer.tick() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = self.drain_tick() => {
                            if let Err(e) = result {
                                info!(error = %e, "polling cycle interrupted");
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.transport.close();
        info!("polling cycle stopped");
        Ok(())
    }

    /// Moves the cycle onto a Tokio task
    pub fn spawn(mut self) -> PollingHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        PollingHandle { shutdown, task }
    }

    /// Broadcasts a status request to every idle device.
    ///
    /// Returns the number of requests sent. Recoverable send failures are
    /// logged and retried on the next tick.
    pub async fn request_tick(&mut self) -> Result<usize> {
        let mut sent = 0;
        for address in self.store.devices() {
            if self.store.poll_state(address) == Some(PollState::AwaitingResponse) {
                trace!(%address, "status request still outstanding");
                continue;
            }

            let telegram = self.codec.telegram(&Command::read_relay_status(address));
            match self.transport.send(telegram.as_bytes(), self.broadcast_addr).await {
                Ok(()) => {
                    self.store.begin_request(address);
                    sent += 1;
                }
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => warn!(%address, error = %e, "status request failed"),
            }
        }
        Ok(sent)
    }

    /// Drains every queued datagram and applies valid status responses.
    ///
    /// The socket is read on every tick so foreign traffic, echoes and late
    /// answers never pile up between requests. While a request is
    /// outstanding the drain waits for answers until `receive_timeout` has
    /// passed; otherwise it only takes what is already queued. The whole
    /// drain is bounded by that one deadline. Devices still awaiting a
    /// response afterwards return to idle with their last known state
    /// untouched. Returns the number of devices updated.
    pub async fn drain_tick(&mut self) -> Result<usize> {
        let deadline = Instant::now() + self.receive_timeout;
        let mut updated = 0;
        let mut dropped = 0;

        loop {
            let wait = if self.store.awaiting().is_empty() {
                Duration::ZERO
            } else {
                deadline.saturating_duration_since(Instant::now())
            };

            match self.transport.receive(&mut self.recv_buffer, wait).await {
                Ok((len, source)) => {
                    if self.accept(&self.recv_buffer[..len], source) {
                        updated += 1;
                    } else {
                        dropped += 1;
                    }
                }
                Err(Error::Timeout) => break,
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "receive failed");
                    break;
                }
            }

            if Instant::now() >= deadline {
                debug!(dropped, "drain deadline reached");
                break;
            }
        }

        if dropped > 0 {
            trace!(dropped, "unmatched datagrams discarded");
        }
        for address in self.store.expire_awaiting() {
            debug!(%address, "no valid status response this cycle");
        }
        Ok(updated)
    }

    fn accept(&self, datagram: &[u8], source: SocketAddr) -> bool {
        for address in self.store.awaiting() {
            match decode(datagram, CommandKind::ReadRelayStatus, address) {
                Ok(frame) => {
                    debug!(%address, %source, bytes = %hex(datagram), "status response");
                    if !frame.checksum_matches() {
                        debug!(%address, "status response checksum does not match");
                    }
                    return self.store.complete(frame);
                }
                Err(reason) => trace!(%address, %source, %reason, "not a response for device"),
            }
        }
        false
    }
}

/// Running polling task
pub struct PollingHandle {
    shutdown: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl PollingHandle {
    /// Stops both timers, waits for the task and releases the transport
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        self.task
            .await
            .map_err(|e| Error::Io(std::io::Error::other(format!("polling task failed: {}", e))))?
    }

    /// Whether the task has stopped, on shutdown or a closed transport
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChannelState;
    use crate::network::MockTransport;
    use crate::protocol::codec::fixtures::status_response;
    use crate::protocol::encode;

    const ROOM: DeviceAddress = DeviceAddress::new(1, 27);
    const HALL: DeviceAddress = DeviceAddress::new(1, 28);

    fn config() -> Config {
        Config {
            broadcast_addr: "127.0.0.1:6000".parse().unwrap(),
            request_interval: Duration::from_millis(20),
            drain_interval: Duration::from_millis(10),
            receive_timeout: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn cycle(devices: &[DeviceAddress]) -> (PollingCycle<MockTransport>, Arc<MockTransport>, Arc<StateStore>) {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(StateStore::new());
        let cycle = PollingCycle::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            &config(),
            devices.iter().copied(),
        );
        (cycle, transport, store)
    }

    #[tokio::test]
    async fn test_request_tick_broadcasts_status_requests() {
        let (mut cycle, transport, store) = cycle(&[ROOM, HALL]);

        assert_eq!(cycle.request_tick().await.unwrap(), 2);

        let sent = transport.sent_packets();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, encode(&Command::read_relay_status(ROOM)).as_bytes());
        assert_eq!(sent[1].0, encode(&Command::read_relay_status(HALL)).as_bytes());
        assert!(sent.iter().all(|(_, dest)| *dest == config().broadcast_addr));
        assert_eq!(store.awaiting(), vec![ROOM, HALL]);
    }

    #[tokio::test]
    async fn test_outstanding_request_not_repeated() {
        let (mut cycle, transport, _store) = cycle(&[ROOM]);

        cycle.request_tick().await.unwrap();
        assert_eq!(cycle.request_tick().await.unwrap(), 0);
        assert_eq!(transport.sent_packets().len(), 1);
    }

    #[tokio::test]
    async fn test_drain_applies_matching_response() {
        let (mut cycle, transport, store) = cycle(&[ROOM, HALL]);
        cycle.request_tick().await.unwrap();

        transport.add_response(status_response(HALL, &[0, 0, 0, 80]));
        assert_eq!(cycle.drain_tick().await.unwrap(), 1);

        assert_eq!(
            store.channel_state(HALL, 3),
            Some(ChannelState { on: true, level: 80 })
        );
        assert_eq!(store.channel_state(ROOM, 3), None);
        assert!(store.awaiting().is_empty());
    }

    #[tokio::test]
    async fn test_drain_skips_foreign_traffic() {
        let (mut cycle, transport, store) = cycle(&[ROOM]);
        cycle.request_tick().await.unwrap();

        // our own broadcast echo, another device, a wrong opcode
        transport.add_response(encode(&Command::read_relay_status(ROOM)).as_bytes().to_vec());
        transport.add_response(status_response(DeviceAddress::new(9, 9), &[100]));
        let mut wrong_opcode = status_response(ROOM, &[100]);
        wrong_opcode[22] = 0x32;
        transport.add_response(wrong_opcode);
        transport.add_response(status_response(ROOM, &[100]));

        assert_eq!(cycle.drain_tick().await.unwrap(), 1);
        assert_eq!(transport.pending_responses(), 0);
        assert_eq!(store.channel_state(ROOM, 0), Some(ChannelState { on: true, level: 100 }));
    }

    #[tokio::test]
    async fn test_drain_keeps_up_with_steady_traffic() {
        let (mut cycle, transport, store) = cycle(&[ROOM]);
        let neighbour = DeviceAddress::new(1, 40);

        for period in 0..5u8 {
            let level = 10 * (period + 1);
            cycle.request_tick().await.unwrap();
            transport.add_response(status_response(ROOM, &[level]));

            for tick in 0..12 {
                for _ in 0..8 {
                    transport.add_response(status_response(neighbour, &[77]));
                }
                transport.add_response(encode(&Command::read_relay_status(neighbour)).as_bytes().to_vec());
                if tick == 5 {
                    // late duplicate answer while nothing is outstanding
                    transport.add_response(status_response(ROOM, &[1]));
                }

                cycle.drain_tick().await.unwrap();
                assert_eq!(transport.pending_responses(), 0);
            }

            assert_eq!(store.channel_state(ROOM, 0).map(|s| s.level), Some(level));
            assert_eq!(store.poll_state(ROOM), Some(PollState::Idle));
        }
    }

    #[tokio::test]
    async fn test_drain_idle_reads_without_waiting() {
        let (mut cycle, transport, store) = cycle(&[ROOM]);
        transport.add_response(status_response(ROOM, &[90]));
        transport.add_response(status_response(HALL, &[90]));

        assert_eq!(cycle.drain_tick().await.unwrap(), 0);
        assert_eq!(transport.pending_responses(), 0);
        assert_eq!(store.frame(ROOM), None);
    }

    #[tokio::test]
    async fn test_drain_bounded_under_continuous_traffic() {
        let flood = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = Arc::new(
            crate::network::UdpTransport::bind("127.0.0.1:0".parse().unwrap())
                .await
                .unwrap(),
        );
        let config = Config {
            broadcast_addr: flood.local_addr().unwrap(),
            receive_timeout: Duration::from_millis(100),
            ..config()
        };
        let store = Arc::new(StateStore::new());
        let mut cycle = PollingCycle::new(Arc::clone(&transport), Arc::clone(&store), &config, [ROOM]);

        // A neighbour answers every 10 ms, well inside the receive timeout
        let target = transport.local_addr();
        let noise = tokio::spawn(async move {
            let datagram = status_response(DeviceAddress::new(9, 9), &[100]);
            loop {
                let _ = flood.send_to(&datagram, target).await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        cycle.request_tick().await.unwrap();
        let started = std::time::Instant::now();
        assert_eq!(cycle.drain_tick().await.unwrap(), 0);
        let elapsed = started.elapsed();
        noise.abort();

        assert!(elapsed < Duration::from_millis(400), "drain took {:?}", elapsed);
        assert_eq!(store.poll_state(ROOM), Some(PollState::Idle));
    }

    #[tokio::test]
    async fn test_timeout_leaves_state_unchanged() {
        let (mut cycle, transport, store) = cycle(&[ROOM]);
        cycle.request_tick().await.unwrap();
        transport.add_response(status_response(ROOM, &[0, 40]));
        cycle.drain_tick().await.unwrap();
        let before = store.frame(ROOM);

        for _ in 0..3 {
            cycle.request_tick().await.unwrap();
            assert_eq!(cycle.drain_tick().await.unwrap(), 0);
            assert_eq!(store.poll_state(ROOM), Some(PollState::Idle));
        }

        assert_eq!(store.frame(ROOM), before);
        assert_eq!(transport.sent_packets().len(), 4);
    }

    #[tokio::test]
    async fn test_closed_transport_stops_ticks() {
        let (mut cycle, transport, _store) = cycle(&[ROOM]);
        transport.close();
        assert!(matches!(cycle.request_tick().await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let (cycle, transport, store) = cycle(&[ROOM]);
        transport.add_response(status_response(ROOM, &[0, 0, 55]));

        let handle = cycle.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        handle.shutdown().await.unwrap();
        assert!(transport.is_closed());
        assert!(!transport.sent_packets().is_empty());
        assert_eq!(store.channel_state(ROOM, 2).map(|s| s.level), Some(55));
    }

    #[tokio::test]
    async fn test_run_exits_when_transport_closed() {
        let (cycle, transport, _store) = cycle(&[ROOM]);
        transport.close();

        let handle = cycle.spawn();
        let result = tokio::time::timeout(Duration::from_secs(2), handle.shutdown()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
