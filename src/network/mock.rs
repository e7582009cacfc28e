//! In-memory transport for exercising the polling cycle without sockets.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::Transport;
use crate::core::{Error, Result};

/// Records sent datagrams and replays scripted responses in FIFO order
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct MockState {
    responses: VecDeque<(Vec<u8>, SocketAddr)>,
    sent: Vec<(Vec<u8>, SocketAddr)>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport::default()
    }

    /// Queues a datagram for the next `receive`
    pub fn add_response(&self, data: Vec<u8>) {
        self.add_response_from(data, SocketAddr::from(([192, 168, 1, 30], 6000)));
    }

    pub fn add_response_from(&self, data: Vec<u8>, from: SocketAddr) {
        self.state.lock().unwrap().responses.push_back((data, from));
    }

    /// All datagrams passed to `send`, oldest first
    pub fn sent_packets(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn pending_responses(&self) -> usize {
        self.state.lock().unwrap().responses.len()
    }
}

impl Transport for MockTransport {
    async fn send(&self, data: &[u8], dest: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.state.lock().unwrap().sent.push((data.to_vec(), dest));
        Ok(())
    }

    async fn receive(&self, buf: &mut [u8], _timeout: Duration) -> Result<(usize, SocketAddr)> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let next = self.state.lock().unwrap().responses.pop_front();
        match next {
            Some((data, from)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from))
            }
            None => Err(Error::Timeout),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
