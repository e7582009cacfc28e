use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::{ChannelState, DeviceAddress};
use crate::protocol::ResponseFrame;

/// Request/response phase of one managed device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    AwaitingResponse,
}

#[derive(Debug, Clone)]
struct Entry {
    state: PollState,
    frame: Option<ResponseFrame>,
}

impl Entry {
    fn idle() -> Self {
        Entry {
            state: PollState::Idle,
            frame: None,
        }
    }
}

/// Last decoded status frame and poll phase per device.
///
/// Every method takes the lock for one short, non-async critical section,
/// so readers never observe a half-applied update.
#[derive(Debug, Default)]
pub struct StateStore {
    entries: RwLock<HashMap<DeviceAddress, Entry>>,
}

impl StateStore {
    pub fn new() -> Self {
        StateStore::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<DeviceAddress, Entry>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<DeviceAddress, Entry>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts tracking `address`; a no-op if it is already tracked
    pub fn register(&self, address: DeviceAddress) {
        self.write().entry(address).or_insert_with(Entry::idle);
    }

    /// Tracked devices in address order
    pub fn devices(&self) -> Vec<DeviceAddress> {
        let mut devices: Vec<_> = self.read().keys().copied().collect();
        devices.sort();
        devices
    }

    pub fn poll_state(&self, address: DeviceAddress) -> Option<PollState> {
        self.read().get(&address).map(|entry| entry.state)
    }

    /// Marks a status request to `address` as outstanding
    pub fn begin_request(&self, address: DeviceAddress) {
        self.write().entry(address).or_insert_with(Entry::idle).state = PollState::AwaitingResponse;
    }

    /// Devices with an outstanding status request
    pub fn awaiting(&self) -> Vec<DeviceAddress> {
        let mut devices: Vec<_> = self
            .read()
            .iter()
            .filter(|(_, entry)| entry.state == PollState::AwaitingResponse)
            .map(|(address, _)| *address)
            .collect();
        devices.sort();
        devices
    }

    /// Replaces the stored frame for the frame's device and returns it to idle.
    ///
    /// Returns `false` when the device is not tracked.
    pub fn complete(&self, frame: ResponseFrame) -> bool {
        match self.write().get_mut(&frame.address()) {
            Some(entry) => {
                entry.state = PollState::Idle;
                entry.frame = Some(frame);
                true
            }
            None => false,
        }
    }

    /// Returns every outstanding device to idle, leaving stored frames untouched
    pub fn expire_awaiting(&self) -> Vec<DeviceAddress> {
        let mut expired = Vec::new();
        for (address, entry) in self.write().iter_mut() {
            if entry.state == PollState::AwaitingResponse {
                entry.state = PollState::Idle;
                expired.push(*address);
            }
        }
        expired.sort();
        expired
    }

    /// Drops the stored frame so readers see "unknown" until the next poll
    pub fn invalidate(&self, address: DeviceAddress) {
        if let Some(entry) = self.write().get_mut(&address) {
            entry.frame = None;
        }
    }

    /// A copy of the last valid status frame from `address`
    pub fn frame(&self, address: DeviceAddress) -> Option<ResponseFrame> {
        self.read().get(&address).and_then(|entry| entry.frame.clone())
    }

    pub fn channel_state(&self, address: DeviceAddress, channel: u8) -> Option<ChannelState> {
        self.read()
            .get(&address)
            .and_then(|entry| entry.frame.as_ref())
            .and_then(|frame| frame.channel_state(channel))
    }
}
