//! Polling module
//!
//! Pairs status requests with broadcast responses and keeps the last known
//! state of every managed device.

pub mod cycle;
pub mod store;

pub use self::cycle::{PollingCycle, PollingHandle};
pub use self::store::{PollState, StateStore};
