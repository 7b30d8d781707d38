//! In-memory, thread-safe collaborators for development and testing.
//!
//! Each type stands in for one external service and records what the
//! engine asked of it, so tests can both drive calls and assert on them.

pub mod channel;
pub mod conference;
pub mod device;
pub mod dialer;
pub mod dialplan;

use std::sync::Arc;

pub use channel::MemoryChannel;
pub use conference::MemoryConference;
pub use device::MemoryDeviceBus;
pub use dialer::{DialScript, MemoryDialer};
pub use dialplan::MemoryDialplan;

use crate::core::Collaborators;

/// One of each in-memory service, sharing nothing with any other set.
#[derive(Clone, Default)]
pub struct MemoryServices {
    /// Scriptable dialer.
    pub dialer: Arc<MemoryDialer>,
    /// Blocking conference bridge.
    pub conference: Arc<MemoryConference>,
    /// Recording lamp bus.
    pub devices: Arc<MemoryDeviceBus>,
    /// Recording dialplan.
    pub dialplan: Arc<MemoryDialplan>,
}

impl MemoryServices {
    /// Fresh services.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The services as engine collaborators.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            dialer: self.dialer.clone(),
            conference: self.conference.clone(),
            devices: self.devices.clone(),
            dialplan: self.dialplan.clone(),
        }
    }
}
