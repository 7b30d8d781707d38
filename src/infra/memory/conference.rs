//! In-memory conference bridge.
//!
//! A participant's `join` blocks until the leg hangs up, it is kicked, or,
//! for marked-exit participants, the last marked user leaves.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::core::{ChannelHandle, Conference, ConferenceProfile, HoldHook, SlaError};

/// How often a blocked participant rechecks its leg.
const POLL: Duration = Duration::from_millis(10);

type SharedHook = Arc<dyn Fn() + Send + Sync>;

struct Participant {
    id: u64,
    chan: ChannelHandle,
    profile: ConferenceProfile,
    hook: Option<SharedHook>,
    kicked: bool,
}

#[derive(Default)]
struct Bridges {
    next_id: u64,
    rooms: HashMap<String, Vec<Participant>>,
    joins: Vec<(String, String)>,
}

impl Bridges {
    fn marked_users(&self, conference: &str) -> usize {
        self.rooms
            .get(conference)
            .map_or(0, |room| room.iter().filter(|p| p.profile.marked_user).count())
    }

    fn find(&self, conference: &str, id: u64) -> Option<&Participant> {
        self.rooms.get(conference)?.iter().find(|p| p.id == id)
    }

    fn leave(&mut self, conference: &str, id: u64) {
        if let Some(room) = self.rooms.get_mut(conference) {
            room.retain(|p| p.id != id);
            if room.is_empty() {
                self.rooms.remove(conference);
            }
        }
    }
}

/// Conference service keeping every bridge in memory.
#[derive(Default)]
pub struct MemoryConference {
    bridges: Mutex<Bridges>,
    changed: Condvar,
}

impl MemoryConference {
    /// Empty bridge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel names currently in `conference`.
    #[must_use]
    pub fn participants(&self, conference: &str) -> Vec<String> {
        self.bridges
            .lock()
            .rooms
            .get(conference)
            .map(|room| room.iter().map(|p| p.chan.name().to_owned()).collect())
            .unwrap_or_default()
    }

    /// Every `(conference, channel)` join so far.
    #[must_use]
    pub fn joins(&self) -> Vec<(String, String)> {
        self.bridges.lock().joins.clone()
    }

    /// Profile a participant joined `conference` with.
    #[must_use]
    pub fn profile_of(&self, conference: &str, chan_name: &str) -> Option<ConferenceProfile> {
        self.bridges
            .lock()
            .rooms
            .get(conference)?
            .iter()
            .find(|p| p.chan.name() == chan_name)
            .map(|p| p.profile.clone())
    }

    /// The participant on `chan_name` presses hold. Returns whether a hold
    /// hook was attached.
    pub fn hold(&self, chan_name: &str) -> bool {
        let hook = {
            let bridges = self.bridges.lock();
            bridges
                .rooms
                .values()
                .flatten()
                .find(|p| p.chan.name() == chan_name)
                .and_then(|p| p.hook.clone())
        };
        match hook {
            Some(hook) => {
                hook();
                true
            }
            None => false,
        }
    }

    /// Block until `conference` has `count` participants.
    pub fn wait_for_participants(&self, conference: &str, count: usize, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut bridges = self.bridges.lock();
        loop {
            let present = bridges.rooms.get(conference).map_or(0, Vec::len);
            if present == count {
                return true;
            }
            if self.changed.wait_until(&mut bridges, deadline).timed_out() {
                return bridges.rooms.get(conference).map_or(0, Vec::len) == count;
            }
        }
    }
}

impl Conference for MemoryConference {
    fn join(
        &self,
        chan: &ChannelHandle,
        conference: &str,
        profile: &ConferenceProfile,
        hold_hook: Option<HoldHook>,
    ) -> Result<(), SlaError> {
        let mut bridges = self.bridges.lock();
        let id = bridges.next_id;
        bridges.next_id += 1;
        bridges
            .joins
            .push((conference.to_owned(), chan.name().to_owned()));
        bridges
            .rooms
            .entry(conference.to_owned())
            .or_default()
            .push(Participant {
                id,
                chan: Arc::clone(chan),
                profile: profile.clone(),
                hook: hold_hook.map(SharedHook::from),
                kicked: false,
            });
        self.changed.notify_all();

        let mut saw_marked = false;
        loop {
            let kicked = bridges.find(conference, id).is_none_or(|p| p.kicked);
            if kicked || chan.is_hung_up() {
                break;
            }
            let marked = bridges.marked_users(conference);
            if marked > 0 {
                saw_marked = true;
            } else if saw_marked && profile.marked_exit {
                break;
            }
            let _ = self.changed.wait_for(&mut bridges, POLL);
        }

        bridges.leave(conference, id);
        self.changed.notify_all();
        Ok(())
    }

    fn kick_all(&self, conference: &str, _chan: Option<&ChannelHandle>) -> Result<(), SlaError> {
        let mut bridges = self.bridges.lock();
        if let Some(room) = bridges.rooms.get_mut(conference) {
            for participant in room {
                participant.kicked = true;
            }
        }
        self.changed.notify_all();
        Ok(())
    }
}
