//! In-memory call leg.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::{CallerId, Channel, FrameWait, Indication};

#[derive(Debug, Default)]
struct LegState {
    answered: bool,
    hung_up: bool,
    indications: Vec<Indication>,
    vars: HashMap<String, String>,
    caller: CallerId,
}

/// A call leg that lives until [`MemoryChannel::hang_up`] or a soft hangup.
#[derive(Debug)]
pub struct MemoryChannel {
    name: String,
    state: Mutex<LegState>,
    changed: Condvar,
}

impl MemoryChannel {
    /// New leg with no caller identity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_caller_id(name, CallerId::default())
    }

    /// New leg presenting `caller`.
    #[must_use]
    pub fn with_caller_id(name: impl Into<String>, caller: CallerId) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(LegState {
                caller,
                ..LegState::default()
            }),
            changed: Condvar::new(),
        })
    }

    /// The far end hangs up.
    pub fn hang_up(&self) {
        let mut state = self.state.lock();
        state.hung_up = true;
        self.changed.notify_all();
    }

    /// Whether the leg was answered (raw or full).
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.state.lock().answered
    }

    /// Indications sent so far, oldest first.
    #[must_use]
    pub fn indications(&self) -> Vec<Indication> {
        self.state.lock().indications.clone()
    }

    /// Block until the leg hangs up; returns `false` on timeout.
    pub fn wait_for_hangup(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.hung_up {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.hung_up;
            }
        }
        true
    }
}

impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn answer(&self) {
        self.state.lock().answered = true;
    }

    fn raw_answer(&self) {
        self.state.lock().answered = true;
    }

    fn indicate(&self, indication: Indication) {
        self.state.lock().indications.push(indication);
    }

    fn soft_hangup(&self) {
        self.hang_up();
    }

    fn is_hung_up(&self) -> bool {
        self.state.lock().hung_up
    }

    fn caller_id(&self) -> CallerId {
        self.state.lock().caller.clone()
    }

    fn set_caller_id(&self, caller: CallerId) {
        self.state.lock().caller = caller;
    }

    fn set_var(&self, name: &str, value: &str) {
        self.state.lock().vars.insert(name.to_owned(), value.to_owned());
    }

    fn var(&self, name: &str) -> Option<String> {
        self.state.lock().vars.get(name).cloned()
    }

    fn wait_for_frame(&self, timeout: Duration) -> FrameWait {
        let mut state = self.state.lock();
        if !state.hung_up {
            let _ = self.changed.wait_for(&mut state, timeout);
        }
        if state.hung_up {
            FrameWait::Hangup
        } else {
            FrameWait::Timeout
        }
    }
}
