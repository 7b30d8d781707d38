//! Scriptable in-memory dialer.
//!
//! Dials to a device behave according to its [`DialScript`]; tests then
//! answer or end ringing dials by device name and inspect what was dialed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{CallerId, ChannelHandle, Dial, DialHandle, DialResult, Dialer, SlaError, StateCallback};
use crate::infra::memory::MemoryChannel;

type SharedCallback = Arc<dyn Fn() + Send + Sync>;

/// How a dial to a device behaves when it is run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DialScript {
    /// Start ringing and wait to be answered or ended.
    #[default]
    Ring,
    /// Answer as soon as it starts.
    Answer,
    /// Fail to start with this result.
    Fail(DialResult),
}

struct DialInner {
    device: Option<String>,
    result: DialResult,
    ran: bool,
    started: bool,
    destroyed: bool,
    answered: Option<Arc<MemoryChannel>>,
    callback: Option<SharedCallback>,
    caller: Option<CallerId>,
}

/// One dial created by [`MemoryDialer`].
pub struct MemoryDial {
    seq: u64,
    scripts: Arc<Mutex<HashMap<String, DialScript>>>,
    inner: Mutex<DialInner>,
}

impl MemoryDial {
    fn device(&self) -> Option<String> {
        self.inner.lock().device.clone()
    }

    fn is_live(&self) -> bool {
        let inner = self.inner.lock();
        inner.started && !inner.destroyed
    }

    fn set_result(&self, result: DialResult, answered: Option<Arc<MemoryChannel>>) {
        let callback = {
            let mut inner = self.inner.lock();
            inner.result = result;
            if answered.is_some() {
                inner.answered = answered;
            }
            inner.callback.clone()
        };
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl Dial for MemoryDial {
    fn append(&self, tech: &str, resource: &str) -> Result<(), SlaError> {
        self.inner.lock().device = Some(format!("{tech}/{resource}"));
        Ok(())
    }

    fn set_state_callback(&self, callback: StateCallback) {
        self.inner.lock().callback = Some(SharedCallback::from(callback));
    }

    fn run(&self, requester: Option<&ChannelHandle>) -> DialResult {
        let device = {
            let mut inner = self.inner.lock();
            inner.ran = true;
            inner.caller = requester.map(|c| c.caller_id());
            inner.device.clone()
        };
        let Some(device) = device else {
            self.inner.lock().result = DialResult::Invalid;
            return DialResult::Invalid;
        };
        let script = self.scripts.lock().get(&device).copied().unwrap_or_default();

        match script {
            DialScript::Fail(result) => {
                self.inner.lock().result = result;
                result
            }
            DialScript::Ring => {
                self.inner.lock().started = true;
                self.set_result(DialResult::Ringing, None);
                DialResult::Trying
            }
            DialScript::Answer => {
                self.inner.lock().started = true;
                let chan = MemoryChannel::new(format!("{device}-{}", self.seq));
                self.set_result(DialResult::Answered, Some(chan));
                DialResult::Trying
            }
        }
    }

    fn state(&self) -> DialResult {
        self.inner.lock().result
    }

    fn answered(&self) -> Option<ChannelHandle> {
        self.inner
            .lock()
            .answered
            .clone()
            .map(|chan| chan as ChannelHandle)
    }

    fn join(&self) {}

    fn destroy(&self) {
        let answered = {
            let mut inner = self.inner.lock();
            inner.destroyed = true;
            inner.callback = None;
            inner.answered.clone()
        };
        if let Some(chan) = answered {
            chan.hang_up();
        }
    }
}

#[derive(Default)]
struct DialLog {
    next_seq: u64,
    dials: Vec<Arc<MemoryDial>>,
    unavailable: bool,
}

/// Dialer whose dials are driven by the test.
#[derive(Default)]
pub struct MemoryDialer {
    scripts: Arc<Mutex<HashMap<String, DialScript>>>,
    log: Mutex<DialLog>,
}

impl MemoryDialer {
    /// Dialer where every device rings until answered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how dials to `device` behave from now on.
    pub fn script(&self, device: &str, script: DialScript) {
        self.scripts.lock().insert(device.to_owned(), script);
    }

    /// Make [`Dialer::create`] fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.log.lock().unavailable = unavailable;
    }

    fn dials_to(&self, device: &str) -> Vec<Arc<MemoryDial>> {
        self.log
            .lock()
            .dials
            .iter()
            .filter(|d| d.device().as_deref() == Some(device))
            .cloned()
            .collect()
    }

    fn ringing_dial(&self, device: &str) -> Option<Arc<MemoryDial>> {
        self.dials_to(device).into_iter().rev().find(|d| {
            d.is_live() && matches!(d.state(), DialResult::Trying | DialResult::Ringing | DialResult::Progress | DialResult::Proceeding)
        })
    }

    /// Answer the newest ringing dial to `device`, returning the answered leg.
    pub fn answer(&self, device: &str) -> Option<Arc<MemoryChannel>> {
        let dial = self.ringing_dial(device)?;
        let chan = MemoryChannel::new(format!("{device}-{}", dial.seq));
        dial.set_result(DialResult::Answered, Some(Arc::clone(&chan)));
        Some(chan)
    }

    /// End the newest ringing dial to `device` with `result`.
    pub fn end(&self, device: &str, result: DialResult) -> bool {
        match self.ringing_dial(device) {
            Some(dial) => {
                dial.set_result(result, None);
                true
            }
            None => false,
        }
    }

    /// Number of dials run to `device`.
    #[must_use]
    pub fn dial_count(&self, device: &str) -> usize {
        self.dials_to(device)
            .iter()
            .filter(|d| d.inner.lock().ran)
            .count()
    }

    /// Dials to `device` that started and were not destroyed.
    #[must_use]
    pub fn live_dials(&self, device: &str) -> usize {
        self.dials_to(device).iter().filter(|d| d.is_live()).count()
    }

    /// Whether the newest dial to `device` is ringing.
    #[must_use]
    pub fn is_ringing(&self, device: &str) -> bool {
        self.ringing_dial(device).is_some()
    }

    /// Leg answered on the newest dial to `device`.
    #[must_use]
    pub fn answered_channel(&self, device: &str) -> Option<Arc<MemoryChannel>> {
        self.dials_to(device)
            .last()
            .and_then(|d| d.inner.lock().answered.clone())
    }

    /// Caller identity the requester presented on the newest dial to
    /// `device`.
    #[must_use]
    pub fn last_caller_id(&self, device: &str) -> Option<CallerId> {
        self.dials_to(device)
            .last()
            .and_then(|d| d.inner.lock().caller.clone())
    }
}

impl Dialer for MemoryDialer {
    fn create(&self) -> Result<DialHandle, SlaError> {
        let mut log = self.log.lock();
        if log.unavailable {
            return Err(SlaError::DialerUnavailable("memory dialer disabled".into()));
        }
        let seq = log.next_seq;
        log.next_seq += 1;
        let dial = Arc::new(MemoryDial {
            seq,
            scripts: Arc::clone(&self.scripts),
            inner: Mutex::new(DialInner {
                device: None,
                result: DialResult::Invalid,
                ran: false,
                started: false,
                destroyed: false,
                answered: None,
                callback: None,
                caller: None,
            }),
        });
        log.dials.push(Arc::clone(&dial));
        Ok(dial)
    }
}
