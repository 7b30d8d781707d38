//! Shared harness for the call-flow integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use shared_line_appearance::builders::EngineBuilder;
use shared_line_appearance::config::SlaConfig;
use shared_line_appearance::core::{
    CallerId, ChannelHandle, Collaborators, Dialer, Engine, SlaError, StationStatus, Trunk,
    TrunkStatus,
};
use shared_line_appearance::infra::memory::{MemoryChannel, MemoryDialer, MemoryServices};
use shared_line_appearance::util::init_test_tracing;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(10);

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// An inbound caller blocked in `trunk_exec`.
pub struct TrunkCall {
    pub chan: Arc<MemoryChannel>,
    pub handle: JoinHandle<Result<TrunkStatus, SlaError>>,
}

impl TrunkCall {
    /// Caller hangs up; returns the trunk status.
    pub fn hang_up(self) -> TrunkStatus {
        self.chan.hang_up();
        self.finish()
    }

    /// Wait for `trunk_exec` to return.
    pub fn finish(self) -> TrunkStatus {
        self.handle.join().unwrap().unwrap()
    }
}

/// A handset blocked in `station_exec`.
pub struct StationCall {
    pub chan: Arc<MemoryChannel>,
    pub handle: JoinHandle<StationStatus>,
}

impl StationCall {
    /// Handset hangs up; returns the station status.
    pub fn hang_up(self) -> StationStatus {
        self.chan.hang_up();
        self.finish()
    }

    /// Wait for `station_exec` to return.
    pub fn finish(self) -> StationStatus {
        self.handle.join().unwrap()
    }
}

/// An engine wired to fresh in-memory services.
pub struct Harness {
    pub services: MemoryServices,
    pub engine: Engine,
}

impl Harness {
    pub fn new(config: &str) -> Self {
        Self::with_dialer(config, |dialer| dialer as Arc<dyn Dialer>)
    }

    /// Like [`Harness::new`], with the engine dialing through `wrap(dialer)`.
    pub fn with_dialer(config: &str, wrap: impl FnOnce(Arc<MemoryDialer>) -> Arc<dyn Dialer>) -> Self {
        init_test_tracing();
        let services = MemoryServices::new();
        let collab = Collaborators {
            dialer: wrap(Arc::clone(&services.dialer)),
            ..services.collaborators()
        };
        let engine = EngineBuilder::new(collab)
            .with_config(SlaConfig::from_json_str(config).unwrap())
            .build()
            .unwrap();
        Self { services, engine }
    }

    /// Reload from a JSON document.
    pub fn reload(&self, config: &str) -> Result<shared_line_appearance::core::ReloadSummary, SlaError> {
        self.engine.reload(&SlaConfig::from_json_str(config).unwrap())
    }

    pub fn trunk(&self, name: &str) -> Arc<Trunk> {
        self.engine.find_trunk(name).unwrap()
    }

    /// Start an inbound call on `data` from a caller with no identity.
    pub fn call_trunk(&self, data: &str) -> TrunkCall {
        self.call_trunk_from(data, CallerId::default())
    }

    /// Start an inbound call on `data` from `caller`.
    pub fn call_trunk_from(&self, data: &str, caller: CallerId) -> TrunkCall {
        let chan = MemoryChannel::with_caller_id(format!("DAHDI/in-{}", uuid::Uuid::new_v4()), caller);
        let leg: ChannelHandle = chan.clone();
        let engine = self.engine.clone();
        let data = data.to_string();
        let handle = thread::Builder::new()
            .name("test-trunk".into())
            .spawn(move || engine.trunk_exec(&leg, &data))
            .unwrap();
        TrunkCall { chan, handle }
    }

    /// Take a handset off-hook with `data` as the station argument.
    pub fn off_hook(&self, data: &str) -> StationCall {
        let chan = MemoryChannel::new(format!("SIP/handset-{}", uuid::Uuid::new_v4()));
        let leg: ChannelHandle = chan.clone();
        let engine = self.engine.clone();
        let data = data.to_string();
        let handle = thread::Builder::new()
            .name("test-station".into())
            .spawn(move || engine.station_exec(&leg, &data))
            .unwrap();
        StationCall { chan, handle }
    }

    /// Wait until `conference` has `count` participants.
    pub fn wait_for_conference(&self, conference: &str, count: usize) -> bool {
        self.services
            .conference
            .wait_for_participants(conference, count, WAIT)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

/// The counting hold model: on hold exactly when every engaged station
/// parked the call.
pub fn assert_hold_consistent(trunk: &Trunk) {
    let active = trunk.active_stations();
    let holding = trunk.hold_stations();
    assert!(holding <= active, "{} holders > {} active", holding, active);
    assert!(active <= trunk.num_stations());
    assert_eq!(trunk.on_hold(), holding > 0 && holding == active);
}
