//! The engine context shared by the coordinator, dial workers and call-leg
//! handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::core::collaborator::{
    ChannelHandle, Conference, ConferenceProfile, DeviceState, DeviceStateBus, DialHandle, Dialer,
    Dialplan, HoldHook, Indication,
};
use crate::core::model::{
    conference_name, pairing_device, HoldTransition, LeaveOutcome, Station, Trunk, TrunkRef, TrunkState,
};
use crate::core::registry::Registry;
use crate::core::ringing::{CoordState, Event};
use crate::core::scheduler::Teardown;
use crate::core::{coordinator, SlaError};

/// Registrar name for dialplan extensions owned by the engine.
pub const REGISTRAR: &str = "SLA";

/// Channel variable carrying the station-leg result.
pub const STATION_STATUS_VAR: &str = "SLASTATION_STATUS";

/// Channel variable carrying the trunk-leg result.
pub const TRUNK_STATUS_VAR: &str = "SLATRUNK_STATUS";

/// A unit of work handed to a [`Spawn`] implementation.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Abstraction for starting named worker threads.
pub trait Spawn: Send + Sync {
    /// Run `job` on a new thread called `name`.
    fn spawn(&self, name: &str, job: Job) -> Result<JoinHandle<()>, SlaError>;
}

/// External services the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Places outbound calls.
    pub dialer: Arc<dyn Dialer>,
    /// Bridges call legs.
    pub conference: Arc<dyn Conference>,
    /// Receives lamp state changes.
    pub devices: Arc<dyn DeviceStateBus>,
    /// Receives autocontext extensions.
    pub dialplan: Arc<dyn Dialplan>,
}

/// Which refs of a trunk a state change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefFilter {
    /// Every station's ref.
    All,
    /// Only refs without a connected leg.
    Inactive,
    /// Every ref except those whose station parked the call.
    NotParked,
}

pub(crate) struct Shared {
    pub(crate) trunks: Registry<Trunk>,
    pub(crate) stations: Registry<Station>,
    pub(crate) coord: Mutex<CoordState>,
    pub(crate) wake: Condvar,
    pub(crate) attempt_callerid: AtomicBool,
    pub(crate) collab: Collaborators,
    pub(crate) spawner: Arc<dyn Spawn>,
    pub(crate) coordinator: Mutex<Option<JoinHandle<()>>>,
    pub(crate) reload_lock: Mutex<()>,
    me: Weak<Self>,
}

/// Shared line appearance engine.
///
/// Cheap to clone; every clone drives the same trunks and stations.
#[derive(Clone)]
pub struct Engine {
    pub(crate) shared: Arc<Shared>,
}

impl Engine {
    /// Create an engine with an empty configuration.
    ///
    /// The coordinator loop starts with the first [`Engine::reload`] that
    /// leaves at least one trunk or station configured.
    #[must_use]
    pub fn new(collab: Collaborators, spawner: Arc<dyn Spawn>) -> Self {
        let shared = Arc::new_cyclic(|me| Shared {
            trunks: Registry::new(),
            stations: Registry::new(),
            coord: Mutex::new(CoordState::default()),
            wake: Condvar::new(),
            attempt_callerid: AtomicBool::new(false),
            collab,
            spawner,
            coordinator: Mutex::new(None),
            reload_lock: Mutex::new(()),
            me: me.clone(),
        });
        Self { shared }
    }

    /// Look up a trunk by name.
    #[must_use]
    pub fn find_trunk(&self, name: &str) -> Option<Arc<Trunk>> {
        self.shared.trunks.find(name)
    }

    /// Look up a station by name.
    #[must_use]
    pub fn find_station(&self, name: &str) -> Option<Arc<Station>> {
        self.shared.stations.find(name)
    }

    /// All trunks ordered by name.
    #[must_use]
    pub fn trunks(&self) -> Vec<Arc<Trunk>> {
        self.shared.trunks.snapshot()
    }

    /// All stations ordered by name.
    #[must_use]
    pub fn stations(&self) -> Vec<Arc<Station>> {
        self.shared.stations.snapshot()
    }

    /// Whether the coordinator loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.coord.lock().running
    }

    /// Number of trunks currently ringing inbound.
    #[must_use]
    pub fn ringing_trunk_count(&self) -> usize {
        self.shared.coord.lock().ringing_trunks.len()
    }

    /// Names of stations currently being dialed.
    #[must_use]
    pub fn ringing_station_names(&self) -> Vec<String> {
        self.shared
            .coord
            .lock()
            .ringing_stations
            .iter()
            .map(|r| r.station.name().to_owned())
            .collect()
    }

    /// Stop the coordinator loop and release every trunk and station.
    ///
    /// Calls in progress keep their own handles and finish on their own.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        {
            let mut state = shared.coord.lock();
            state.stop = true;
            shared.wake.notify_all();
        }
        let coordinator = shared.coordinator.lock().take();
        if let Some(handle) = coordinator {
            if handle.join().is_err() {
                tracing::error!("coordinator thread panicked");
            }
        }

        shared.collab.dialplan.remove_registrar(REGISTRAR);

        for trunk in shared.trunks.drain() {
            trunk.lock().stations.clear();
        }
        for station in shared.stations.drain() {
            station.lock().trunks.clear();
        }

        let mut state = shared.coord.lock();
        state.running = false;
        state.events.clear();
        tracing::info!("engine shut down");
    }
}

impl Shared {
    pub(crate) fn weak(&self) -> Weak<Self> {
        self.me.clone()
    }

    pub(crate) fn attempt_callerid(&self) -> bool {
        self.attempt_callerid.load(Ordering::Acquire)
    }

    /// Queue an event and wake the coordinator. Dropped if it is not running.
    pub(crate) fn queue_event(&self, event: Event) {
        let mut state = self.coord.lock();
        if !state.running || state.stop {
            tracing::debug!(?event, "coordinator not running, event dropped");
            return;
        }
        state.events.push_back(event);
        self.wake.notify_one();
    }

    /// Start the coordinator loop if it is not running yet.
    pub(crate) fn ensure_coordinator(&self) -> Result<(), SlaError> {
        let mut slot = self.coordinator.lock();
        if slot.is_some() {
            return Ok(());
        }
        let Some(shared) = self.me.upgrade() else {
            return Err(SlaError::Shutdown);
        };
        {
            let mut state = self.coord.lock();
            state.running = true;
            state.stop = false;
        }
        match self
            .spawner
            .spawn("sla-coordinator", Box::new(move || coordinator::run(&shared)))
        {
            Ok(handle) => {
                *slot = Some(handle);
                tracing::info!("coordinator started");
                Ok(())
            }
            Err(e) => {
                self.coord.lock().running = false;
                Err(e)
            }
        }
    }

    /// Set the state of refs to `trunk` and publish the lamp changes.
    ///
    /// Each station's first ref to the trunk is considered, matching how the
    /// lamp for a line key is addressed.
    pub(crate) fn change_trunk_state(
        &self,
        trunk: &Arc<Trunk>,
        state: TrunkState,
        filter: RefFilter,
        exclude: Option<&Arc<TrunkRef>>,
    ) {
        for station in self.stations.snapshot() {
            let Some(trunk_ref) = station.find_ref(trunk) else {
                continue;
            };
            if exclude.is_some_and(|e| Arc::ptr_eq(e, &trunk_ref)) {
                continue;
            }
            {
                let mut inner = trunk_ref.lock();
                let skip = match filter {
                    RefFilter::All => false,
                    RefFilter::Inactive => inner.chan.is_some(),
                    RefFilter::NotParked => inner.state == TrunkState::OnHoldByMe,
                };
                if skip {
                    continue;
                }
                inner.state = state;
            }
            self.publish(&station, trunk, state);
        }
    }

    /// Set one ref's state and publish it.
    pub(crate) fn set_ref_state(&self, station: &Station, trunk_ref: &TrunkRef, state: TrunkState) {
        trunk_ref.lock().state = state;
        self.publish(station, trunk_ref.trunk(), state);
    }

    fn publish(&self, station: &Station, trunk: &Trunk, state: TrunkState) {
        self.collab
            .devices
            .publish(&pairing_device(station.name(), trunk.name()), state.device_state());
    }

    pub(crate) fn device_state_of(&self, device: &str) -> DeviceState {
        self.collab.devices.device_state(device)
    }

    pub(crate) fn kick_all(&self, trunk: &Trunk, chan: Option<&ChannelHandle>) {
        let conf = conference_name(trunk.name());
        if let Err(e) = self.collab.conference.kick_all(&conf, chan) {
            tracing::warn!(conference = %conf, error = %e, "kick failed");
        }
    }

    /// Engage a station leg in its trunk's call.
    pub(crate) fn begin_station_leg(&self, station: &Arc<Station>, trunk_ref: &Arc<TrunkRef>) {
        let trunk = trunk_ref.trunk();
        let (transition, line) = {
            let mut inner = trunk.lock();
            (inner.join_station(station.name()), inner.chan.clone())
        };
        if transition == HoldTransition::Left {
            if let Some(line) = line {
                line.indicate(Indication::Unhold);
            }
            self.change_trunk_state(trunk, TrunkState::Up, RefFilter::NotParked, None);
            self.release_stale_holds(trunk);
        }
        if trunk_ref.state() != TrunkState::Up {
            self.set_ref_state(station, trunk_ref, TrunkState::Up);
        }
    }

    /// Bridge an engaged station leg until it leaves the conference.
    pub(crate) fn run_station_leg(&self, station: &Arc<Station>, trunk_ref: &Arc<TrunkRef>, chan: &ChannelHandle) {
        let conf = conference_name(trunk_ref.trunk().name());
        tracing::debug!(station = %station.name(), conference = %conf, "station joining conference");
        let hook = self.hold_hook(station, trunk_ref);
        if let Err(e) = self
            .collab
            .conference
            .join(chan, &conf, &ConferenceProfile::station(), Some(hook))
        {
            tracing::warn!(station = %station.name(), error = %e, "station could not join conference");
        }
        self.end_station_leg(station, trunk_ref);
    }

    fn hold_hook(&self, station: &Arc<Station>, trunk_ref: &Arc<TrunkRef>) -> HoldHook {
        let shared = self.weak();
        let station = Arc::clone(station);
        let trunk_ref = Arc::clone(trunk_ref);
        Box::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.queue_event(Event::Hold {
                    station: Arc::clone(&station),
                    trunk_ref: Arc::clone(&trunk_ref),
                });
            }
        })
    }

    /// Stations whose parked call was taken over by another station see
    /// the call as up again.
    fn release_stale_holds(&self, trunk: &Arc<Trunk>) {
        let holders = trunk.lock().holders.clone();
        for station in self.stations.snapshot() {
            if holders.contains(station.name()) {
                continue;
            }
            let Some(trunk_ref) = station.find_ref(trunk) else {
                continue;
            };
            if trunk_ref.state() == TrunkState::OnHoldByMe {
                self.set_ref_state(&station, &trunk_ref, TrunkState::Up);
            }
        }
    }

    /// A station leg left the conference.
    pub(crate) fn end_station_leg(&self, station: &Arc<Station>, trunk_ref: &Arc<TrunkRef>) {
        trunk_ref.lock().chan = None;
        let trunk = trunk_ref.trunk();
        let (outcome, line) = {
            let mut inner = trunk.lock();
            (inner.leave_station(station.name()), inner.chan.clone())
        };
        match outcome {
            LeaveOutcome::Parked => {
                tracing::debug!(station = %station.name(), trunk = %trunk.name(), "station left a parked call");
            }
            LeaveOutcome::Empty => {
                self.kick_all(trunk, None);
                self.change_trunk_state(trunk, TrunkState::Idle, RefFilter::All, None);
            }
            LeaveOutcome::Remaining(HoldTransition::Entered) => {
                if let Some(line) = line {
                    line.indicate(Indication::Hold);
                }
            }
            LeaveOutcome::Remaining(_) => {}
        }
    }

    /// Run cleanup produced under the coordination lock.
    pub(crate) fn run_teardown(&self, items: Vec<Teardown>) {
        for item in items {
            match item {
                Teardown::TrunkTimedOut(ringing) => {
                    let trunk = &ringing.trunk;
                    if let Some(chan) = trunk.channel() {
                        chan.set_var(TRUNK_STATUS_VAR, "RINGTIMEOUT");
                    }
                    self.kick_all(trunk, None);
                    self.change_trunk_state(trunk, TrunkState::Idle, RefFilter::All, None);
                }
                Teardown::HangupDial { station, dial } => {
                    tracing::debug!(station = %station.name(), "hanging up station dial");
                    if let Some(dial) = dial {
                        hangup_dial(&dial);
                    }
                }
            }
        }
    }
}

/// Answer an outside line without waiting for media.
pub(crate) fn answer_trunk_chan(chan: &ChannelHandle) {
    chan.raw_answer();
    chan.indicate(Indication::Stop);
}

/// Wait for a dial's worker and release it.
pub(crate) fn hangup_dial(dial: &DialHandle) {
    dial.join();
    dial.destroy();
}
