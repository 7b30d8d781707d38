//! Trunks, stations and the membership records linking them.
//!
//! A [`Station`] owns its [`TrunkRef`]s, each holding a strong handle to the
//! [`Trunk`] it refers to. A trunk lists its members through [`StationRef`]s
//! that only hold a [`Weak`] handle back to the station, so the graph never
//! forms an ownership cycle. The registries are the only other strong owners.
//!
//! Lock order is station, then trunk ref, then trunk. Code that walks from a
//! trunk to its stations copies the member list first and drops the trunk
//! lock before touching any station.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::core::collaborator::{ChannelHandle, DeviceState, DialHandle};

/// Live call state of one station/trunk pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrunkState {
    /// Nothing happening on the trunk.
    Idle,
    /// The trunk is ringing inbound.
    Ringing,
    /// A call is up on the trunk.
    Up,
    /// Another station put the call on hold.
    OnHold,
    /// This station put the call on hold.
    OnHoldByMe,
}

impl TrunkState {
    /// Lamp state shown for this pairing.
    #[must_use]
    pub const fn device_state(self) -> DeviceState {
        match self {
            Self::Idle => DeviceState::NotInUse,
            Self::Ringing => DeviceState::Ringing,
            Self::Up => DeviceState::InUse,
            Self::OnHold | Self::OnHoldByMe => DeviceState::OnHold,
        }
    }

    /// Short label used in snapshots and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Ringing => "RINGING",
            Self::Up => "UP",
            Self::OnHold => "ON_HOLD",
            Self::OnHoldByMe => "ON_HOLD_BY_ME",
        }
    }
}

/// Who may retrieve a held call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldAccess {
    /// Any station may retrieve it.
    #[default]
    Open,
    /// Only the station that placed the hold may retrieve it.
    Private,
}

/// Device name used for the lamp of one pairing.
#[must_use]
pub fn pairing_device(station: &str, trunk: &str) -> String {
    format!("SLA:{station}_{trunk}")
}

/// Conference carrying the call of a trunk.
#[must_use]
pub fn conference_name(trunk: &str) -> String {
    format!("SLA_{trunk}")
}

/// Change of a trunk's on-hold flag after a hold bookkeeping update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldTransition {
    /// Flag did not change.
    Unchanged,
    /// Trunk went on hold; the outside line should hear hold.
    Entered,
    /// Trunk came off hold; the outside line should be unheld.
    Left,
}

/// What happened when a station leg left a trunk's call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The station parked the call and stays engaged.
    Parked,
    /// Other stations remain; carries the resulting hold change.
    Remaining(HoldTransition),
    /// The last station left; the call must be torn down.
    Empty,
}

/// Trunk-level settings taken from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrunkSettings {
    /// Dial target, `tech/resource`.
    pub device: String,
    /// Dialplan context to register extensions in.
    pub autocontext: Option<String>,
    /// Give up ringing inbound after this long.
    pub ring_timeout: Option<Duration>,
    /// Forbid joining a call already up.
    pub barge_disabled: bool,
    /// Retrieval policy for held calls.
    pub hold_access: HoldAccess,
}

/// A station's membership record kept on a trunk.
#[derive(Debug, Clone)]
pub struct StationRef {
    pub(crate) station: Weak<Station>,
    pub(crate) station_name: String,
    pub(crate) mark: bool,
}

impl StationRef {
    pub(crate) fn new(station: &Arc<Station>) -> Self {
        Self {
            station: Arc::downgrade(station),
            station_name: station.name().to_owned(),
            mark: false,
        }
    }

    /// Name of the member station.
    #[must_use]
    pub fn station_name(&self) -> &str {
        &self.station_name
    }

    /// The member station, if it is still alive.
    #[must_use]
    pub fn station(&self) -> Option<Arc<Station>> {
        self.station.upgrade()
    }

    pub(crate) fn is(&self, station: &Arc<Station>) -> bool {
        std::ptr::eq(self.station.as_ptr(), Arc::as_ptr(station))
    }
}

/// Mutable fields of a trunk.
pub struct TrunkInner {
    pub(crate) settings: TrunkSettings,
    pub(crate) stations: Vec<StationRef>,
    /// Stations engaged in the current call, parked ones included.
    pub(crate) active: BTreeSet<String>,
    /// Stations that parked the current call.
    pub(crate) holders: BTreeSet<String>,
    pub(crate) chan: Option<ChannelHandle>,
    pub(crate) on_hold: bool,
    pub(crate) mark: bool,
}

impl TrunkInner {
    fn sync_hold(&mut self) -> HoldTransition {
        let on_hold = !self.holders.is_empty() && self.holders.len() == self.active.len();
        let transition = match (self.on_hold, on_hold) {
            (false, true) => HoldTransition::Entered,
            (true, false) => HoldTransition::Left,
            _ => HoldTransition::Unchanged,
        };
        self.on_hold = on_hold;
        transition
    }

    /// Engage `station` in the call.
    ///
    /// A station retrieving its own hold stops being a holder. Any other
    /// station picking up a call that is fully on hold takes it over and the
    /// parked stations are released.
    pub(crate) fn join_station(&mut self, station: &str) -> HoldTransition {
        if !self.holders.remove(station) && self.on_hold {
            for parked in std::mem::take(&mut self.holders) {
                self.active.remove(&parked);
            }
        }
        self.active.insert(station.to_owned());
        self.sync_hold()
    }

    /// Record that `station` parked the call.
    pub(crate) fn park_station(&mut self, station: &str) -> HoldTransition {
        if self.active.contains(station) {
            self.holders.insert(station.to_owned());
        }
        self.sync_hold()
    }

    /// A station leg left the conference.
    pub(crate) fn leave_station(&mut self, station: &str) -> LeaveOutcome {
        if self.holders.contains(station) {
            return LeaveOutcome::Parked;
        }
        self.active.remove(station);
        if self.active.is_empty() {
            self.holders.clear();
            self.on_hold = false;
            return LeaveOutcome::Empty;
        }
        LeaveOutcome::Remaining(self.sync_hold())
    }

    /// The outside line ended; parked stations are released.
    pub(crate) fn line_ended(&mut self) {
        for parked in std::mem::take(&mut self.holders) {
            self.active.remove(&parked);
        }
        self.chan = None;
        self.on_hold = false;
    }

    pub(crate) fn is_engaged(&self, station: &str) -> bool {
        self.active.contains(station)
    }
}

/// A shared outside line.
pub struct Trunk {
    name: String,
    inner: Mutex<TrunkInner>,
}

impl Trunk {
    /// Create a trunk with no members.
    #[must_use]
    pub fn new(name: impl Into<String>, settings: TrunkSettings) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(TrunkInner {
                settings,
                stations: Vec::new(),
                active: BTreeSet::new(),
                holders: BTreeSet::new(),
                chan: None,
                on_hold: false,
                mark: false,
            }),
        }
    }

    /// Trunk name as configured.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TrunkInner> {
        self.inner.lock()
    }

    /// Copy of the configured settings.
    #[must_use]
    pub fn settings(&self) -> TrunkSettings {
        self.inner.lock().settings.clone()
    }

    /// Number of member stations.
    #[must_use]
    pub fn num_stations(&self) -> usize {
        self.inner.lock().stations.len()
    }

    /// Number of stations engaged in the current call.
    #[must_use]
    pub fn active_stations(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Number of stations that parked the current call.
    #[must_use]
    pub fn hold_stations(&self) -> usize {
        self.inner.lock().holders.len()
    }

    /// Whether the outside line is on hold.
    #[must_use]
    pub fn on_hold(&self) -> bool {
        self.inner.lock().on_hold
    }

    /// Whether an outside call leg is attached.
    #[must_use]
    pub fn has_channel(&self) -> bool {
        self.inner.lock().chan.is_some()
    }

    /// The attached outside call leg.
    #[must_use]
    pub fn channel(&self) -> Option<ChannelHandle> {
        self.inner.lock().chan.clone()
    }

    /// Names of member stations in configuration order.
    #[must_use]
    pub fn station_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .stations
            .iter()
            .map(|r| r.station_name.clone())
            .collect()
    }

    /// Live member stations in configuration order.
    #[must_use]
    pub fn member_stations(&self) -> Vec<Arc<Station>> {
        self.inner
            .lock()
            .stations
            .iter()
            .filter_map(StationRef::station)
            .collect()
    }
}

impl std::fmt::Debug for Trunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trunk").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Mutable fields of a trunk ref.
pub struct TrunkRefInner {
    pub(crate) state: TrunkState,
    pub(crate) chan: Option<ChannelHandle>,
    pub(crate) ring_timeout: Option<Duration>,
    pub(crate) ring_delay: Option<Duration>,
    pub(crate) mark: bool,
}

/// A station's view of one trunk.
pub struct TrunkRef {
    trunk: Arc<Trunk>,
    inner: Mutex<TrunkRefInner>,
}

impl TrunkRef {
    /// Create an idle pairing with the given per-pair overrides.
    #[must_use]
    pub fn new(trunk: Arc<Trunk>, ring_timeout: Option<Duration>, ring_delay: Option<Duration>) -> Self {
        Self {
            trunk,
            inner: Mutex::new(TrunkRefInner {
                state: TrunkState::Idle,
                chan: None,
                ring_timeout,
                ring_delay,
                mark: false,
            }),
        }
    }

    /// The trunk this pairing refers to. Fixed for the ref's lifetime.
    #[must_use]
    pub const fn trunk(&self) -> &Arc<Trunk> {
        &self.trunk
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TrunkRefInner> {
        self.inner.lock()
    }

    /// Current call state.
    #[must_use]
    pub fn state(&self) -> TrunkState {
        self.inner.lock().state
    }

    /// Per-pair ring timeout override.
    #[must_use]
    pub fn ring_timeout(&self) -> Option<Duration> {
        self.inner.lock().ring_timeout
    }

    /// Per-pair ring delay override.
    #[must_use]
    pub fn ring_delay(&self) -> Option<Duration> {
        self.inner.lock().ring_delay
    }

    /// Whether the station has a leg connected through this pairing.
    #[must_use]
    pub fn has_channel(&self) -> bool {
        self.inner.lock().chan.is_some()
    }

    pub(crate) fn refers_to(&self, trunk: &Arc<Trunk>) -> bool {
        Arc::ptr_eq(&self.trunk, trunk)
    }
}

impl std::fmt::Debug for TrunkRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrunkRef")
            .field("trunk", &self.trunk.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Station-level settings taken from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationSettings {
    /// Dial target, `tech/resource`.
    pub device: String,
    /// Dialplan context to register extensions in.
    pub autocontext: Option<String>,
    /// Stop ringing the station after this long.
    pub ring_timeout: Option<Duration>,
    /// Wait this long after a trunk starts ringing before ringing.
    pub ring_delay: Option<Duration>,
    /// Retrieval policy for calls this station parks.
    pub hold_access: HoldAccess,
}

/// Mutable fields of a station.
pub struct StationInner {
    pub(crate) settings: StationSettings,
    pub(crate) trunks: Vec<Arc<TrunkRef>>,
    pub(crate) dial: Option<DialHandle>,
    pub(crate) mark: bool,
}

impl StationInner {
    /// First pairing with `trunk`.
    pub(crate) fn find_ref(&self, trunk: &Arc<Trunk>) -> Option<Arc<TrunkRef>> {
        self.trunks.iter().find(|r| r.refers_to(trunk)).cloned()
    }
}

/// A user-facing line.
pub struct Station {
    name: String,
    inner: Mutex<StationInner>,
}

impl Station {
    /// Create a station with no trunks.
    #[must_use]
    pub fn new(name: impl Into<String>, settings: StationSettings) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(StationInner {
                settings,
                trunks: Vec::new(),
                dial: None,
                mark: false,
            }),
        }
    }

    /// Station name as configured.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, StationInner> {
        self.inner.lock()
    }

    /// Copy of the configured settings.
    #[must_use]
    pub fn settings(&self) -> StationSettings {
        self.inner.lock().settings.clone()
    }

    /// Trunk refs in priority order.
    #[must_use]
    pub fn trunk_refs(&self) -> Vec<Arc<TrunkRef>> {
        self.inner.lock().trunks.clone()
    }

    /// This station's pairing with `trunk`.
    #[must_use]
    pub fn find_ref(&self, trunk: &Arc<Trunk>) -> Option<Arc<TrunkRef>> {
        self.inner.lock().find_ref(trunk)
    }

    /// Whether any pairing has a connected leg.
    #[must_use]
    pub fn in_use(&self) -> bool {
        self.inner.lock().trunks.iter().any(|r| r.has_channel())
    }

    /// Whether an outbound dial to this station is in flight.
    #[must_use]
    pub fn is_dialing(&self) -> bool {
        self.inner.lock().dial.is_some()
    }

    pub(crate) fn take_dial(&self) -> Option<DialHandle> {
        self.inner.lock().dial.take()
    }

    pub(crate) fn dial(&self) -> Option<DialHandle> {
        self.inner.lock().dial.clone()
    }
}

impl std::fmt::Debug for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station").field("name", &self.name).finish_non_exhaustive()
    }
}
