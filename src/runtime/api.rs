//! Serializable snapshots of the live registry.

use serde::{Deserialize, Serialize};

use crate::core::{Engine, HoldAccess, Station, Trunk, TrunkState};

/// One trunk as seen by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkSnapshot {
    /// Trunk name.
    pub name: String,
    /// Dial target.
    pub device: String,
    /// Autocontext, if any.
    pub autocontext: Option<String>,
    /// Ring timeout in seconds.
    pub ring_timeout_secs: Option<u64>,
    /// Whether stations may barge into a call already up.
    pub barge: bool,
    /// Hold retrieval policy.
    pub hold: HoldAccess,
    /// Member station names in configuration order.
    pub stations: Vec<String>,
    /// Stations engaged in the current call.
    pub active_stations: usize,
    /// Stations that parked the current call.
    pub hold_stations: usize,
    /// Whether the outside line is on hold.
    pub on_hold: bool,
    /// Whether an outside leg is attached.
    pub in_call: bool,
}

/// One station's pairing with a trunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkRefSnapshot {
    /// Trunk name.
    pub trunk: String,
    /// Live state.
    pub state: TrunkState,
    /// Per-pair ring timeout in seconds.
    pub ring_timeout_secs: Option<u64>,
    /// Per-pair ring delay in seconds.
    pub ring_delay_secs: Option<u64>,
}

/// One station as seen by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSnapshot {
    /// Station name.
    pub name: String,
    /// Dial target.
    pub device: String,
    /// Autocontext, if any.
    pub autocontext: Option<String>,
    /// Ring timeout in seconds.
    pub ring_timeout_secs: Option<u64>,
    /// Ring delay in seconds.
    pub ring_delay_secs: Option<u64>,
    /// Hold retrieval policy.
    pub hold: HoldAccess,
    /// Trunks in priority order.
    pub trunks: Vec<TrunkRefSnapshot>,
}

/// Engine-wide status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Whether the coordinator loop is running.
    pub running: bool,
    /// Configured trunks.
    pub trunks: usize,
    /// Configured stations.
    pub stations: usize,
    /// Trunks ringing inbound.
    pub ringing_trunks: usize,
    /// Stations being dialed.
    pub ringing_stations: Vec<String>,
}

/// Snapshot one trunk.
#[must_use]
pub fn trunk_snapshot(trunk: &Trunk) -> TrunkSnapshot {
    let inner = trunk.lock();
    TrunkSnapshot {
        name: trunk.name().to_owned(),
        device: inner.settings.device.clone(),
        autocontext: inner.settings.autocontext.clone(),
        ring_timeout_secs: inner.settings.ring_timeout.map(|d| d.as_secs()),
        barge: !inner.settings.barge_disabled,
        hold: inner.settings.hold_access,
        stations: inner
            .stations
            .iter()
            .map(|r| r.station_name().to_owned())
            .collect(),
        active_stations: inner.active.len(),
        hold_stations: inner.holders.len(),
        on_hold: inner.on_hold,
        in_call: inner.chan.is_some(),
    }
}

/// Snapshot one station.
#[must_use]
pub fn station_snapshot(station: &Station) -> StationSnapshot {
    let settings = station.settings();
    let trunks = station
        .trunk_refs()
        .iter()
        .map(|r| TrunkRefSnapshot {
            trunk: r.trunk().name().to_owned(),
            state: r.state(),
            ring_timeout_secs: r.ring_timeout().map(|d| d.as_secs()),
            ring_delay_secs: r.ring_delay().map(|d| d.as_secs()),
        })
        .collect();
    StationSnapshot {
        name: station.name().to_owned(),
        device: settings.device,
        autocontext: settings.autocontext,
        ring_timeout_secs: settings.ring_timeout.map(|d| d.as_secs()),
        ring_delay_secs: settings.ring_delay.map(|d| d.as_secs()),
        hold: settings.hold_access,
        trunks,
    }
}

/// All trunks ordered by name.
#[must_use]
pub fn list_trunks(engine: &Engine) -> Vec<TrunkSnapshot> {
    engine.trunks().iter().map(|t| trunk_snapshot(t)).collect()
}

/// All stations ordered by name.
#[must_use]
pub fn list_stations(engine: &Engine) -> Vec<StationSnapshot> {
    engine.stations().iter().map(|s| station_snapshot(s)).collect()
}

/// Engine-wide status payload.
#[must_use]
pub fn engine_status(engine: &Engine) -> EngineStatus {
    EngineStatus {
        running: engine.is_running(),
        trunks: engine.trunks().len(),
        stations: engine.stations().len(),
        ringing_trunks: engine.ringing_trunk_count(),
        ringing_stations: engine.ringing_station_names(),
    }
}
