//! Call-leg entry points: a station going off-hook, a trunk receiving an
//! inbound call, and the line-key lamp query.

use std::sync::Arc;
use std::time::Instant;

use crate::core::collaborator::{ChannelHandle, ConferenceProfile, DeviceState, Indication};
use crate::core::dial_worker;
use crate::core::engine::{answer_trunk_chan, Engine, RefFilter, STATION_STATUS_VAR, TRUNK_STATUS_VAR};
use crate::core::model::{conference_name, HoldAccess, Station, Trunk, TrunkRef, TrunkState};
use crate::core::ringing::Event;
use crate::core::SlaError;

/// Result of a station leg, also written to `SLASTATION_STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatus {
    /// Bad argument or unknown station.
    Failure,
    /// No usable trunk.
    Congestion,
    /// The station was bridged.
    Success,
}

impl StationStatus {
    /// Channel variable value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Failure => "FAILURE",
            Self::Congestion => "CONGESTION",
            Self::Success => "SUCCESS",
        }
    }

}

/// Result of an inbound trunk leg, also written to `SLATRUNK_STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrunkStatus {
    /// Unknown trunk or trunk already in use.
    Failure,
    /// A station answered and the call completed.
    Success,
    /// The caller hung up before any station answered.
    Unanswered,
    /// The trunk's ring timeout expired.
    RingTimeout,
}

impl TrunkStatus {
    /// Channel variable value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Failure => "FAILURE",
            Self::Success => "SUCCESS",
            Self::Unanswered => "UNANSWERED",
            Self::RingTimeout => "RINGTIMEOUT",
        }
    }

    /// Parse a channel variable value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FAILURE" => Some(Self::Failure),
            "SUCCESS" => Some(Self::Success),
            "UNANSWERED" => Some(Self::Unanswered),
            "RINGTIMEOUT" => Some(Self::RingTimeout),
            _ => None,
        }
    }
}

/// Parsed trunk-leg argument.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TrunkArgs<'a> {
    trunk: &'a str,
    /// `Some` when music-on-hold was requested, with the optional class.
    music_on_hold: Option<Option<&'a str>>,
}

fn parse_trunk_args(data: &str) -> Result<TrunkArgs<'_>, SlaError> {
    let (trunk, options) = data.split_once(',').unwrap_or((data, ""));
    let trunk = trunk.trim();
    if trunk.is_empty() {
        return Err(SlaError::InvalidArgument("trunk name required".into()));
    }
    let options = options.trim();
    let music_on_hold = match options {
        "" => None,
        "M" => Some(None),
        _ => {
            let class = options
                .strip_prefix("M(")
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| SlaError::InvalidArgument(format!("unknown trunk option `{options}`")))?;
            Some(Some(class).filter(|c| !c.is_empty()))
        }
    };
    Ok(TrunkArgs { trunk, music_on_hold })
}

fn finish_station(chan: &ChannelHandle, status: StationStatus) -> StationStatus {
    chan.set_var(STATION_STATUS_VAR, status.as_str());
    status
}

/// Whether a station other than `station` holds `trunk` privately.
///
/// Only the first other member station with a ref to the trunk is
/// consulted.
fn held_privately_elsewhere(trunk: &Arc<Trunk>, station: &Arc<Station>) -> bool {
    for member in trunk.member_stations() {
        if Arc::ptr_eq(&member, station) {
            continue;
        }
        let Some(trunk_ref) = member.find_ref(trunk) else {
            continue;
        };
        return trunk_ref.state() == TrunkState::OnHoldByMe
            && member.settings().hold_access == HoldAccess::Private;
    }
    false
}

/// The station's ref to the trunk called `name`, if the station may use it.
fn find_trunk_ref_byname(station: &Arc<Station>, name: &str) -> Option<Arc<TrunkRef>> {
    let trunk_ref = station
        .trunk_refs()
        .into_iter()
        .find(|r| r.trunk().name().eq_ignore_ascii_case(name))?;
    let trunk = trunk_ref.trunk();
    let settings = trunk.settings();
    let state = trunk_ref.state();

    if settings.barge_disabled && state == TrunkState::Up {
        tracing::info!(station = %station.name(), trunk = %trunk.name(), "barge disabled, trunk in use");
        return None;
    }
    if trunk.hold_stations() > 0
        && settings.hold_access == HoldAccess::Private
        && state != TrunkState::OnHoldByMe
    {
        tracing::info!(station = %station.name(), trunk = %trunk.name(), "trunk held privately");
        return None;
    }
    if held_privately_elsewhere(trunk, station) {
        tracing::info!(station = %station.name(), trunk = %trunk.name(), "trunk held privately by another station");
        return None;
    }
    Some(trunk_ref)
}

fn choose_idle_trunk(station: &Station) -> Option<Arc<TrunkRef>> {
    station
        .trunk_refs()
        .into_iter()
        .find(|r| r.state() == TrunkState::Idle)
}

impl Engine {
    /// Handle a station going off-hook.
    ///
    /// `data` is the station name, optionally followed by `_` and a trunk
    /// name to pick a specific line key. Blocks until the station leaves
    /// the call.
    pub fn station_exec(&self, chan: &ChannelHandle, data: &str) -> StationStatus {
        let shared = &self.shared;
        if data.is_empty() {
            tracing::warn!(channel = %chan.name(), "station leg requires an argument");
            return finish_station(chan, StationStatus::Failure);
        }
        let (station_name, trunk_name) = match data.split_once('_') {
            Some((station, trunk)) => (station, Some(trunk)),
            None => (data, None),
        };
        if station_name.is_empty() {
            tracing::warn!(channel = %chan.name(), "invalid station argument");
            return finish_station(chan, StationStatus::Failure);
        }
        let Some(station) = shared.stations.find(station_name) else {
            tracing::warn!(station = %station_name, "station not found");
            return finish_station(chan, StationStatus::Failure);
        };

        let trunk_ref = match trunk_name {
            Some(name) => find_trunk_ref_byname(&station, name),
            None => choose_idle_trunk(&station),
        };
        let Some(trunk_ref) = trunk_ref else {
            match trunk_name {
                Some(name) => tracing::info!(station = %station.name(), trunk = %name, "trunk not available to station"),
                None => tracing::info!(station = %station.name(), "no idle trunk for station"),
            }
            return finish_station(chan, StationStatus::Congestion);
        };
        let trunk = Arc::clone(trunk_ref.trunk());

        if trunk_ref.state() == TrunkState::Ringing {
            let claimed = shared.coord.lock().take_ringing_trunk(&trunk);
            match claimed {
                Some(ringing) => {
                    tracing::info!(station = %station.name(), trunk = %trunk.name(), ring_id = %ringing.id, "station picked up ringing trunk");
                    if let Some(line) = trunk.channel() {
                        answer_trunk_chan(&line);
                    }
                    shared.change_trunk_state(&trunk, TrunkState::Up, RefFilter::All, None);
                    shared.queue_event(Event::RingingTrunk);
                    shared.queue_event(Event::DialState);
                }
                None => {
                    tracing::debug!(station = %station.name(), trunk = %trunk.name(), "ringing trunk already claimed");
                }
            }
        }

        trunk_ref.lock().chan = Some(Arc::clone(chan));

        if !trunk.has_channel() {
            shared.change_trunk_state(&trunk, TrunkState::Up, RefFilter::All, None);
            if !dial_worker::seize_trunk(shared, &station, &trunk_ref, chan) {
                tracing::info!(station = %station.name(), trunk = %trunk.name(), "could not seize trunk");
                trunk_ref.lock().chan = None;
                shared.change_trunk_state(&trunk, TrunkState::Idle, RefFilter::All, None);
                return finish_station(chan, StationStatus::Congestion);
            }
        }

        shared.begin_station_leg(&station, &trunk_ref);
        chan.answer();
        shared.run_station_leg(&station, &trunk_ref, chan);
        finish_station(chan, StationStatus::Success)
    }

    /// Handle an inbound call on a trunk.
    ///
    /// `data` is `trunk[,options]`; the only option is `M` or `M(class)` to
    /// play music-on-hold to the caller instead of ringing. Blocks until
    /// the caller leaves.
    ///
    /// # Errors
    ///
    /// Returns [`SlaError::InvalidArgument`] for a malformed argument.
    /// Call outcomes, including an unknown trunk, are statuses.
    pub fn trunk_exec(&self, chan: &ChannelHandle, data: &str) -> Result<TrunkStatus, SlaError> {
        let shared = &self.shared;
        let args = match parse_trunk_args(data) {
            Ok(args) => args,
            Err(e) => {
                tracing::error!(channel = %chan.name(), error = %e, "invalid trunk argument");
                chan.set_var(TRUNK_STATUS_VAR, TrunkStatus::Failure.as_str());
                return Err(e);
            }
        };

        let Some(trunk) = shared.trunks.find(args.trunk) else {
            tracing::error!(trunk = %args.trunk, "trunk not found");
            chan.set_var(TRUNK_STATUS_VAR, TrunkStatus::Failure.as_str());
            return Ok(TrunkStatus::Failure);
        };

        {
            let mut inner = trunk.lock();
            if inner.chan.is_some() {
                drop(inner);
                tracing::error!(trunk = %trunk.name(), "call came in but the trunk is already in use");
                chan.set_var(TRUNK_STATUS_VAR, TrunkStatus::Failure.as_str());
                return Ok(TrunkStatus::Failure);
            }
            inner.chan = Some(Arc::clone(chan));
        }

        shared.change_trunk_state(&trunk, TrunkState::Ringing, RefFilter::All, None);
        let ring_id = shared
            .coord
            .lock()
            .push_ringing_trunk(Arc::clone(&trunk), Instant::now());
        tracing::info!(trunk = %trunk.name(), ring_id = %ring_id, "trunk ringing");
        shared.queue_event(Event::RingingTrunk);

        let mut profile = ConferenceProfile::trunk();
        match args.music_on_hold {
            Some(class) => {
                chan.indicate(Indication::Stop);
                profile.music_on_hold = Some(class.unwrap_or("default").to_owned());
            }
            None => chan.indicate(Indication::Ringing),
        }

        let conf = conference_name(trunk.name());
        if let Err(e) = shared.collab.conference.join(chan, &conf, &profile, None) {
            tracing::warn!(trunk = %trunk.name(), error = %e, "trunk could not join conference");
        }

        trunk.lock().line_ended();
        shared.change_trunk_state(&trunk, TrunkState::Idle, RefFilter::All, None);
        if chan.var(TRUNK_STATUS_VAR).is_none() {
            chan.set_var(TRUNK_STATUS_VAR, TrunkStatus::Success.as_str());
        }

        let still_ringing = shared.coord.lock().take_ringing_trunk(&trunk);
        if let Some(ringing) = still_ringing {
            tracing::info!(trunk = %trunk.name(), ring_id = %ringing.id, "caller hung up before answer");
            chan.set_var(TRUNK_STATUS_VAR, TrunkStatus::Unanswered.as_str());
            shared.queue_event(Event::RingingTrunk);
        }

        let status = chan
            .var(TRUNK_STATUS_VAR)
            .and_then(|v| TrunkStatus::parse(&v))
            .unwrap_or(TrunkStatus::Success);
        Ok(status)
    }

    /// Lamp state of a line key, `data` being `<station>_<trunk>`.
    #[must_use]
    pub fn device_state(&self, data: &str) -> DeviceState {
        let (station_name, trunk_name) = data.split_once('_').unwrap_or((data, ""));
        let state = self
            .shared
            .stations
            .find(station_name)
            .and_then(|station| {
                station
                    .trunk_refs()
                    .into_iter()
                    .find(|r| r.trunk().name().eq_ignore_ascii_case(trunk_name))
            })
            .map(|r| r.state().device_state());
        state.unwrap_or_else(|| {
            tracing::error!(station = %station_name, trunk = %trunk_name, "could not determine line key state");
            DeviceState::Invalid
        })
    }
}
