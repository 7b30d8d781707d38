//! Worker threads that place outbound calls and bridge answered legs.
//!
//! Each worker is started through the engine's [`Spawn`] and reports back
//! over a one-slot crossbeam channel. The starter blocks on that channel,
//! so bookkeeping the worker does before signalling is visible as soon as
//! the starter continues. A worker that bails out early drops its sender,
//! which wakes the starter just the same.
//!
//! [`Spawn`]: crate::core::engine::Spawn

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};

use crate::core::collaborator::{
    CallerId, ChannelHandle, ConferenceProfile, DialHandle, DialResult, DeviceState, FrameWait,
    Indication,
};
use crate::core::engine::{answer_trunk_chan, hangup_dial, RefFilter, Shared};
use crate::core::model::{conference_name, Station, Trunk, TrunkRef, TrunkState};
use crate::core::ringing::Event;
use crate::core::scheduler::RingCandidate;
use crate::core::SlaError;

/// How often an outbound trunk dial is polled while it progresses.
const TRUNK_DIAL_POLL: Duration = Duration::from_millis(100);

fn split_device(device: &str) -> Result<(&str, &str), SlaError> {
    device
        .split_once('/')
        .filter(|(tech, resource)| !tech.is_empty() && !resource.is_empty())
        .ok_or_else(|| SlaError::InvalidArgument(format!("invalid device `{device}`")))
}

/// Create a dial towards `device` whose state changes wake the coordinator.
fn prepare_dial(shared: &Shared, device: &str) -> Result<DialHandle, SlaError> {
    let (tech, resource) = split_device(device)?;
    let dial = shared.collab.dialer.create()?;
    if let Err(e) = dial.append(tech, resource) {
        dial.destroy();
        return Err(e);
    }
    let weak = shared.weak();
    dial.set_state_callback(Box::new(move || {
        if let Some(shared) = weak.upgrade() {
            shared.queue_event(Event::DialState);
        }
    }));
    Ok(dial)
}

/// Clear a leg's caller identity, returning what it was.
fn hide_caller_id(shared: &Shared, chan: Option<&ChannelHandle>) -> Option<CallerId> {
    if shared.attempt_callerid() {
        return None;
    }
    let chan = chan?;
    let saved = chan.caller_id();
    chan.set_caller_id(CallerId::default());
    Some(saved)
}

fn restore_caller_id(chan: Option<&ChannelHandle>, saved: Option<CallerId>) {
    if let (Some(chan), Some(saved)) = (chan, saved) {
        chan.set_caller_id(saved);
    }
}

/// Start dialing a station for a ringing trunk.
///
/// Returns once the dial is either tracked as ringing or has failed.
pub(crate) fn ring_station(shared: &Shared, candidate: &RingCandidate) {
    let Some(owner) = shared.weak().upgrade() else {
        return;
    };
    let station = Arc::clone(&candidate.station);
    let trunk = Arc::clone(&candidate.trunk);
    let (done_tx, done_rx) = bounded::<()>(1);

    let name = format!("sla-ring-{}", station.name());
    let job_station = Arc::clone(&station);
    let spawned = shared.spawner.spawn(
        &name,
        Box::new(move || dial_station(&owner, &job_station, &trunk, &done_tx)),
    );
    match spawned {
        Ok(_) => {
            let _ = done_rx.recv();
        }
        Err(e) => {
            tracing::error!(station = %station.name(), error = %e, "could not start ring worker");
            shared.coord.lock().record_failure(station, Instant::now());
        }
    }
}

fn dial_station(shared: &Shared, station: &Arc<Station>, trunk: &Arc<Trunk>, done: &Sender<()>) {
    let device = station.settings().device;
    let dial = match prepare_dial(shared, &device) {
        Ok(dial) => dial,
        Err(e) => {
            tracing::warn!(station = %station.name(), error = %e, "station dial setup failed");
            shared.coord.lock().record_failure(Arc::clone(station), Instant::now());
            let _ = done.send(());
            return;
        }
    };

    let line = trunk.channel();
    let saved = hide_caller_id(shared, line.as_ref());
    let result = dial.run(line.as_ref());
    restore_caller_id(line.as_ref(), saved);

    if result != DialResult::Trying {
        tracing::info!(station = %station.name(), ?result, "station dial failed");
        dial.destroy();
        shared.coord.lock().record_failure(Arc::clone(station), Instant::now());
        let _ = done.send(());
        return;
    }

    let tracked = {
        let mut state = shared.coord.lock();
        let added = state.add_ringing_station(Arc::clone(station), Instant::now());
        if added {
            station.lock().dial = Some(Arc::clone(&dial));
        }
        added
    };
    if tracked {
        tracing::debug!(station = %station.name(), trunk = %trunk.name(), "station ringing");
    } else {
        tracing::debug!(station = %station.name(), "station already ringing, dropping extra dial");
        hangup_dial(&dial);
    }
    let _ = done.send(());
}

/// Start the worker that bridges a station which answered a ringing trunk.
///
/// Returns once the station is engaged in the trunk's call.
pub(crate) fn start_station_join(shared: &Shared, station: &Arc<Station>, trunk_ref: &Arc<TrunkRef>) {
    let Some(owner) = shared.weak().upgrade() else {
        return;
    };
    let (done_tx, done_rx) = bounded::<()>(1);
    let job_station = Arc::clone(station);
    let job_ref = Arc::clone(trunk_ref);

    let spawned = shared.spawner.spawn(
        &format!("sla-station-{}", station.name()),
        Box::new(move || run_station(&owner, &job_station, &job_ref, &done_tx)),
    );
    match spawned {
        Ok(_) => {
            let _ = done_rx.recv();
        }
        Err(e) => {
            tracing::error!(station = %station.name(), error = %e, "could not start station worker");
            let chan = trunk_ref.lock().chan.take();
            if let Some(chan) = chan {
                chan.soft_hangup();
            }
            shared.change_trunk_state(trunk_ref.trunk(), TrunkState::Idle, RefFilter::All, None);
            if let Some(dial) = station.take_dial() {
                hangup_dial(&dial);
            }
        }
    }
}

fn run_station(shared: &Shared, station: &Arc<Station>, trunk_ref: &Arc<TrunkRef>, done: &Sender<()>) {
    shared.begin_station_leg(station, trunk_ref);
    let _ = done.send(());

    let chan = trunk_ref.lock().chan.clone();
    match chan {
        Some(chan) => {
            answer_trunk_chan(&chan);
            shared.run_station_leg(station, trunk_ref, &chan);
        }
        None => shared.end_station_leg(station, trunk_ref),
    }

    if let Some(dial) = station.take_dial() {
        hangup_dial(&dial);
    }
    tracing::debug!(station = %station.name(), "station worker finished");
}

/// Place an outbound call on an idle trunk for a station going off-hook.
///
/// Blocks until the far end answers or the attempt is abandoned. Returns
/// whether the trunk now has an outside leg; on success a worker keeps the
/// trunk bridged into its conference until the line ends.
pub(crate) fn seize_trunk(
    shared: &Shared,
    station: &Arc<Station>,
    trunk_ref: &Arc<TrunkRef>,
    chan: &ChannelHandle,
) -> bool {
    let Some(owner) = shared.weak().upgrade() else {
        return false;
    };
    let trunk = Arc::clone(trunk_ref.trunk());
    let (done_tx, done_rx) = bounded::<bool>(1);
    let job_station = Arc::clone(station);
    let job_chan = Arc::clone(chan);

    let spawned = shared.spawner.spawn(
        &format!("sla-trunk-{}", trunk.name()),
        Box::new(move || dial_trunk(&owner, &job_station, &trunk, &job_chan, &done_tx)),
    );
    match spawned {
        Ok(_) => done_rx.recv().unwrap_or(false),
        Err(e) => {
            tracing::error!(station = %station.name(), error = %e, "could not start trunk worker");
            false
        }
    }
}

fn dial_trunk(
    shared: &Shared,
    station: &Arc<Station>,
    trunk: &Arc<Trunk>,
    caller: &ChannelHandle,
    done: &Sender<bool>,
) {
    let device = trunk.settings().device;
    let dial = match prepare_dial(shared, &device) {
        Ok(dial) => dial,
        Err(e) => {
            tracing::warn!(trunk = %trunk.name(), error = %e, "trunk dial setup failed");
            return;
        }
    };

    let saved = hide_caller_id(shared, Some(caller));
    let result = dial.run(Some(caller));
    restore_caller_id(Some(caller), saved);
    if result != DialResult::Trying {
        tracing::info!(trunk = %trunk.name(), ?result, "trunk dial failed");
        dial.destroy();
        return;
    }

    let answered = await_trunk_answer(shared, station, trunk, &dial, caller);

    let Some(line) = answered else {
        let _ = done.send(false);
        hangup_dial(&dial);
        return;
    };
    trunk.lock().chan = Some(Arc::clone(&line));
    tracing::info!(trunk = %trunk.name(), station = %station.name(), "trunk seized");
    let _ = done.send(true);

    let conf = conference_name(trunk.name());
    if let Err(e) = shared
        .collab
        .conference
        .join(&line, &conf, &ConferenceProfile::trunk(), None)
    {
        tracing::warn!(trunk = %trunk.name(), error = %e, "trunk could not join conference");
    }

    shared.change_trunk_state(trunk, TrunkState::Idle, RefFilter::All, None);
    trunk.lock().line_ended();
    hangup_dial(&dial);
    tracing::debug!(trunk = %trunk.name(), "outbound trunk call ended");
}

/// Poll an outbound trunk dial, relaying progress to the station leg.
///
/// Gives up if the station goes back on-hook before the far end answers.
fn await_trunk_answer(
    shared: &Shared,
    station: &Station,
    trunk: &Trunk,
    dial: &DialHandle,
    caller: &ChannelHandle,
) -> Option<ChannelHandle> {
    let mut last: Option<Indication> = None;
    loop {
        let current = match dial.state() {
            DialResult::Answered => return dial.answered(),
            DialResult::Hangup
            | DialResult::Invalid
            | DialResult::Failed
            | DialResult::Timeout
            | DialResult::Unanswered => return None,
            DialResult::Trying => Indication::Progress,
            DialResult::Ringing | DialResult::Progress | DialResult::Proceeding => {
                Indication::Ringing
            }
        };

        let device = station.settings().device;
        if shared.device_state_of(&device) == DeviceState::NotInUse {
            tracing::debug!(station = %station.name(), trunk = %trunk.name(), "originating station no longer active");
            return None;
        }

        if last != Some(current) {
            caller.indicate(current);
            last = Some(current);
        }

        if caller.wait_for_frame(TRUNK_DIAL_POLL) == FrameWait::Hangup {
            tracing::debug!(station = %station.name(), trunk = %trunk.name(), "station hung up while seizing trunk");
            return None;
        }
    }
}
