//! The coordinator loop and its event handlers.
//!
//! One thread drains the event queue. When the queue is empty it runs the
//! timer passes and sleeps on the wake condvar until the next ring timeout
//! or delay expiry, or until a new event arrives. Handlers run with the
//! coordination lock released and only take it for short bookkeeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::MutexGuard;

use crate::core::collaborator::{ChannelHandle, DialResult, Indication};
use crate::core::dial_worker;
use crate::core::engine::{answer_trunk_chan, hangup_dial, RefFilter, Shared};
use crate::core::model::{HoldTransition, Station, TrunkRef, TrunkState};
use crate::core::ringing::{CoordState, Event};
use crate::core::scheduler::{self, Teardown};

/// Body of the coordinator thread.
pub(crate) fn run(shared: &Arc<Shared>) {
    tracing::info!("coordinator loop started");
    let mut state = shared.coord.lock();

    while !state.stop {
        let mut have_timeout = false;
        if state.events.is_empty() {
            let next_wake = process_timers(shared, &mut state);
            // A timer pass may queue a re-evaluation; handle it before sleeping.
            if state.events.is_empty() && !state.stop {
                if let Some(wait) = next_wake {
                    have_timeout = true;
                    tracing::trace!(wait_ms = wait.as_millis(), "coordinator sleeping");
                    let _ = shared.wake.wait_for(&mut state, wait);
                } else {
                    shared.wake.wait(&mut state);
                }
            }
            if state.stop {
                break;
            }
        }

        if have_timeout {
            process_timers(shared, &mut state);
        }

        while let Some(event) = state.events.pop_front() {
            MutexGuard::unlocked(&mut state, || handle_event(shared, event));
        }
    }

    let ringing = state.ringing_stations.len();
    let failed = state.failed_stations.len();
    state.ringing_stations.clear();
    state.failed_stations.clear();
    state.running = false;
    drop(state);
    tracing::info!(ringing, failed, "coordinator loop stopped");
}

/// Run the timer passes, queue a ringing re-evaluation if anything changed
/// and perform the resulting cleanup with the lock released.
fn process_timers(shared: &Shared, state: &mut MutexGuard<'_, CoordState>) -> Option<Duration> {
    let stations = shared.stations.snapshot();
    let outcome = scheduler::process_timers(state, &stations, Instant::now());
    if outcome.changed {
        state.events.push_back(Event::RingingTrunk);
    }
    if !outcome.teardown.is_empty() {
        let teardown = outcome.teardown;
        MutexGuard::unlocked(state, || shared.run_teardown(teardown));
    }
    outcome.next_wake
}

fn handle_event(shared: &Shared, event: Event) {
    match event {
        Event::Hold { station, trunk_ref } => handle_hold(shared, &station, &trunk_ref),
        Event::DialState => handle_dial_state(shared),
        Event::RingingTrunk => handle_ringing_trunk(shared),
    }
}

/// A station parked its call.
fn handle_hold(shared: &Shared, station: &Arc<Station>, trunk_ref: &Arc<TrunkRef>) {
    let trunk = trunk_ref.trunk();
    tracing::info!(station = %station.name(), trunk = %trunk.name(), "station put trunk on hold");

    shared.set_ref_state(station, trunk_ref, TrunkState::OnHoldByMe);
    shared.change_trunk_state(trunk, TrunkState::OnHold, RefFilter::Inactive, Some(trunk_ref));

    let (transition, line) = {
        let mut inner = trunk.lock();
        (inner.park_station(station.name()), inner.chan.clone())
    };
    if transition == HoldTransition::Entered {
        if let Some(line) = line {
            line.indicate(Indication::Hold);
        }
    }

    let leg = trunk_ref.lock().chan.take();
    if let Some(leg) = leg {
        leg.soft_hangup();
    }
}

/// Re-examine every station dial after a state change.
fn handle_dial_state(shared: &Shared) {
    let ringing: Vec<Arc<Station>> = shared
        .coord
        .lock()
        .ringing_stations
        .iter()
        .map(|r| Arc::clone(&r.station))
        .collect();

    for station in ringing {
        let Some(dial) = station.dial() else {
            continue;
        };
        let result = dial.state();
        if result.is_terminal_failure() {
            shared.coord.lock().take_ringing_station(&station);
            tracing::debug!(station = %station.name(), ?result, "station dial ended");
            if let Some(dial) = station.take_dial() {
                hangup_dial(&dial);
            }
            continue;
        }
        if result != DialResult::Answered {
            continue;
        }

        answer_station(shared, &station, dial.answered());
        shared.queue_event(Event::RingingTrunk);
        shared.queue_event(Event::DialState);
        break;
    }
}

/// A ringing station picked up: claim the trunk it should be connected to.
fn answer_station(shared: &Shared, station: &Arc<Station>, answered: Option<ChannelHandle>) {
    let claim = {
        let mut state = shared.coord.lock();
        if state.take_ringing_station(station).is_none() {
            return;
        }
        if answered.is_some() {
            let refs = station.trunk_refs();
            state.claim_ringing_trunk(station, &refs)
        } else {
            None
        }
    };

    let (Some((ringing, trunk_ref)), Some(answered)) = (claim, answered) else {
        tracing::debug!(station = %station.name(), "found no ringing trunk for station to answer");
        if let Some(dial) = station.take_dial() {
            hangup_dial(&dial);
        }
        return;
    };

    tracing::info!(
        station = %station.name(),
        trunk = %ringing.trunk.name(),
        ring_id = %ringing.id,
        "station answered ringing trunk"
    );
    trunk_ref.lock().chan = Some(answered);
    if let Some(line) = ringing.trunk.channel() {
        answer_trunk_chan(&line);
    }
    shared.change_trunk_state(&ringing.trunk, TrunkState::Up, RefFilter::All, None);
    dial_worker::start_station_join(shared, station, &trunk_ref);
}

/// The set of ringing trunks changed: ring whoever should ring and stop
/// ringing stations with nothing left to answer.
fn handle_ringing_trunk(shared: &Shared) {
    let candidates = scheduler::ring_candidates(&mut shared.coord.lock(), Instant::now());
    for candidate in candidates {
        dial_worker::ring_station(shared, &candidate);
    }

    let stale: Vec<Teardown> = scheduler::stale_ringing_stations(&mut shared.coord.lock());
    shared.run_teardown(stale);
}
