//! Ring timeout and ring delay bookkeeping.
//!
//! Everything here runs with the coordination lock held and never calls a
//! collaborator. Work that has to touch a call leg or a dial is handed back
//! as [`Teardown`] items for the caller to run once the lock is released.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::collaborator::DialHandle;
use crate::core::model::{Station, Trunk};
use crate::core::ringing::{CoordState, RingingStation, RingingTrunk};

/// Cleanup produced by a timer pass.
pub enum Teardown {
    /// A trunk rang out.
    TrunkTimedOut(RingingTrunk),
    /// A station stopped ringing; its dial must be hung up.
    HangupDial {
        /// The station that was ringing.
        station: Arc<Station>,
        /// Its dial, if one was still attached.
        dial: Option<DialHandle>,
    },
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrunkTimedOut(ringing) => f.debug_tuple("TrunkTimedOut").field(ringing).finish(),
            Self::HangupDial { station, dial } => f
                .debug_struct("HangupDial")
                .field("station", &station.name())
                .field("has_dial", &dial.is_some())
                .finish(),
        }
    }
}

/// Result of one timer pass.
#[derive(Debug, Default)]
pub struct TimerOutcome {
    /// Time until the next timeout or delay expiry.
    pub next_wake: Option<Duration>,
    /// Ringing state changed; ringing must be re-evaluated.
    pub changed: bool,
    /// Cleanup to run outside the coordination lock.
    pub teardown: Vec<Teardown>,
}

impl TimerOutcome {
    fn wake_in(&mut self, left: Duration) {
        self.next_wake = Some(self.next_wake.map_or(left, |w| w.min(left)));
    }
}

/// A station that should start ringing for a ringing trunk.
#[derive(Debug, Clone)]
pub struct RingCandidate {
    /// Station to dial.
    pub station: Arc<Station>,
    /// Trunk whose call the dial is made for.
    pub trunk: Arc<Trunk>,
}

/// Run the trunk, station and delay passes.
pub fn process_timers(state: &mut CoordState, stations: &[Arc<Station>], now: Instant) -> TimerOutcome {
    let mut outcome = TimerOutcome::default();
    calc_trunk_timeouts(state, now, &mut outcome);
    calc_station_timeouts(state, now, &mut outcome);
    calc_station_delays(state, stations, now, &mut outcome);
    outcome
}

fn calc_trunk_timeouts(state: &mut CoordState, now: Instant, outcome: &mut TimerOutcome) {
    let mut i = 0;
    while i < state.ringing_trunks.len() {
        let ringing = &state.ringing_trunks[i];
        let Some(timeout) = ringing.trunk.settings().ring_timeout else {
            i += 1;
            continue;
        };
        let deadline = ringing.ring_begin + timeout;
        if deadline <= now {
            let retired = state.ringing_trunks.remove(i);
            tracing::info!(trunk = %retired.trunk.name(), ring_id = %retired.id, "trunk ring timeout");
            outcome.teardown.push(Teardown::TrunkTimedOut(retired));
            outcome.changed = true;
            continue;
        }
        outcome.wake_in(deadline - now);
        i += 1;
    }
}

/// Deadline for a ringing station, or `None` if nothing bounds its ringing.
///
/// Per-pair timeouts count from each trunk's ring start and the latest one
/// wins. The scan stops at the first ringing trunk without a per-pair
/// timeout. A station-wide timeout, counted from when the station started
/// ringing, caps the result.
fn station_deadline(state: &CoordState, ringing: &RingingStation) -> Option<Instant> {
    let station = &ringing.station;
    let (settings, refs) = {
        let inner = station.lock();
        (inner.settings.clone(), inner.trunks.clone())
    };

    let mut per_pair: Option<Instant> = None;
    for trunk_ref in &refs {
        let Some(ringing_trunk) = state.ringing_trunk(trunk_ref.trunk()) else {
            continue;
        };
        let Some(timeout) = trunk_ref.ring_timeout() else {
            break;
        };
        if ringing_trunk.timed_out_for(station) {
            continue;
        }
        let deadline = ringing_trunk.ring_begin + timeout;
        per_pair = Some(per_pair.map_or(deadline, |d| d.max(deadline)));
    }

    let station_wide = settings.ring_timeout.map(|t| ringing.ring_begin + t);
    match (station_wide, per_pair) {
        (Some(s), Some(p)) => Some(s.min(p)),
        (s, p) => s.or(p),
    }
}

fn calc_station_timeouts(state: &mut CoordState, now: Instant, outcome: &mut TimerOutcome) {
    let mut i = 0;
    while i < state.ringing_stations.len() {
        let Some(deadline) = station_deadline(state, &state.ringing_stations[i]) else {
            i += 1;
            continue;
        };
        if deadline <= now {
            let retired = state.ringing_stations.remove(i);
            let refs = retired.station.trunk_refs();
            state.mark_timed_out(&retired.station, &refs);
            tracing::info!(station = %retired.station.name(), "station ring timeout");
            outcome.teardown.push(Teardown::HangupDial {
                dial: retired.station.take_dial(),
                station: retired.station,
            });
            outcome.changed = true;
            continue;
        }
        outcome.wake_in(deadline - now);
        i += 1;
    }
}

fn calc_station_delays(
    state: &mut CoordState,
    stations: &[Arc<Station>],
    now: Instant,
    outcome: &mut TimerOutcome,
) {
    if state.expire_failures(now) > 0 {
        outcome.changed = true;
    }

    for station in stations {
        if state.is_station_ringing(station) || station.in_use() {
            continue;
        }
        let (settings, refs) = {
            let inner = station.lock();
            (inner.settings.clone(), inner.trunks.clone())
        };
        let Some((pos, trunk_ref)) = state.choose_ringing_trunk(station, &refs) else {
            continue;
        };
        if let Some(left) = state.backoff_remaining(station, now) {
            outcome.wake_in(left);
            continue;
        }
        let Some(delay) = trunk_ref.ring_delay().or(settings.ring_delay) else {
            continue;
        };
        let deadline = state.ringing_trunks[pos].ring_begin + delay;
        if deadline <= now {
            outcome.changed = true;
            continue;
        }
        outcome.wake_in(deadline - now);
    }
}

/// Stations that should start ringing now.
///
/// A station is skipped while it is ringing, in a call, backing off after
/// a failed dial, already timed out on that ringing instance, or still
/// inside its ring delay. Each station appears at most once.
pub fn ring_candidates(state: &mut CoordState, now: Instant) -> Vec<RingCandidate> {
    state.expire_failures(now);
    let mut candidates: Vec<RingCandidate> = Vec::new();

    for ringing in &state.ringing_trunks {
        for station in ringing.trunk.member_stations() {
            if candidates.iter().any(|c| Arc::ptr_eq(&c.station, &station))
                || state.is_station_ringing(&station)
                || station.in_use()
                || state.backoff_remaining(&station, now).is_some()
                || ringing.timed_out_for(&station)
            {
                continue;
            }

            let delay = {
                let inner = station.lock();
                inner
                    .find_ref(&ringing.trunk)
                    .and_then(|r| r.ring_delay())
                    .or(inner.settings.ring_delay)
            };
            if delay.is_some_and(|d| ringing.ring_begin + d > now) {
                continue;
            }

            candidates.push(RingCandidate {
                station,
                trunk: Arc::clone(&ringing.trunk),
            });
        }
    }
    candidates
}

/// Remove ringing stations none of whose trunks are ringing any more.
pub fn stale_ringing_stations(state: &mut CoordState) -> Vec<Teardown> {
    let mut stale = Vec::new();
    let mut i = 0;
    while i < state.ringing_stations.len() {
        let refs = state.ringing_stations[i].station.trunk_refs();
        if state.any_ringing(&refs) {
            i += 1;
            continue;
        }
        let retired = state.ringing_stations.remove(i);
        tracing::debug!(station = %retired.station.name(), "station no longer has a ringing trunk");
        stale.push(Teardown::HangupDial {
            dial: retired.station.take_dial(),
            station: retired.station,
        });
    }
    stale
}
