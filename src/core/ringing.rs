//! Transient ringing state and the event queue, guarded by the coordination
//! lock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::core::model::{Station, Trunk, TrunkRef};

/// Back-off applied after a failed dial to a station.
pub const FAILED_BACKOFF: Duration = Duration::from_millis(1000);

/// An inbound call ringing on a trunk.
#[derive(Debug)]
pub struct RingingTrunk {
    /// Identifies this ringing instance in logs.
    pub id: Uuid,
    /// The ringing trunk.
    pub trunk: Arc<Trunk>,
    /// When ringing started.
    pub ring_begin: Instant,
    /// Stations that already timed out on this instance.
    pub timed_out: Vec<Arc<Station>>,
}

impl RingingTrunk {
    /// Start tracking `trunk` as ringing from `now`.
    #[must_use]
    pub fn new(trunk: Arc<Trunk>, now: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            trunk,
            ring_begin: now,
            timed_out: Vec::new(),
        }
    }

    /// Whether `station` already timed out on this instance.
    #[must_use]
    pub fn timed_out_for(&self, station: &Arc<Station>) -> bool {
        self.timed_out.iter().any(|s| Arc::ptr_eq(s, station))
    }
}

/// A station being dialed.
#[derive(Debug)]
pub struct RingingStation {
    /// The station.
    pub station: Arc<Station>,
    /// When the dial started.
    pub ring_begin: Instant,
}

/// A station whose last dial failed.
#[derive(Debug)]
pub struct FailedStation {
    /// The station.
    pub station: Arc<Station>,
    /// When the failed attempt happened.
    pub last_try: Instant,
}

/// Work queued for the coordinator loop.
#[derive(Debug)]
pub enum Event {
    /// A station parked its call.
    Hold {
        /// The station that parked.
        station: Arc<Station>,
        /// The pairing it parked.
        trunk_ref: Arc<TrunkRef>,
    },
    /// Some outbound dial changed state.
    DialState,
    /// The set of ringing trunks changed.
    RingingTrunk,
}

/// Everything behind the coordination lock.
#[derive(Debug, Default)]
pub struct CoordState {
    /// Ringing trunks, newest first.
    pub ringing_trunks: Vec<RingingTrunk>,
    /// Stations being dialed, newest first.
    pub ringing_stations: Vec<RingingStation>,
    /// Stations in back-off.
    pub failed_stations: Vec<FailedStation>,
    /// Pending events.
    pub events: VecDeque<Event>,
    /// Set once the coordinator loop is running.
    pub running: bool,
    /// Set to ask the coordinator loop to exit.
    pub stop: bool,
}

impl CoordState {
    /// Start ringing `trunk`; the newest ringing trunk goes first.
    pub fn push_ringing_trunk(&mut self, trunk: Arc<Trunk>, now: Instant) -> Uuid {
        let ringing = RingingTrunk::new(trunk, now);
        let id = ringing.id;
        self.ringing_trunks.insert(0, ringing);
        id
    }

    /// Remove the ringing entry for `trunk`, if any.
    pub fn take_ringing_trunk(&mut self, trunk: &Arc<Trunk>) -> Option<RingingTrunk> {
        let pos = self
            .ringing_trunks
            .iter()
            .position(|r| Arc::ptr_eq(&r.trunk, trunk))?;
        Some(self.ringing_trunks.remove(pos))
    }

    /// Ringing entry for `trunk`, if any.
    #[must_use]
    pub fn ringing_trunk(&self, trunk: &Arc<Trunk>) -> Option<&RingingTrunk> {
        self.ringing_trunks.iter().find(|r| Arc::ptr_eq(&r.trunk, trunk))
    }

    /// Highest-priority ringing trunk `station` can answer.
    ///
    /// Walks the station's refs in order and skips trunks the station
    /// already timed out on. Returns the index of the ringing entry.
    #[must_use]
    pub fn choose_ringing_trunk(
        &self,
        station: &Arc<Station>,
        refs: &[Arc<TrunkRef>],
    ) -> Option<(usize, Arc<TrunkRef>)> {
        for trunk_ref in refs {
            let found = self.ringing_trunks.iter().position(|r| {
                trunk_ref.refers_to(&r.trunk) && !r.timed_out_for(station)
            });
            if let Some(pos) = found {
                return Some((pos, Arc::clone(trunk_ref)));
            }
        }
        None
    }

    /// Claim the highest-priority ringing trunk for `station`.
    ///
    /// The entry leaves the registry, so a concurrent claim finds nothing.
    pub fn claim_ringing_trunk(
        &mut self,
        station: &Arc<Station>,
        refs: &[Arc<TrunkRef>],
    ) -> Option<(RingingTrunk, Arc<TrunkRef>)> {
        let (pos, trunk_ref) = self.choose_ringing_trunk(station, refs)?;
        Some((self.ringing_trunks.remove(pos), trunk_ref))
    }

    /// Whether `station` is being dialed.
    #[must_use]
    pub fn is_station_ringing(&self, station: &Arc<Station>) -> bool {
        self.ringing_stations
            .iter()
            .any(|r| Arc::ptr_eq(&r.station, station))
    }

    /// Track `station` as ringing. Returns `false` if it already was.
    pub fn add_ringing_station(&mut self, station: Arc<Station>, now: Instant) -> bool {
        if self.is_station_ringing(&station) {
            return false;
        }
        self.ringing_stations.insert(
            0,
            RingingStation {
                station,
                ring_begin: now,
            },
        );
        true
    }

    /// Stop tracking `station` as ringing.
    pub fn take_ringing_station(&mut self, station: &Arc<Station>) -> Option<RingingStation> {
        let pos = self
            .ringing_stations
            .iter()
            .position(|r| Arc::ptr_eq(&r.station, station))?;
        Some(self.ringing_stations.remove(pos))
    }

    /// Record a failed dial attempt.
    pub fn record_failure(&mut self, station: Arc<Station>, now: Instant) {
        self.failed_stations.retain(|f| !Arc::ptr_eq(&f.station, &station));
        self.failed_stations.insert(
            0,
            FailedStation {
                station,
                last_try: now,
            },
        );
    }

    /// Drop failure records whose back-off has elapsed; returns how many.
    pub fn expire_failures(&mut self, now: Instant) -> usize {
        let before = self.failed_stations.len();
        self.failed_stations
            .retain(|f| now.saturating_duration_since(f.last_try) <= FAILED_BACKOFF);
        before - self.failed_stations.len()
    }

    /// Remaining back-off for `station`, if it is in back-off.
    #[must_use]
    pub fn backoff_remaining(&self, station: &Arc<Station>, now: Instant) -> Option<Duration> {
        self.failed_stations
            .iter()
            .find(|f| Arc::ptr_eq(&f.station, station))
            .map(|f| FAILED_BACKOFF.saturating_sub(now.saturating_duration_since(f.last_try)))
    }

    /// Add `station` to the timed-out list of every ringing trunk it watches.
    pub fn mark_timed_out(&mut self, station: &Arc<Station>, refs: &[Arc<TrunkRef>]) {
        for ringing in &mut self.ringing_trunks {
            if refs.iter().any(|r| r.refers_to(&ringing.trunk)) && !ringing.timed_out_for(station) {
                ringing.timed_out.push(Arc::clone(station));
            }
        }
    }

    /// Whether any trunk `refs` point at is ringing.
    #[must_use]
    pub fn any_ringing(&self, refs: &[Arc<TrunkRef>]) -> bool {
        refs.iter()
            .any(|r| self.ringing_trunks.iter().any(|t| r.refers_to(&t.trunk)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{StationSettings, TrunkSettings};

    fn fixture() -> (Arc<Station>, Arc<Trunk>, Arc<Trunk>, Vec<Arc<TrunkRef>>) {
        let station = Arc::new(Station::new("s1", StationSettings::default()));
        let line1 = Arc::new(Trunk::new("line1", TrunkSettings::default()));
        let line2 = Arc::new(Trunk::new("line2", TrunkSettings::default()));
        let refs = vec![
            Arc::new(TrunkRef::new(Arc::clone(&line1), None, None)),
            Arc::new(TrunkRef::new(Arc::clone(&line2), None, None)),
        ];
        (station, line1, line2, refs)
    }

    #[test]
    fn test_claim_prefers_ref_order() {
        let (station, line1, line2, refs) = fixture();
        let mut state = CoordState::default();
        let now = Instant::now();
        state.push_ringing_trunk(Arc::clone(&line1), now);
        state.push_ringing_trunk(Arc::clone(&line2), now);

        let (claimed, trunk_ref) = state.claim_ringing_trunk(&station, &refs).unwrap();
        assert!(Arc::ptr_eq(&claimed.trunk, &line1));
        assert!(trunk_ref.refers_to(&line1));
        assert_eq!(state.ringing_trunks.len(), 1);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let (station, line1, _, refs) = fixture();
        let other = Arc::new(Station::new("s2", StationSettings::default()));
        let mut state = CoordState::default();
        state.push_ringing_trunk(line1, Instant::now());

        assert!(state.claim_ringing_trunk(&station, &refs).is_some());
        assert!(state.claim_ringing_trunk(&other, &refs).is_none());
    }

    #[test]
    fn test_timed_out_station_skips_instance() {
        let (station, line1, _, refs) = fixture();
        let mut state = CoordState::default();
        state.push_ringing_trunk(Arc::clone(&line1), Instant::now());
        state.mark_timed_out(&station, &refs);
        assert!(state.claim_ringing_trunk(&station, &refs).is_none());

        state.take_ringing_trunk(&line1);
        state.push_ringing_trunk(line1, Instant::now());
        assert!(state.claim_ringing_trunk(&station, &refs).is_some());
    }

    #[test]
    fn test_ringing_station_deduplicated() {
        let (station, ..) = fixture();
        let mut state = CoordState::default();
        assert!(state.add_ringing_station(Arc::clone(&station), Instant::now()));
        assert!(!state.add_ringing_station(Arc::clone(&station), Instant::now()));
        assert_eq!(state.ringing_stations.len(), 1);
    }

    #[test]
    fn test_backoff_expires() {
        let (station, ..) = fixture();
        let mut state = CoordState::default();
        let start = Instant::now();
        state.record_failure(Arc::clone(&station), start);

        let at = start + Duration::from_millis(400);
        assert_eq!(state.expire_failures(at), 0);
        assert_eq!(
            state.backoff_remaining(&station, at),
            Some(Duration::from_millis(600))
        );

        let at = start + Duration::from_millis(1001);
        assert_eq!(state.expire_failures(at), 1);
        assert!(state.backoff_remaining(&station, at).is_none());
    }
}
