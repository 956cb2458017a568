// src/tracking/continuity.rs
//
// Bridges tracker-ID discontinuities. When the upstream tracker loses an
// object for a few frames and hands it back under a fresh identity, the new
// identity inherits the old TrackState so zone membership, completed zones
// and open cycles carry over instead of resetting.
//
// Per frame:
//   1. New identities (no TrackState) search the disappeared table for the
//      closest entry seen within max_disappeared_time and closer than
//      max_distance. A match moves the old TrackState onto the new key.
//   2. Known identities missing from the frame are parked in the disappeared
//      table with their own last position/time.
//   3. (after occupancy) purge_expired drops entries older than
//      max_disappeared_time together with their TrackState.
//
// The disappeared table is a BTreeMap so the candidate scan runs in identity
// order; with strict `<` on distance an exact tie goes to the lowest identity.

use crate::geometry::{distance, Point};
use crate::types::{Detection, TrackId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ContinuityConfig {
    /// Seconds a lost identity remains eligible for re-linking
    pub max_disappeared_time: f64,
    /// Maximum center distance (pixels) for a re-link
    pub max_distance: f32,
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            max_disappeared_time: 1.0,
            max_distance: 50.0,
        }
    }
}

/// Everything the engine knows about one continuity chain, keyed by its
/// current tracker identity.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackState {
    pub last_seen: f64,
    pub last_position: Point,
    /// Zones the chain is currently inside
    pub in_zones: BTreeSet<String>,
    /// Zones whose transit has already been counted for this chain
    pub completed_zones: BTreeSet<String>,
}

impl TrackState {
    fn new(now: f64, position: Point) -> Self {
        Self {
            last_seen: now,
            last_position: position,
            in_zones: BTreeSet::new(),
            completed_zones: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisappearedEntry {
    pub last_position: Point,
    pub last_seen: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relink {
    pub from: TrackId,
    pub to: TrackId,
    pub distance: f32,
    /// Seconds between the old identity's last sighting and this frame
    pub gap: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Eviction {
    pub track_id: TrackId,
    pub state: TrackState,
}

pub struct TrackContinuityResolver {
    config: ContinuityConfig,
    tracks: HashMap<TrackId, TrackState>,
    disappeared: BTreeMap<TrackId, DisappearedEntry>,
}

impl TrackContinuityResolver {
    pub fn new(config: ContinuityConfig) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
            disappeared: BTreeMap::new(),
        }
    }

    /// Steps 1 and 2: re-link new identities, then park missing ones.
    pub fn resolve(&mut self, detections: &[Detection], now: f64) -> Vec<Relink> {
        let current: HashSet<TrackId> = detections.iter().map(|d| d.track_id).collect();

        // An identity that came back under its own key is no longer lost.
        self.disappeared.retain(|id, _| !current.contains(id));

        let mut relinks = Vec::new();
        for det in detections {
            if self.tracks.contains_key(&det.track_id) {
                continue;
            }
            let center = det.center();
            let Some((old_id, dist, gap)) = self.closest_candidate(center, now) else {
                continue;
            };

            self.disappeared.remove(&old_id);
            if let Some(state) = self.tracks.remove(&old_id) {
                info!(
                    "🔗 Re-linked ID {} → {} (dist={:.1}px, gap={:.2}s)",
                    old_id, det.track_id, dist, gap
                );
                self.tracks.insert(det.track_id, state);
                relinks.push(Relink {
                    from: old_id,
                    to: det.track_id,
                    distance: dist,
                    gap,
                });
            }
        }

        for (id, state) in &self.tracks {
            if !current.contains(id) {
                self.disappeared.insert(
                    *id,
                    DisappearedEntry {
                        last_position: state.last_position,
                        last_seen: state.last_seen,
                    },
                );
            }
        }

        relinks
    }

    fn closest_candidate(&self, center: Point, now: f64) -> Option<(TrackId, f32, f64)> {
        let mut best: Option<(TrackId, f32, f64)> = None;
        for (old_id, entry) in &self.disappeared {
            let gap = now - entry.last_seen;
            if gap > self.config.max_disappeared_time {
                continue;
            }
            let dist = distance(center, entry.last_position);
            if dist >= self.config.max_distance {
                continue;
            }
            if best.map_or(true, |(_, best_dist, _)| dist < best_dist) {
                best = Some((*old_id, dist, gap));
            }
        }
        best
    }

    /// Record a sighting, creating the TrackState on first observation.
    pub fn observe(&mut self, track_id: TrackId, position: Point, now: f64) -> &mut TrackState {
        let state = self.tracks.entry(track_id).or_insert_with(|| {
            debug!("🆕 New track ID {} at ({:.0}, {:.0})", track_id, position.0, position.1);
            TrackState::new(now, position)
        });
        state.last_seen = now;
        state.last_position = position;
        state
    }

    /// Step 3: forget identities unseen for longer than max_disappeared_time.
    pub fn purge_expired(&mut self, now: f64) -> Vec<Eviction> {
        let max_age = self.config.max_disappeared_time;
        let expired: Vec<TrackId> = self
            .disappeared
            .iter()
            .filter(|(_, entry)| now - entry.last_seen > max_age)
            .map(|(id, _)| *id)
            .collect();

        let mut evictions = Vec::with_capacity(expired.len());
        for id in expired {
            self.disappeared.remove(&id);
            if let Some(state) = self.tracks.remove(&id) {
                info!(
                    "🗑️  Evicted ID {} (unseen {:.2}s, still in {:?})",
                    id,
                    now - state.last_seen,
                    state.in_zones
                );
                evictions.push(Eviction { track_id: id, state });
            }
        }
        evictions
    }

    #[cfg(test)]
    pub fn track(&self, track_id: TrackId) -> Option<&TrackState> {
        self.tracks.get(&track_id)
    }

    pub fn tracks(&self) -> &HashMap<TrackId, TrackState> {
        &self.tracks
    }

    #[cfg(test)]
    pub fn disappeared(&self) -> &BTreeMap<TrackId, DisappearedEntry> {
        &self.disappeared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(track_id: TrackId, cx: f32, cy: f32) -> Detection {
        Detection {
            track_id,
            bbox: [cx - 10.0, cy - 10.0, cx + 10.0, cy + 10.0],
            confidence: 0.9,
            class_id: 0,
        }
    }

    /// Run resolve + observe + purge for one frame, the way the engine does.
    fn step(resolver: &mut TrackContinuityResolver, dets: &[Detection], now: f64) -> Vec<Relink> {
        let relinks = resolver.resolve(dets, now);
        for d in dets {
            resolver.observe(d.track_id, d.center(), now);
        }
        resolver.purge_expired(now);
        relinks
    }

    #[test]
    fn test_first_observation_creates_state() {
        let mut resolver = TrackContinuityResolver::new(ContinuityConfig::default());
        step(&mut resolver, &[det(1, 100.0, 100.0)], 0.0);
        let state = resolver.track(1).unwrap();
        assert_eq!(state.last_position, (100.0, 100.0));
        assert_eq!(state.last_seen, 0.0);
        assert!(resolver.disappeared().is_empty());
    }

    #[test]
    fn test_missing_identity_parked_with_own_timestamp() {
        let mut resolver = TrackContinuityResolver::new(ContinuityConfig::default());
        step(&mut resolver, &[det(1, 100.0, 100.0)], 0.0);
        step(&mut resolver, &[], 0.3);
        step(&mut resolver, &[], 0.6);

        let entry = resolver.disappeared().get(&1).unwrap();
        assert_eq!(entry.last_seen, 0.0, "age is measured from the last sighting");
        assert_eq!(entry.last_position, (100.0, 100.0));
    }

    #[test]
    fn test_relink_within_bounds() {
        let mut resolver = TrackContinuityResolver::new(ContinuityConfig::default());
        step(&mut resolver, &[det(7, 200.0, 200.0)], 0.0);
        resolver.tracks.get_mut(&7).unwrap().completed_zones.insert("A".into());
        step(&mut resolver, &[], 0.5);

        let relinks = step(&mut resolver, &[det(9, 206.0, 208.0)], 0.8);
        assert_eq!(relinks.len(), 1);
        assert_eq!(relinks[0].from, 7);
        assert_eq!(relinks[0].to, 9);
        assert!((relinks[0].distance - 10.0).abs() < 1e-4);
        assert!(resolver.track(7).is_none());
        assert!(resolver.disappeared().is_empty());
        assert!(
            resolver.track(9).unwrap().completed_zones.contains("A"),
            "state transplanted onto the new identity"
        );
    }

    #[test]
    fn test_no_relink_after_max_disappeared_time() {
        let mut resolver = TrackContinuityResolver::new(ContinuityConfig::default());
        step(&mut resolver, &[det(7, 200.0, 200.0)], 0.0);
        step(&mut resolver, &[], 0.5);

        // No frame between 0.5 and 2.0, so purge has not run yet when 9 appears.
        let relinks = resolver.resolve(&[det(9, 200.0, 200.0)], 2.0);
        assert!(relinks.is_empty());
        resolver.observe(9, (200.0, 200.0), 2.0);
        let evicted = resolver.purge_expired(2.0);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].track_id, 7);
        assert!(resolver.track(7).is_none());
        assert!(resolver.track(9).unwrap().completed_zones.is_empty());
    }

    #[test]
    fn test_gap_equal_to_max_still_relinks() {
        let mut resolver = TrackContinuityResolver::new(ContinuityConfig::default());
        step(&mut resolver, &[det(7, 200.0, 200.0)], 0.0);
        step(&mut resolver, &[], 0.5);
        let relinks = step(&mut resolver, &[det(9, 200.0, 200.0)], 1.0);
        assert_eq!(relinks.len(), 1);
        assert_eq!(relinks[0].gap, 1.0);
    }

    #[test]
    fn test_no_relink_beyond_max_distance() {
        let mut resolver = TrackContinuityResolver::new(ContinuityConfig::default());
        step(&mut resolver, &[det(7, 200.0, 200.0)], 0.0);
        step(&mut resolver, &[], 0.2);
        let relinks = step(&mut resolver, &[det(9, 250.0, 200.0)], 0.4);
        assert!(relinks.is_empty(), "distance must be strictly below max_distance");
        assert!(resolver.track(7).is_some());
        assert!(resolver.track(9).is_some());
    }

    #[test]
    fn test_relink_picks_closest_candidate() {
        let mut resolver = TrackContinuityResolver::new(ContinuityConfig::default());
        step(
            &mut resolver,
            &[det(1, 100.0, 100.0), det(2, 130.0, 100.0)],
            0.0,
        );
        step(&mut resolver, &[], 0.1);

        let relinks = step(&mut resolver, &[det(5, 125.0, 100.0)], 0.2);
        assert_eq!(relinks.len(), 1);
        assert_eq!(relinks[0].from, 2);
        assert!(resolver.track(1).is_some());
    }

    #[test]
    fn test_exact_tie_goes_to_lowest_identity() {
        let mut resolver = TrackContinuityResolver::new(ContinuityConfig::default());
        step(
            &mut resolver,
            &[det(4, 100.0, 100.0), det(3, 120.0, 100.0)],
            0.0,
        );
        step(&mut resolver, &[], 0.1);

        let relinks = step(&mut resolver, &[det(8, 110.0, 100.0)], 0.2);
        assert_eq!(relinks[0].from, 3);
    }

    #[test]
    fn test_each_lost_identity_relinks_once() {
        let mut resolver = TrackContinuityResolver::new(ContinuityConfig::default());
        step(&mut resolver, &[det(1, 100.0, 100.0)], 0.0);
        step(&mut resolver, &[], 0.1);

        let relinks = step(
            &mut resolver,
            &[det(5, 105.0, 100.0), det(6, 101.0, 100.0)],
            0.2,
        );
        assert_eq!(relinks.len(), 1);
        assert_eq!(relinks[0].to, 5, "detections are resolved in frame order");
        assert!(resolver.track(6).is_some());
    }

    #[test]
    fn test_returning_identity_cannot_be_stolen() {
        let mut resolver = TrackContinuityResolver::new(ContinuityConfig::default());
        step(&mut resolver, &[det(1, 100.0, 100.0)], 0.0);
        step(&mut resolver, &[], 0.1);

        let relinks = step(
            &mut resolver,
            &[det(1, 100.0, 100.0), det(2, 102.0, 100.0)],
            0.2,
        );
        assert!(relinks.is_empty());
        assert!(resolver.track(1).is_some());
        assert!(resolver.track(2).is_some());
    }

    #[test]
    fn test_empty_frames_age_and_purge() {
        let mut resolver = TrackContinuityResolver::new(ContinuityConfig::default());
        step(&mut resolver, &[det(1, 100.0, 100.0)], 0.0);
        for i in 1..=10 {
            step(&mut resolver, &[], i as f64 * 0.1);
        }
        assert!(resolver.track(1).is_some(), "exactly max age is kept");
        step(&mut resolver, &[], 1.1);
        assert!(resolver.track(1).is_none());
        assert!(resolver.disappeared().is_empty());
    }
}
