// src/cycle_ledger.rs
//
// Dwell-time bookkeeping per identity × zone, driven by the occupancy
// machine's Entered/Exited transitions.
//
// Records move one way: active → completed (on exit) or active → dropped (on
// eviction, leaving only a per-zone stale count). Completed records are never
// touched again; statistics are recomputed from them on demand.

use crate::error::LedgerError;
use crate::types::TrackId;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleRecord {
    pub track_id: TrackId,
    pub zone: String,
    pub entry_time: f64,
    pub exit_time: Option<f64>,
    pub complete: bool,
}

impl CycleRecord {
    fn open(track_id: TrackId, zone: &str, entry_time: f64) -> Self {
        Self {
            track_id,
            zone: zone.to_string(),
            entry_time,
            exit_time: None,
            complete: false,
        }
    }

    /// Seconds spent in the zone, once finished.
    pub fn cycle_time(&self) -> Option<f64> {
        self.exit_time.map(|exit| exit - self.entry_time)
    }
}

/// Aggregates for one zone. All duration fields are zero until the first
/// cycle completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneStatistics {
    pub min_time: f64,
    pub max_time: f64,
    pub avg_time: f64,
    /// Completed cycles
    pub total_objects: usize,
    /// Cycles currently open
    pub current_objects: usize,
    /// Cycles abandoned when their identity was evicted
    pub stale_objects: usize,
}

/// Owned, independent copy of everything an export needs.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    pub statistics: BTreeMap<String, ZoneStatistics>,
    pub completed: BTreeMap<String, Vec<CycleRecord>>,
}

pub struct CycleTimeLedger {
    active: BTreeMap<String, BTreeMap<TrackId, CycleRecord>>,
    completed: BTreeMap<String, Vec<CycleRecord>>,
    /// Abandoned cycles per zone
    stale: BTreeMap<String, usize>,
}

impl CycleTimeLedger {
    pub fn new<'a>(zone_names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut active = BTreeMap::new();
        let mut completed = BTreeMap::new();
        let mut stale = BTreeMap::new();
        for name in zone_names {
            active.insert(name.to_string(), BTreeMap::new());
            completed.insert(name.to_string(), Vec::new());
            stale.insert(name.to_string(), 0);
        }
        Self {
            active,
            completed,
            stale,
        }
    }

    /// Open a cycle. Returns false when one is already open for the pair.
    pub fn start(&mut self, track_id: TrackId, zone: &str, time: f64) -> Result<bool, LedgerError> {
        let records = self
            .active
            .get_mut(zone)
            .ok_or_else(|| LedgerError::UnknownZone(zone.to_string()))?;
        if records.contains_key(&track_id) {
            return Ok(false);
        }
        records.insert(track_id, CycleRecord::open(track_id, zone, time));
        Ok(true)
    }

    /// Close the open cycle for the pair, if any, and return its duration.
    pub fn finish(
        &mut self,
        track_id: TrackId,
        zone: &str,
        time: f64,
    ) -> Result<Option<f64>, LedgerError> {
        let records = self
            .active
            .get_mut(zone)
            .ok_or_else(|| LedgerError::UnknownZone(zone.to_string()))?;
        let Some(mut record) = records.remove(&track_id) else {
            return Ok(None);
        };
        record.exit_time = Some(time);
        record.complete = true;
        let duration = record.cycle_time();
        self.completed
            .entry(zone.to_string())
            .or_default()
            .push(record);
        Ok(duration)
    }

    /// Move open cycles from a lost identity to the identity it was re-linked
    /// to. Returns the zones whose cycle moved.
    pub fn rekey(&mut self, from: TrackId, to: TrackId) -> Vec<String> {
        let mut moved = Vec::new();
        for (zone, records) in self.active.iter_mut() {
            if let Some(mut record) = records.remove(&from) {
                record.track_id = to;
                records.insert(to, record);
                moved.push(zone.clone());
            }
        }
        moved
    }

    /// Retire open cycles of an evicted identity without finishing them.
    /// They no longer count as active and never enter completed statistics.
    pub fn abandon(&mut self, track_id: TrackId) -> Vec<String> {
        let mut abandoned = Vec::new();
        for (zone, records) in self.active.iter_mut() {
            if let Some(record) = records.remove(&track_id) {
                debug!(
                    "Cycle for ID {} in {} abandoned (entered at {:.3})",
                    track_id, zone, record.entry_time
                );
                *self.stale.entry(zone.clone()).or_default() += 1;
                abandoned.push(zone.clone());
            }
        }
        abandoned
    }

    /// Elapsed seconds of every open cycle: identity → zone → seconds.
    pub fn current_durations(&self, now: f64) -> BTreeMap<TrackId, BTreeMap<String, f64>> {
        let mut out: BTreeMap<TrackId, BTreeMap<String, f64>> = BTreeMap::new();
        for (zone, records) in &self.active {
            for (track_id, record) in records {
                out.entry(*track_id)
                    .or_default()
                    .insert(zone.clone(), now - record.entry_time);
            }
        }
        out
    }

    pub fn statistics(&self) -> BTreeMap<String, ZoneStatistics> {
        self.active
            .keys()
            .map(|zone| (zone.clone(), self.zone_statistics(zone)))
            .collect()
    }

    fn zone_statistics(&self, zone: &str) -> ZoneStatistics {
        let durations: Vec<f64> = self
            .completed
            .get(zone)
            .map(|records| records.iter().filter_map(CycleRecord::cycle_time).collect())
            .unwrap_or_default();
        let current_objects = self.active.get(zone).map_or(0, BTreeMap::len);
        let stale_objects = self.stale.get(zone).copied().unwrap_or(0);

        if durations.is_empty() {
            return ZoneStatistics {
                min_time: 0.0,
                max_time: 0.0,
                avg_time: 0.0,
                total_objects: 0,
                current_objects,
                stale_objects,
            };
        }

        let min_time = durations.iter().copied().fold(f64::INFINITY, f64::min);
        let max_time = durations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg_time = durations.iter().sum::<f64>() / durations.len() as f64;

        ZoneStatistics {
            min_time,
            max_time,
            avg_time,
            total_objects: durations.len(),
            current_objects,
            stale_objects,
        }
    }

    #[cfg(test)]
    pub fn completed_cycles(&self, zone: &str) -> &[CycleRecord] {
        self.completed.get(zone).map(Vec::as_slice).unwrap_or(&[])
    }

    #[cfg(test)]
    pub fn active_record(&self, track_id: TrackId, zone: &str) -> Option<&CycleRecord> {
        self.active.get(zone)?.get(&track_id)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            statistics: self.statistics(),
            completed: self.completed.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> CycleTimeLedger {
        CycleTimeLedger::new(["A", "B"])
    }

    #[test]
    fn test_start_finish_records_duration() {
        let mut l = ledger();
        assert!(l.start(5, "A", 10.0).unwrap());
        assert_eq!(l.finish(5, "A", 13.0).unwrap(), Some(3.0));

        let done = l.completed_cycles("A");
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].track_id, 5);
        assert_eq!(done[0].exit_time, Some(13.0));
        assert!(done[0].complete);
        assert!(l.active_record(5, "A").is_none());
    }

    #[test]
    fn test_duplicate_start_is_noop() {
        let mut l = ledger();
        assert!(l.start(1, "A", 0.0).unwrap());
        assert!(!l.start(1, "A", 5.0).unwrap());
        assert_eq!(l.active_record(1, "A").unwrap().entry_time, 0.0);
        assert_eq!(l.statistics()["A"].current_objects, 1);
    }

    #[test]
    fn test_finish_before_start_is_noop() {
        let mut l = ledger();
        assert_eq!(l.finish(1, "A", 2.0).unwrap(), None);
        assert!(l.completed_cycles("A").is_empty());
    }

    #[test]
    fn test_unknown_zone_is_an_error() {
        let mut l = ledger();
        assert_eq!(
            l.start(1, "Z", 0.0),
            Err(LedgerError::UnknownZone("Z".into()))
        );
        assert!(l.finish(1, "Z", 0.0).is_err());
    }

    #[test]
    fn test_statistics_aggregate() {
        let mut l = ledger();
        for (id, enter, exit) in [(1, 0.0, 2.0), (2, 1.0, 5.0), (3, 2.0, 5.0)] {
            l.start(id, "A", enter).unwrap();
            l.finish(id, "A", exit).unwrap();
        }
        l.start(4, "A", 6.0).unwrap();

        let all = l.statistics();
        let stats = &all["A"];
        assert_eq!(stats.min_time, 2.0);
        assert_eq!(stats.max_time, 4.0);
        assert!((stats.avg_time - 3.0).abs() < 1e-9);
        assert_eq!(stats.total_objects, 3);
        assert_eq!(stats.current_objects, 1);
    }

    #[test]
    fn test_empty_zone_reports_zeros() {
        let mut l = ledger();
        l.start(9, "B", 1.0).unwrap();
        let all = l.statistics();
        let stats = &all["B"];
        assert_eq!(
            *stats,
            ZoneStatistics {
                min_time: 0.0,
                max_time: 0.0,
                avg_time: 0.0,
                total_objects: 0,
                current_objects: 1,
                stale_objects: 0,
            }
        );
    }

    #[test]
    fn test_statistics_idempotent() {
        let mut l = ledger();
        l.start(1, "A", 0.0).unwrap();
        l.finish(1, "A", 1.5).unwrap();
        l.start(2, "B", 0.5).unwrap();
        assert_eq!(l.statistics(), l.statistics());
    }

    #[test]
    fn test_current_durations() {
        let mut l = ledger();
        l.start(1, "A", 10.0).unwrap();
        l.start(1, "B", 12.0).unwrap();
        l.start(2, "A", 11.0).unwrap();
        l.start(3, "A", 11.0).unwrap();
        l.finish(3, "A", 12.0).unwrap();

        let current = l.current_durations(14.0);
        assert_eq!(current.len(), 2);
        assert_eq!(current[&1]["A"], 4.0);
        assert_eq!(current[&1]["B"], 2.0);
        assert_eq!(current[&2]["A"], 3.0);
    }

    #[test]
    fn test_rekey_moves_open_cycle() {
        let mut l = ledger();
        l.start(7, "A", 0.0).unwrap();
        assert_eq!(l.rekey(7, 9), vec!["A".to_string()]);
        assert!(l.active_record(7, "A").is_none());
        assert_eq!(l.finish(9, "A", 3.0).unwrap(), Some(3.0));
        assert_eq!(l.completed_cycles("A")[0].track_id, 9);
    }

    #[test]
    fn test_abandon_excludes_from_completed_and_active() {
        let mut l = ledger();
        l.start(7, "A", 0.0).unwrap();
        assert_eq!(l.abandon(7), vec!["A".to_string()]);

        let all = l.statistics();
        let stats = &all["A"];
        assert_eq!(stats.total_objects, 0);
        assert_eq!(stats.current_objects, 0);
        assert_eq!(stats.stale_objects, 1);

        // A reused identity starts fresh instead of inheriting the old entry time
        l.start(7, "A", 50.0).unwrap();
        assert_eq!(l.active_record(7, "A").unwrap().entry_time, 50.0);
    }

    #[test]
    fn test_stale_count_accumulates_per_zone() {
        let mut l = ledger();
        for round in 0..3 {
            let t = round as f64 * 10.0;
            l.start(7, "A", t).unwrap();
            l.start(7, "B", t).unwrap();
            l.start(8, "A", t).unwrap();
            assert_eq!(l.abandon(7), vec!["A".to_string(), "B".to_string()]);
        }
        assert!(l.abandon(7).is_empty(), "nothing left to abandon");

        let all = l.statistics();
        assert_eq!(all["A"].stale_objects, 3);
        assert_eq!(all["B"].stale_objects, 3);
        assert_eq!(all["A"].current_objects, 1, "other identities untouched");
        assert_eq!(all["B"].current_objects, 0);
        assert_eq!(all["A"].total_objects, 0);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut l = ledger();
        l.start(1, "A", 0.0).unwrap();
        l.finish(1, "A", 1.0).unwrap();
        let snap = l.snapshot();

        l.start(2, "A", 2.0).unwrap();
        l.finish(2, "A", 4.0).unwrap();

        assert_eq!(snap.completed["A"].len(), 1);
        assert_eq!(snap.statistics["A"].total_objects, 1);
        assert_eq!(l.completed_cycles("A").len(), 2);
    }
}
