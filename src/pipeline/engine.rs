// src/pipeline/engine.rs
//
// Owns every piece of mutable run state and advances it one frame at a time:
//
//   FrameInput → continuity.resolve   (re-link new IDs, park missing IDs)
//              → occupancy.step       (per detection × zone transitions)
//              → ledger start/finish  (driven by those transitions)
//              → continuity.purge     (evict, abandon open cycles)
//
// Nothing here blocks; exports read an owned snapshot.

use crate::cycle_ledger::{CycleTimeLedger, LedgerSnapshot, ZoneStatistics};
use crate::error::FrameIssue;
use crate::pipeline::event_bus::{EventBus, ZoneEvent};
use crate::pipeline::metrics::PipelineMetrics;
use crate::tracking::{
    ContinuityConfig, OccupancyMachine, TrackContinuityResolver, ZoneTransition,
};
use crate::types::{EngineConfig, FrameInput, TrackId};
use crate::zones::ZoneSet;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::warn;

/// What happened while processing one frame.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp: f64,
    pub relinks: usize,
    pub transitions: usize,
    pub evictions: usize,
    pub issues: Vec<FrameIssue>,
}

pub struct ZoneEngine {
    resolver: TrackContinuityResolver,
    occupancy: OccupancyMachine,
    ledger: CycleTimeLedger,
    events: EventBus,
    metrics: PipelineMetrics,
    last_timestamp: Option<f64>,
    frames_processed: u64,
}

impl ZoneEngine {
    #[cfg(test)]
    pub fn new(zones: ZoneSet, config: &EngineConfig) -> Self {
        Self::with_metrics(zones, config, PipelineMetrics::new())
    }

    pub fn with_metrics(zones: ZoneSet, config: &EngineConfig, metrics: PipelineMetrics) -> Self {
        let ledger = CycleTimeLedger::new(zones.names());
        Self {
            resolver: TrackContinuityResolver::new(ContinuityConfig {
                max_disappeared_time: config.max_disappeared_time,
                max_distance: config.max_distance,
            }),
            occupancy: OccupancyMachine::new(zones),
            ledger,
            events: EventBus::new(config.max_pending_events),
            metrics,
            last_timestamp: None,
            frames_processed: 0,
        }
    }

    pub fn process_frame(&mut self, frame: &FrameInput) -> FrameReport {
        let started = Instant::now();
        let now = self.monotonic(frame.timestamp);
        let mut report = FrameReport {
            frame_index: self.frames_processed,
            timestamp: now,
            ..FrameReport::default()
        };

        // ── Continuity: re-link before anything looks at identities ──
        for relink in self.resolver.resolve(&frame.detections, now) {
            self.ledger.rekey(relink.from, relink.to);
            self.metrics.inc(&self.metrics.relinks);
            self.events.publish(ZoneEvent::Relinked {
                from: relink.from,
                to: relink.to,
                distance: relink.distance,
                gap: relink.gap,
            });
            report.relinks += 1;
        }

        // ── Occupancy + ledger ──
        for det in &frame.detections {
            let center = det.center();
            let state = self.resolver.observe(det.track_id, center, now);
            let outcome = self.occupancy.step(det.track_id, state, center);

            for source in outcome.errors {
                report.issues.push(FrameIssue::Occupancy {
                    track_id: det.track_id,
                    source,
                });
            }
            for transition in outcome.transitions {
                report.transitions += 1;
                self.apply_transition(det.track_id, transition, now, &mut report);
            }
        }
        self.metrics
            .add(&self.metrics.detections_accepted, frame.detections.len() as u64);

        // ── Eviction ──
        for eviction in self.resolver.purge_expired(now) {
            self.ledger.abandon(eviction.track_id);
            self.metrics.inc(&self.metrics.evictions);
            self.events.publish(ZoneEvent::Evicted {
                track_id: eviction.track_id,
                open_zones: eviction.state.in_zones.into_iter().collect(),
            });
            report.evictions += 1;
        }

        self.frames_processed += 1;
        self.metrics.inc(&self.metrics.total_frames);
        self.metrics.set_timing(
            &self.metrics.frame_time_us,
            started.elapsed().as_micros() as u64,
        );
        report
    }

    fn apply_transition(
        &mut self,
        track_id: TrackId,
        transition: ZoneTransition,
        now: f64,
        report: &mut FrameReport,
    ) {
        match transition {
            ZoneTransition::Entered { zone } => {
                if let Err(source) = self.ledger.start(track_id, &zone, now) {
                    report.issues.push(FrameIssue::Ledger { track_id, source });
                }
                self.events.publish(ZoneEvent::Entered {
                    track_id,
                    zone,
                    timestamp: now,
                });
            }
            ZoneTransition::Exited {
                zone,
                completed_count,
            } => {
                let cycle_time = match self.ledger.finish(track_id, &zone, now) {
                    Ok(cycle_time) => cycle_time,
                    Err(source) => {
                        report.issues.push(FrameIssue::Ledger { track_id, source });
                        None
                    }
                };
                if cycle_time.is_some() {
                    self.metrics.inc(&self.metrics.completed_cycles);
                }
                if let Some(count) = completed_count {
                    self.events.publish(ZoneEvent::Completed {
                        track_id,
                        zone: zone.clone(),
                        count,
                    });
                }
                self.events.publish(ZoneEvent::Exited {
                    track_id,
                    zone,
                    timestamp: now,
                    cycle_time,
                });
            }
        }
    }

    /// Frame times never run backwards; a late timestamp is held at the last
    /// one so ages and durations stay non-negative.
    fn monotonic(&mut self, timestamp: f64) -> f64 {
        let now = match self.last_timestamp {
            Some(last) if timestamp < last => {
                warn!(
                    "⚠️  Frame timestamp {:.3} is before previous {:.3}; holding",
                    timestamp, last
                );
                last
            }
            _ => timestamp,
        };
        self.last_timestamp = Some(now);
        now
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Completed-transit count per zone.
    pub fn get_counts(&self) -> BTreeMap<String, u64> {
        self.occupancy.zones().counts()
    }

    /// Every known identity with the zones it currently occupies.
    pub fn get_active_tracks(&self) -> BTreeMap<TrackId, BTreeSet<String>> {
        self.resolver
            .tracks()
            .iter()
            .map(|(id, state)| (*id, state.in_zones.clone()))
            .collect()
    }

    /// Seconds spent so far in each zone, for every open cycle.
    pub fn get_current_cycle_times(&self, now: f64) -> BTreeMap<TrackId, BTreeMap<String, f64>> {
        self.ledger.current_durations(now)
    }

    pub fn get_zone_statistics(&self) -> BTreeMap<String, ZoneStatistics> {
        self.ledger.statistics()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    pub fn drain_events(&mut self) -> Vec<ZoneEvent> {
        self.events.drain()
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &CycleTimeLedger {
        &self.ledger
    }

    #[cfg(test)]
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }
}
