// src/tracking/occupancy.rs
//
// Per identity × zone membership: ABSENT ⇄ PRESENT.
//
//   ABSENT  → PRESENT  center strictly inside the zone       → Entered
//   PRESENT → ABSENT   center seen outside the zone          → Exited
//                      first exit of this chain in this zone → counter += 1
//
// An identity that simply vanishes is not stepped here; the continuity
// resolver parks it, and either re-links it (membership carries over) or
// evicts it (membership is dropped without counting).

use crate::error::ZoneError;
use crate::geometry::{contains, Point};
use crate::tracking::continuity::TrackState;
use crate::types::TrackId;
use crate::zones::ZoneSet;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum ZoneTransition {
    Entered {
        zone: String,
    },
    Exited {
        zone: String,
        /// New zone count when this exit was the chain's first in the zone
        completed_count: Option<u64>,
    },
}

impl ZoneTransition {
    #[cfg(test)]
    pub fn zone(&self) -> &str {
        match self {
            Self::Entered { zone } | Self::Exited { zone, .. } => zone,
        }
    }
}

#[derive(Debug, Default)]
pub struct StepOutcome {
    pub transitions: Vec<ZoneTransition>,
    pub errors: Vec<ZoneError>,
}

pub struct OccupancyMachine {
    zones: ZoneSet,
}

impl OccupancyMachine {
    pub fn new(zones: ZoneSet) -> Self {
        Self { zones }
    }

    pub fn zones(&self) -> &ZoneSet {
        &self.zones
    }

    /// Advance one observed identity against every zone.
    pub fn step(&mut self, track_id: TrackId, state: &mut TrackState, center: Point) -> StepOutcome {
        let mut outcome = StepOutcome::default();

        let mut exits = Vec::new();
        for zone in self.zones.iter() {
            let inside = contains(center, &zone.rect);
            let present = state.in_zones.contains(&zone.name);

            if inside && !present {
                state.in_zones.insert(zone.name.clone());
                debug!("➡️  ID {} entered {}", track_id, zone.name);
                outcome.transitions.push(ZoneTransition::Entered {
                    zone: zone.name.clone(),
                });
            } else if !inside && present {
                state.in_zones.remove(&zone.name);
                exits.push(zone.name.clone());
            }
        }

        for zone in exits {
            let mut completed_count = None;
            if !state.completed_zones.contains(&zone) {
                match self.zones.increment(&zone) {
                    Ok(count) => {
                        state.completed_zones.insert(zone.clone());
                        info!("✅ ID {} completed {}. New count: {}", track_id, zone, count);
                        completed_count = Some(count);
                    }
                    Err(e) => outcome.errors.push(e),
                }
            } else {
                debug!("↩️  ID {} left {} again (already counted)", track_id, zone);
            }
            outcome.transitions.push(ZoneTransition::Exited {
                zone,
                completed_count,
            });
        }

        outcome
    }
}
