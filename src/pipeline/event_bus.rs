// src/pipeline/event_bus.rs
//
// Decoupled event system. The engine publishes zone lifecycle events instead
// of printing them; the processing loop drains and logs them between frames.

use crate::types::TrackId;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ZoneEvent {
    Entered {
        track_id: TrackId,
        zone: String,
        timestamp: f64,
    },

    Exited {
        track_id: TrackId,
        zone: String,
        timestamp: f64,
        /// Dwell time of the cycle closed by this exit
        cycle_time: Option<f64>,
    },

    Completed {
        track_id: TrackId,
        zone: String,
        count: u64,
    },

    Relinked {
        from: TrackId,
        to: TrackId,
        distance: f32,
        gap: f64,
    },

    Evicted {
        track_id: TrackId,
        /// Zones the identity was still inside; their cycles stay unfinished
        open_zones: Vec<String>,
    },
}

impl ZoneEvent {
    pub fn log(&self) {
        match self {
            Self::Entered { track_id, zone, .. } => {
                debug!("Box ID {} entered {}", track_id, zone);
            }
            Self::Exited {
                track_id,
                zone,
                cycle_time: Some(secs),
                ..
            } => {
                info!("⏱️  Box ID {} exited {} after {:.2} seconds", track_id, zone, secs);
            }
            Self::Exited { track_id, zone, .. } => {
                debug!("Box ID {} exited {} with no open cycle", track_id, zone);
            }
            Self::Completed { .. } | Self::Relinked { .. } => {}
            Self::Evicted {
                track_id,
                open_zones,
            } if !open_zones.is_empty() => {
                warn!(
                    "⚫ ID {} lost while inside {:?}; cycles left unfinished",
                    track_id, open_zones
                );
            }
            Self::Evicted { .. } => {}
        }
    }
}

pub struct EventBus {
    events: VecDeque<ZoneEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: ZoneEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<ZoneEvent> {
        self.events.drain(..).collect()
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relink(from: TrackId) -> ZoneEvent {
        ZoneEvent::Relinked {
            from,
            to: from + 100,
            distance: 1.0,
            gap: 0.1,
        }
    }

    #[test]
    fn test_drain_in_publish_order() {
        let mut bus = EventBus::new(8);
        bus.publish(relink(1));
        bus.publish(relink(2));
        assert_eq!(bus.pending_count(), 2);
        assert_eq!(bus.drain(), vec![relink(1), relink(2)]);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_full_bus_drops_oldest() {
        let mut bus = EventBus::new(2);
        bus.publish(relink(1));
        bus.publish(relink(2));
        bus.publish(relink(3));
        assert_eq!(bus.drain(), vec![relink(2), relink(3)]);
    }
}
