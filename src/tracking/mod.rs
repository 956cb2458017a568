// src/tracking/mod.rs
//
// Identity continuity and zone membership.
//
// Signal flow per frame:
//   Detections → continuity (re-link / park) → occupancy (enter / exit)
//              → continuity.purge_expired (evict)
//
// Orchestrated by pipeline::engine::ZoneEngine.

pub mod continuity;
pub mod occupancy;

pub use continuity::{ContinuityConfig, TrackContinuityResolver};
pub use occupancy::{OccupancyMachine, ZoneTransition};
