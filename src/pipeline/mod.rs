// src/pipeline/mod.rs

pub mod engine;
pub mod event_bus;
pub mod metrics;

pub use engine::ZoneEngine;
pub use metrics::PipelineMetrics;
