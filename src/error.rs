// src/error.rs
//
// Structured error values for each engine boundary. None of these are fatal:
// callers log them and keep processing.

use crate::types::TrackId;
use std::path::PathBuf;
use thiserror::Error;

/// A single detection that could not be accepted into a frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("detection #{index}: missing field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("detection #{index}: field `{field}` is not a valid {expected}")]
    InvalidField {
        index: usize,
        field: &'static str,
        expected: &'static str,
    },

    #[error("detection #{index}: box {bbox:?} is not a finite x1<x2, y1<y2 rectangle")]
    InvalidBox { index: usize, bbox: [f32; 4] },

    #[error("detection #{index}: identity {track_id} already present in this frame")]
    DuplicateIdentity { index: usize, track_id: TrackId },
}

#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("failed to read zone file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse zone file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid reference frame size {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },

    #[error("zone `{name}` has invalid coordinates {coords:?}")]
    InvalidRect { name: String, coords: [f32; 4] },

    #[error("zone file defines no usable zones")]
    Empty,

    #[error("unknown zone `{0}`")]
    UnknownZone(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("no cycle bookkeeping for zone `{0}`")]
    UnknownZone(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize statistics: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("export task did not complete: {0}")]
    Task(String),
}

/// A component failure inside one frame. The frame carries on for every
/// other identity and component.
#[derive(Debug, Error)]
pub enum FrameIssue {
    #[error("occupancy update for ID {track_id}: {source}")]
    Occupancy {
        track_id: TrackId,
        #[source]
        source: ZoneError,
    },

    #[error("cycle bookkeeping for ID {track_id}: {source}")]
    Ledger {
        track_id: TrackId,
        #[source]
        source: LedgerError,
    },
}
