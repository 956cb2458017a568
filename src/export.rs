// src/export.rs
//
// Statistics export. The engine hands over an owned LedgerSnapshot; the file
// is written on a blocking task so the frame loop never waits on disk.
// At most one export is in flight. Writes land in a temp file next to the
// destination and are renamed over it, so readers never see a partial file.

use crate::cycle_ledger::{CycleRecord, LedgerSnapshot, ZoneStatistics};
use crate::error::ExportError;
use crate::pipeline::metrics::PipelineMetrics;
use crate::types::TrackId;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tracing::{error, info};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Clone, Serialize)]
pub struct StatisticsDocument {
    pub zone_statistics: BTreeMap<String, ZoneStatistics>,
    pub completed_cycles: BTreeMap<String, Vec<ExportedCycle>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedCycle {
    pub track_id: TrackId,
    pub entry_time: String,
    pub exit_time: String,
    pub cycle_time: f64,
    pub cycle_time_formatted: String,
}

impl StatisticsDocument {
    pub fn from_snapshot(snapshot: &LedgerSnapshot) -> Self {
        let completed_cycles = snapshot
            .completed
            .iter()
            .map(|(zone, records)| {
                let cycles = records.iter().filter_map(ExportedCycle::from_record).collect();
                (zone.clone(), cycles)
            })
            .collect();

        Self {
            zone_statistics: snapshot.statistics.clone(),
            completed_cycles,
        }
    }
}

impl ExportedCycle {
    fn from_record(record: &CycleRecord) -> Option<Self> {
        let exit_time = record.exit_time?;
        let cycle_time = exit_time - record.entry_time;
        Some(Self {
            track_id: record.track_id,
            entry_time: format_timestamp(record.entry_time),
            exit_time: format_timestamp(exit_time),
            cycle_time,
            cycle_time_formatted: format_duration(cycle_time),
        })
    }
}

/// Unix seconds as local time with microseconds. Values chrono cannot
/// represent are written as plain seconds.
pub fn format_timestamp(secs: f64) -> String {
    if !secs.is_finite() {
        return format!("{}", secs);
    }
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    match DateTime::from_timestamp(whole as i64, nanos) {
        Some(utc) => utc.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string(),
        None => format!("{:.6}", secs),
    }
}

pub fn format_duration(secs: f64) -> String {
    format!("{:.2} seconds", secs)
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ExportError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| ExportError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

pub fn export_snapshot(snapshot: &LedgerSnapshot, path: &Path) -> Result<(), ExportError> {
    write_atomic(path, &StatisticsDocument::from_snapshot(snapshot))
}

pub struct StatisticsExporter {
    path: PathBuf,
    every_frames: u64,
    in_flight: Option<JoinHandle<Result<(), ExportError>>>,
    metrics: PipelineMetrics,
}

impl StatisticsExporter {
    pub fn new(path: impl Into<PathBuf>, every_frames: u64, metrics: PipelineMetrics) -> Self {
        Self {
            path: path.into(),
            every_frames,
            in_flight: None,
            metrics,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True on every non-zero multiple of the export cadence. A cadence of 0
    /// disables periodic export.
    pub fn is_due(&self, frames_processed: u64) -> bool {
        self.every_frames > 0 && frames_processed > 0 && frames_processed % self.every_frames == 0
    }

    /// Start a background export, after the previous one has finished.
    pub async fn schedule(&mut self, snapshot: LedgerSnapshot) {
        self.wait().await;
        let path = self.path.clone();
        self.in_flight = Some(tokio::task::spawn_blocking(move || {
            export_snapshot(&snapshot, &path)
        }));
    }

    /// Wait for the in-flight export, if any, and record its outcome.
    pub async fn wait(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            let result = join_export(handle).await;
            self.record(&result);
        }
    }

    /// Final export on shutdown: drains the in-flight one, then writes the
    /// given snapshot and reports how that went.
    pub async fn finish(&mut self, snapshot: LedgerSnapshot) -> Result<(), ExportError> {
        self.wait().await;
        let path = self.path.clone();
        let handle = tokio::task::spawn_blocking(move || export_snapshot(&snapshot, &path));
        let result = join_export(handle).await;
        self.record(&result);
        result
    }

    fn record(&self, result: &Result<(), ExportError>) {
        match result {
            Ok(()) => {
                self.metrics.inc(&self.metrics.exports_succeeded);
                info!("💾 Cycle time statistics saved to {}", self.path.display());
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.exports_failed);
                error!("❌ Failed to export statistics: {}", e);
            }
        }
    }
}

async fn join_export(handle: JoinHandle<Result<(), ExportError>>) -> Result<(), ExportError> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(ExportError::Task(e.to_string())),
    }
}
