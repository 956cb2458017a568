// src/main.rs

mod config;
mod cycle_ledger;
mod error;
mod export;
mod geometry;
mod input;
mod pipeline;
mod tracking;
mod types;
mod zones;

use anyhow::{Context, Result};
use export::StatisticsExporter;
use pipeline::{PipelineMetrics, ZoneEngine};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use types::Config;
use zones::{FrameSize, ZoneSet};

const CONFIG_ENV: &str = "ZONE_MONITOR_CONFIG";
const PROGRESS_EVERY_FRAMES: u64 = 500;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.yaml".to_string());
    let config_found = Path::new(&config_path).exists();
    let config = Config::load_or_default(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zone_monitor={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("📍 Zone Cycle-Time Monitor Starting");
    if config_found {
        info!("✓ Configuration loaded from {}", config_path);
    } else {
        warn!("⚠️  Config {} not found, running with defaults", config_path);
    }
    info!(
        "Continuity: max_disappeared_time={:.2}s, max_distance={:.1}px",
        config.engine.max_disappeared_time, config.engine.max_distance
    );

    let live = config
        .live_frame_size()
        .map(|(width, height)| FrameSize { height, width });
    let zones = ZoneSet::load_or_default(Path::new(&config.zones.path), live);
    for zone in zones.iter() {
        info!(
            "  🟩 {} [{:.0}, {:.0}, {:.0}, {:.0}] count={}",
            zone.name, zone.rect.x1, zone.rect.y1, zone.rect.x2, zone.rect.y2, zone.count
        );
    }

    let metrics = PipelineMetrics::new();
    let mut engine = ZoneEngine::with_metrics(zones, &config.engine, metrics.clone());
    let mut exporter = StatisticsExporter::new(
        config.export.path.clone(),
        config.export.every_frames,
        metrics.clone(),
    );
    info!("💾 Statistics will be written to: {}", exporter.path().display());

    let source = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.input.detections_path.clone());
    let reader = open_detections(&source).await?;
    info!("📥 Reading detections from {}", source);

    run(reader, &mut engine, &mut exporter, &metrics).await;

    // Final export after the in-flight one has landed
    if exporter.finish(engine.snapshot()).await.is_err() {
        warn!("⚠️  Final statistics were not saved");
    }

    print_final_report(&engine, &metrics);
    Ok(())
}

async fn open_detections(source: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    if source == "-" {
        return Ok(Box::new(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(source)
        .await
        .with_context(|| format!("Failed to open detections {}", source))?;
    Ok(Box::new(file))
}

/// Frame loop. Returns on end of input, read failure or Ctrl-C; shutdown is
/// only ever observed between frames.
async fn run(
    reader: Box<dyn AsyncRead + Unpin + Send>,
    engine: &mut ZoneEngine,
    exporter: &mut StatisticsExporter,
    metrics: &PipelineMetrics,
) {
    let mut lines = BufReader::new(reader).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut line_no: u64 = 0;
    loop {
        let next = tokio::select! {
            _ = &mut shutdown => {
                info!("🛑 Ctrl-C received, finishing up");
                break;
            }
            next = lines.next_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("📭 End of detection stream");
                break;
            }
            Err(e) => {
                error!("Failed to read detections: {}", e);
                break;
            }
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let parsed = match input::parse_frame_line(&line, wall_clock_seconds()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("⚠️  Skipping line {}: {}", line_no, e);
                metrics.inc(&metrics.frames_rejected);
                continue;
            }
        };
        for rejected in &parsed.rejected {
            warn!("⚠️  Line {}: {}", line_no, rejected);
        }
        metrics.add(&metrics.detections_rejected, parsed.rejected.len() as u64);

        let report = engine.process_frame(&parsed.frame);
        for issue in &report.issues {
            error!("Frame {}: {}", report.frame_index, issue);
        }
        if report.relinks + report.transitions + report.evictions > 0 {
            debug!(
                "Frame {} @ {:.3}: {} transition(s), {} re-link(s), {} eviction(s)",
                report.frame_index,
                report.timestamp,
                report.transitions,
                report.relinks,
                report.evictions
            );
        }
        for event in engine.drain_events() {
            event.log();
        }

        let frames = engine.frames_processed();
        if exporter.is_due(frames) {
            exporter.schedule(engine.snapshot()).await;
        }
        if frames % PROGRESS_EVERY_FRAMES == 0 {
            debug!(
                "Frame {}: {} tracked ID(s), {:.1} FPS",
                frames,
                engine.get_active_tracks().len(),
                metrics.fps()
            );
        }
    }
}

fn wall_clock_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn print_final_report(engine: &ZoneEngine, metrics: &PipelineMetrics) {
    info!("\n📊 Final Report:");

    info!("  Zone counts:");
    for (zone, count) in engine.get_counts() {
        info!("    {}: {}", zone, count);
    }

    info!("  Cycle time statistics:");
    for (zone, stats) in engine.get_zone_statistics() {
        if stats.total_objects > 0 {
            info!(
                "    {}: {} completed, min={:.2}s max={:.2}s avg={:.2}s, {} open, {} stale",
                zone,
                stats.total_objects,
                stats.min_time,
                stats.max_time,
                stats.avg_time,
                stats.current_objects,
                stats.stale_objects
            );
        } else {
            info!(
                "    {}: no completed cycles, {} open, {} stale",
                zone, stats.current_objects, stats.stale_objects
            );
        }
    }

    if let Some(now) = engine.last_timestamp() {
        let open = engine.get_current_cycle_times(now);
        if !open.is_empty() {
            info!("  Open cycles at shutdown:");
            for (track_id, zones) in open {
                for (zone, secs) in zones {
                    info!("    ID {} in {} for {:.2}s", track_id, zone, secs);
                }
            }
        }
    }

    let summary = metrics.summary();
    info!("  Frames processed: {}", summary.total_frames);
    info!(
        "  Detections: {} accepted, {} rejected ({} unreadable line(s))",
        summary.detections_accepted, summary.detections_rejected, summary.frames_rejected
    );
    info!("  🔗 Re-links: {}", summary.relinks);
    info!("  🗑️  Evictions: {}", summary.evictions);
    info!("  ✅ Completed cycles: {}", summary.completed_cycles);
    info!(
        "  💾 Exports: {} ok, {} failed",
        summary.exports_succeeded, summary.exports_failed
    );
    info!(
        "  Processing Speed: {:.1} FPS (last frame {}µs)",
        summary.fps, summary.last_frame_us
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use types::EngineConfig;

    fn reader(lines: &[&str]) -> Box<dyn AsyncRead + Unpin + Send> {
        Box::new(std::io::Cursor::new(lines.join("\n").into_bytes()))
    }

    #[tokio::test]
    async fn test_run_skips_bad_lines_and_exports_on_cadence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cycle_time_stats.json");
        let metrics = PipelineMetrics::new();
        let mut engine =
            ZoneEngine::with_metrics(ZoneSet::defaults(), &EngineConfig::default(), metrics.clone());
        let mut exporter = StatisticsExporter::new(path.clone(), 2, metrics.clone());

        let input = reader(&[
            r#"{"timestamp": 0.0, "detections": [{"bbox": [190, 190, 210, 210], "track_id": 1}]}"#,
            "this is not a frame",
            "",
            r#"{"timestamp": 1.0, "detections": [{"bbox": [340, 190, 360, 210], "track_id": 1}, {"bbox": [0, 0, 5], "track_id": 2}]}"#,
            r#"{"timestamp": 2.0, "detections": []}"#,
        ]);

        run(input, &mut engine, &mut exporter, &metrics).await;
        exporter.wait().await;

        let summary = metrics.summary();
        assert_eq!(summary.total_frames, 3, "bad and blank lines are not frames");
        assert_eq!(summary.frames_rejected, 1);
        assert_eq!(summary.detections_rejected, 1);
        assert_eq!(summary.detections_accepted, 2);
        assert_eq!(summary.exports_succeeded, 1, "only frame 2 is on the cadence");
        assert_eq!(summary.exports_failed, 0);
        assert_eq!(engine.get_counts()["zone1"], 1);

        let text = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["zone_statistics"]["zone1"]["total_objects"], 1);
        assert_eq!(json["completed_cycles"]["zone1"][0]["track_id"], 1);
    }

    #[tokio::test]
    async fn test_run_without_cadence_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let metrics = PipelineMetrics::new();
        let mut engine =
            ZoneEngine::with_metrics(ZoneSet::defaults(), &EngineConfig::default(), metrics.clone());
        let mut exporter = StatisticsExporter::new(path.clone(), 0, metrics.clone());

        let input = reader(&[
            r#"{"timestamp": 0.0, "detections": []}"#,
            r#"{"timestamp": 0.5, "detections": []}"#,
        ]);
        run(input, &mut engine, &mut exporter, &metrics).await;
        exporter.wait().await;

        assert_eq!(metrics.summary().total_frames, 2);
        assert_eq!(metrics.summary().exports_succeeded, 0);
        assert!(!path.exists());
    }
}
