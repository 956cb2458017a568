use serde::{Deserialize, Serialize};

/// Tracker-assigned identity. Normalized to this type at the input boundary.
pub type TrackId = u32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub zones: ZonesConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds an identity may stay unseen and still be re-linked
    #[serde(default = "default_max_disappeared_time")]
    pub max_disappeared_time: f64,
    /// Pixels between a lost center and a new one for re-linking
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,
    /// Pending lifecycle events kept before the oldest are dropped
    #[serde(default = "default_max_pending_events")]
    pub max_pending_events: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZonesConfig {
    #[serde(default = "default_zones_path")]
    pub path: String,
    /// Live frame size; zones are rescaled when it differs from the file's
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// JSON Lines file, one frame of detections per line
    #[serde(default = "default_detections_path")]
    pub detections_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_path")]
    pub path: String,
    #[serde(default = "default_export_every_frames")]
    pub every_frames: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_disappeared_time() -> f64 {
    1.0
}

fn default_max_distance() -> f32 {
    50.0
}

fn default_max_pending_events() -> usize {
    1024
}

fn default_zones_path() -> String {
    "zones/zones.json".to_string()
}

fn default_detections_path() -> String {
    "detections.jsonl".to_string()
}

fn default_export_path() -> String {
    "cycle_time_stats.json".to_string()
}

fn default_export_every_frames() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_disappeared_time: default_max_disappeared_time(),
            max_distance: default_max_distance(),
            max_pending_events: default_max_pending_events(),
        }
    }
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self {
            path: default_zones_path(),
            frame_width: None,
            frame_height: None,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            detections_path: default_detections_path(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: default_export_path(),
            every_frames: default_export_every_frames(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One accepted detection. Confidence and class are carried through but the
/// engine only looks at identity and box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub track_id: TrackId,
    pub bbox: [f32; 4], // [x1, y1, x2, y2] pixels
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn center(&self) -> crate::geometry::Point {
        crate::geometry::center(&self.bbox)
    }
}

/// All accepted detections for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    /// Unix seconds
    pub timestamp: f64,
    pub detections: Vec<Detection>,
}

impl FrameInput {
    pub fn new(timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            timestamp,
            detections,
        }
    }
}
