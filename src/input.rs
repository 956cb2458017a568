// src/input.rs
//
// Detection stream boundary. Each line of the input is one frame:
//   {"timestamp": 1718000000.25,
//    "detections": [{"bbox": [x1, y1, x2, y2], "confidence": 0.9,
//                    "class_id": 0, "track_id": 7}, ...]}
//
// Identities are normalized to TrackId here and nowhere else. A bad
// detection is rejected on its own; the rest of the frame still goes through.

use crate::error::DetectionError;
use crate::geometry::Rect;
use crate::types::{Detection, FrameInput, TrackId};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
struct RawFrame {
    timestamp: Option<f64>,
    #[serde(default)]
    detections: Option<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct ParsedFrame {
    pub frame: FrameInput,
    pub rejected: Vec<DetectionError>,
}

/// Parse one input line. `fallback_time` is used when the frame carries no
/// timestamp. Only a line that is not a JSON frame object fails as a whole.
pub fn parse_frame_line(line: &str, fallback_time: f64) -> Result<ParsedFrame, serde_json::Error> {
    let raw: RawFrame = serde_json::from_str(line)?;
    let timestamp = raw.timestamp.filter(|t| t.is_finite()).unwrap_or(fallback_time);

    let mut detections = Vec::new();
    let mut rejected = Vec::new();
    let mut seen: HashSet<TrackId> = HashSet::new();

    for (index, value) in raw.detections.unwrap_or_default().iter().enumerate() {
        match parse_detection(index, value) {
            Ok(det) => {
                if !seen.insert(det.track_id) {
                    rejected.push(DetectionError::DuplicateIdentity {
                        index,
                        track_id: det.track_id,
                    });
                    continue;
                }
                detections.push(det);
            }
            Err(e) => rejected.push(e),
        }
    }

    Ok(ParsedFrame {
        frame: FrameInput::new(timestamp, detections),
        rejected,
    })
}

pub fn parse_detection(index: usize, value: &Value) -> Result<Detection, DetectionError> {
    let track_id = match value.get("track_id") {
        None | Some(Value::Null) => {
            return Err(DetectionError::MissingField {
                index,
                field: "track_id",
            })
        }
        Some(v) => normalize_track_id(v).ok_or(DetectionError::InvalidField {
            index,
            field: "track_id",
            expected: "non-negative integer identity",
        })?,
    };

    let bbox = match value.get("bbox") {
        None | Some(Value::Null) => {
            return Err(DetectionError::MissingField {
                index,
                field: "bbox",
            })
        }
        Some(v) => parse_bbox(v).ok_or(DetectionError::InvalidField {
            index,
            field: "bbox",
            expected: "array of 4 numbers",
        })?,
    };
    if !Rect::from_coords(bbox).is_well_formed() {
        return Err(DetectionError::InvalidBox { index, bbox });
    }

    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0) as f32;
    let class_id = value
        .get("class_id")
        .and_then(Value::as_u64)
        .and_then(|c| u32::try_from(c).ok())
        .unwrap_or(0);

    Ok(Detection {
        track_id,
        bbox,
        confidence,
        class_id,
    })
}

/// Trackers hand identities over as integers or integral floats.
fn normalize_track_id(value: &Value) -> Option<TrackId> {
    if let Some(id) = value.as_u64() {
        return TrackId::try_from(id).ok();
    }
    let f = value.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= TrackId::MAX as f64 {
        Some(f as TrackId)
    } else {
        None
    }
}

fn parse_bbox(value: &Value) -> Option<[f32; 4]> {
    let items = value.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut bbox = [0.0f32; 4];
    for (slot, item) in bbox.iter_mut().zip(items) {
        *slot = item.as_f64()? as f32;
    }
    Some(bbox)
}
