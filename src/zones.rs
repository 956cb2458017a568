// src/zones.rs
//
// Named rectangular zones and their completed-transit counters.
//
// Zone files are authored at a reference resolution:
//   {"frame_size": {"height": h, "width": w},
//    "zones": {"zone1": {"coords": [x1, y1, x2, y2], "count": 0}, ...}}
// When the live frame size differs, every rectangle is rescaled once here.
// Any load failure falls back to the built-in zone set.

use crate::error::ZoneError;
use crate::geometry::Rect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub height: u32,
    pub width: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub coords: [f32; 4],
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneFile {
    pub frame_size: FrameSize,
    pub zones: BTreeMap<String, ZoneSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub name: String,
    pub rect: Rect,
    /// Completed transits, starting from the value stored in the zone file
    pub count: u64,
}

#[derive(Debug, Clone)]
pub struct ZoneSet {
    zones: BTreeMap<String, Zone>,
}

const DEFAULT_ZONES: [(&str, [f32; 4]); 3] = [
    ("zone1", [100.0, 100.0, 300.0, 300.0]),
    ("zone2", [400.0, 100.0, 600.0, 300.0]),
    ("zone3", [700.0, 100.0, 900.0, 300.0]),
];

impl ZoneSet {
    pub fn new(zones: impl IntoIterator<Item = Zone>) -> Self {
        Self {
            zones: zones.into_iter().map(|z| (z.name.clone(), z)).collect(),
        }
    }

    /// Built-in zones used when no zone file can be loaded.
    pub fn defaults() -> Self {
        Self::new(DEFAULT_ZONES.iter().map(|(name, coords)| Zone {
            name: name.to_string(),
            rect: Rect::from_coords(*coords),
            count: 0,
        }))
    }

    pub fn from_zone_file(file: ZoneFile, live: Option<FrameSize>) -> Result<Self, ZoneError> {
        let reference = file.frame_size;
        if reference.width == 0 || reference.height == 0 {
            return Err(ZoneError::InvalidFrameSize {
                width: reference.width,
                height: reference.height,
            });
        }

        let scale = match live {
            Some(live) if live != reference => {
                let sx = live.width as f32 / reference.width as f32;
                let sy = live.height as f32 / reference.height as f32;
                info!(
                    "📐 Rescaling zones {}x{} → {}x{} (x{:.3}, y{:.3})",
                    reference.width, reference.height, live.width, live.height, sx, sy
                );
                Some((sx, sy))
            }
            _ => None,
        };

        let mut zones = Vec::with_capacity(file.zones.len());
        for (name, spec) in file.zones {
            let mut rect = Rect::from_coords(spec.coords);
            if let Some((sx, sy)) = scale {
                rect = rect.scaled(sx, sy);
            }
            if !rect.is_well_formed() {
                let err = ZoneError::InvalidRect {
                    name,
                    coords: rect.coords(),
                };
                warn!("⚠️  Dropping zone: {}", err);
                continue;
            }
            zones.push(Zone {
                name,
                rect,
                count: spec.count,
            });
        }

        if zones.is_empty() {
            return Err(ZoneError::Empty);
        }
        Ok(Self::new(zones))
    }

    pub fn load(path: &Path, live: Option<FrameSize>) -> Result<Self, ZoneError> {
        let contents = fs::read_to_string(path).map_err(|source| ZoneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ZoneFile = serde_json::from_str(&contents)?;
        Self::from_zone_file(file, live)
    }

    pub fn load_or_default(path: &Path, live: Option<FrameSize>) -> Self {
        match Self::load(path, live) {
            Ok(zones) => {
                info!("✓ Loaded {} zone(s) from {}", zones.len(), path.display());
                zones
            }
            Err(e) => {
                warn!("⚠️  {}, using built-in default zones", e);
                Self::defaults()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&Zone> {
        self.zones.get(name)
    }

    /// Zones in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    /// Bump a zone's completed-transit counter and return the new value.
    pub fn increment(&mut self, name: &str) -> Result<u64, ZoneError> {
        let zone = self
            .zones
            .get_mut(name)
            .ok_or_else(|| ZoneError::UnknownZone(name.to_string()))?;
        zone.count += 1;
        Ok(zone.count)
    }

    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.zones
            .iter()
            .map(|(name, zone)| (name.clone(), zone.count))
            .collect()
    }
}
