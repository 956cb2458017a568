use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::warn;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path))?;
        Ok(config)
    }

    /// Missing file means defaults; a present but broken file is still an error.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            warn!("⚠️  Config {} not found, using defaults", path);
            return Ok(Config::default());
        }
        Self::load(path)
    }

    /// Live frame size, when both dimensions are configured.
    pub fn live_frame_size(&self) -> Option<(u32, u32)> {
        match (self.zones.frame_width, self.zones.frame_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}
