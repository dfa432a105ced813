//! Engine tuning knobs, optionally loaded from a JSON file
//!
//! All fields have defaults; an absent config file means defaults. Unknown
//! keys are ignored so older configs keep working.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_lookahead_seconds() -> f32 {
    2.0
}

fn default_decode_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackConfig {
    /// Seconds of frames the prefetcher keeps decoded ahead of the cursor.
    #[serde(default = "default_lookahead_seconds")]
    pub lookahead_seconds: f32,
    /// Bounded wait for a single frame decode before placeholder substitution.
    #[serde(default = "default_decode_timeout_ms")]
    pub decode_timeout_ms: u64,
    /// Decode pool size. `None` sizes to 3/4 of the CPU count.
    #[serde(default)]
    pub workers: Option<usize>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            lookahead_seconds: default_lookahead_seconds(),
            decode_timeout_ms: default_decode_timeout_ms(),
            workers: None,
        }
    }
}

impl PlaybackConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("encoding config")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing config {}", path.display()))
    }
}
