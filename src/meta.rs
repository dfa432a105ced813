//! Per-unit metadata record (`meta.json`)
//!
//! Produced by the authoring/transcoding step, consumed read-only here.
//! `target_fps` is derived at authoring time as
//! `min(real_frames / real_seconds, user cap)` and is fixed for the life of
//! a unit; the engine never recomputes it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::source::ConstructError;
use crate::store::Store;

/// File name of the metadata record inside a unit directory.
pub const META_FILE: &str = "meta.json";

/// Authoring-time metadata for one playable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoMeta {
    /// Bounds the playback cursor.
    pub total_frames: u32,
    pub target_fps: f32,
    /// Frame count of the original footage before rasterization.
    pub real_frames: u32,
    /// Duration of the original footage in whole seconds.
    pub real_seconds: u32,
    /// Original source the frames were transcoded from.
    #[serde(rename = "path")]
    pub source_path: String,
    /// Frame geometry, required by the piped variant for raw RGBA framing.
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl VideoMeta {
    /// Load and validate `meta.json` for the unit at `base`.
    ///
    /// `NotFound` when the record is absent, `ParseError` when it cannot be
    /// decoded, `EmptySequence` when it declares zero frames.
    pub fn load(store: &dyn Store, base: &Path) -> Result<Self, ConstructError> {
        let path = base.join(META_FILE);
        if store.stat(&path).is_none() {
            return Err(ConstructError::NotFound(path.display().to_string()));
        }
        let bytes = store
            .read(&path)
            .map_err(|e| ConstructError::ParseError(format!("{}: {}", path.display(), e)))?;
        let meta: VideoMeta = serde_json::from_slice(&bytes)
            .map_err(|e| ConstructError::ParseError(format!("{}: {}", path.display(), e)))?;
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> Result<(), ConstructError> {
        if self.total_frames == 0 {
            return Err(ConstructError::EmptySequence);
        }
        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            return Err(ConstructError::ParseError(format!(
                "invalid targetFps {}",
                self.target_fps
            )));
        }
        Ok(())
    }

    /// Nominal frame interval in seconds.
    pub fn frame_interval(&self) -> f64 {
        1.0 / f64::from(self.target_fps)
    }
}
