//! Frame sequence detection and numeric ordering
//!
//! **Why**: The authoring step rasterizes footage into numbered frames
//! (frame.0001.png, frame.0002.png...). Playback order is the integer in each
//! file name, not lexicographic order, so `frame.10.png` follows
//! `frame.9.png`.
//!
//! **Used by**: FrameSource construction (once per unit)
//!
//! # Ordering rules
//!
//! - Sort key is the *last* digit group in the file stem (handles prefixes
//!   like `shot2_frame.0042`).
//! - Entries with no digit group sort after all numbered entries, stable
//!   relative to input order.
//! - Gaps in the numbering are tolerated; the sequence is the sorted set of
//!   what exists.
//!
//! # Validation
//!
//! Entries that fail a header-only image probe are dropped with a warning;
//! a stray thumbnail or truncated file must not break the unit.

use std::path::{Path, PathBuf};

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::frame::FrameImage;
use crate::source::ConstructError;
use crate::store::Store;

/// Directory of frames inside a unit directory.
pub const FRAMES_DIR: &str = "frames";

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit regex"));

/// Ordered list of frame file paths for one playable unit.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    entries: Vec<PathBuf>,
}

/// Last digit group of the file stem, if any.
fn frame_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let m = DIGITS.find_iter(stem).last()?;
    m.as_str().parse::<u64>().ok()
}

impl FrameSequence {
    /// Enumerate and order the `frames/` directory of a unit.
    ///
    /// `NotFound` when the directory is absent; `EmptySequence` when no entry
    /// survives validation.
    pub fn scan(store: &dyn Store, base: &Path) -> Result<Self, ConstructError> {
        let dir = base.join(FRAMES_DIR);
        match store.stat(&dir) {
            Some(info) if info.is_dir => {}
            _ => return Err(ConstructError::NotFound(dir.display().to_string())),
        }

        let listed = store
            .list(&dir)
            .map_err(|e| ConstructError::NotFound(format!("{}: {}", dir.display(), e)))?;

        let mut entries = Vec::with_capacity(listed.len());
        for path in listed {
            match FrameImage::probe(&path) {
                Ok(_) => entries.push(path),
                Err(e) => warn!("Dropping invalid frame entry {}: {}", path.display(), e),
            }
        }

        if entries.is_empty() {
            return Err(ConstructError::EmptySequence);
        }

        // Stable sort: numbered entries ascending, unnumbered after them in
        // input order.
        entries.sort_by_key(|p| match frame_number(p) {
            Some(n) => (0u8, n),
            None => (1u8, 0),
        });

        info!("Sequence: {} frames under {}", entries.len(), dir.display());
        Ok(Self { entries })
    }

    /// Build directly from known paths (test fixtures, pipe variant bookkeeping).
    pub fn from_paths(mut entries: Vec<PathBuf>) -> Result<Self, ConstructError> {
        if entries.is_empty() {
            return Err(ConstructError::EmptySequence);
        }
        entries.sort_by_key(|p| match frame_number(p) {
            Some(n) => (0u8, n),
            None => (1u8, 0),
        });
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path of the idx-th frame in playback order.
    pub fn path(&self, idx: usize) -> Option<&Path> {
        self.entries.get(idx).map(PathBuf::as_path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(names: &[&str]) -> Vec<String> {
        let paths: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();
        let seq = FrameSequence::from_paths(paths).unwrap();
        seq.paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_numeric_order_beats_lexicographic() {
        let ordered = seq(&["f.10.png", "f.2.png", "f.1.png"]);
        assert_eq!(ordered, vec!["f.1.png", "f.2.png", "f.10.png"]);
    }

    #[test]
    fn test_last_digit_group_wins() {
        let ordered = seq(&["shot2_f.0003.png", "shot2_f.0001.png", "shot2_f.0002.png"]);
        assert_eq!(
            ordered,
            vec!["shot2_f.0001.png", "shot2_f.0002.png", "shot2_f.0003.png"]
        );
    }

    #[test]
    fn test_non_numeric_sort_last_stable() {
        let ordered = seq(&["cover.png", "f.2.png", "title.png", "f.1.png"]);
        assert_eq!(ordered, vec!["f.1.png", "f.2.png", "cover.png", "title.png"]);
    }

    #[test]
    fn test_gaps_tolerated() {
        let ordered = seq(&["f.5.png", "f.1.png", "f.9.png"]);
        assert_eq!(ordered, vec!["f.1.png", "f.5.png", "f.9.png"]);
    }

    #[test]
    fn test_empty_is_fatal() {
        assert!(matches!(
            FrameSequence::from_paths(Vec::new()),
            Err(ConstructError::EmptySequence)
        ));
    }
}
