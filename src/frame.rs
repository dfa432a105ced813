//! Decoded frame handles and the well-known placeholder
//!
//! **Why**: The playback loop must always have *something* to present. A frame
//! that failed to decode, or has not been prefetched yet, degrades to a fixed
//! placeholder instead of stalling the pacer.
//!
//! **Used by**: Prefetcher (decode results), LookaheadBuffer (queue entries),
//! Pacer (presentation)
//!
//! # Representation
//!
//! `FrameImage` is RGBA8 behind an `Arc<[u8]>` so clones are cheap: the same
//! decoded frame moves through the buffer, the pacer, and the surface without
//! copying pixels.

use std::fmt;
use std::io::{BufRead, Seek};
use std::path::Path;
use std::sync::Arc;

use log::debug;

/// Dark green, same sentinel the authoring tool renders for missing frames.
const PLACEHOLDER_RGBA: [u8; 4] = [0, 100, 0, 255];

/// Decoded RGBA8 frame. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FrameImage {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
    placeholder: bool,
}

/// Per-frame decode errors. Recovered by placeholder substitution upstream;
/// never fatal to a playback unit.
#[derive(Debug)]
pub enum FrameError {
    Io(String),
    Decode(String),
    Timeout,
    BadGeometry { expected: usize, got: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Io(e) => write!(f, "I/O error: {}", e),
            FrameError::Decode(e) => write!(f, "Decode error: {}", e),
            FrameError::Timeout => write!(f, "Decode timed out"),
            FrameError::BadGeometry { expected, got } => {
                write!(f, "Bad frame geometry: expected {} bytes, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for FrameError {}

impl FrameImage {
    /// Fixed fallback frame substituted when a real frame is not available.
    pub fn placeholder(width: u32, height: u32) -> Self {
        let w = width.max(1);
        let h = height.max(1);
        let mut buf = vec![0u8; (w * h * 4) as usize];
        for px in buf.chunks_mut(4) {
            px.copy_from_slice(&PLACEHOLDER_RGBA);
        }
        Self {
            width: w,
            height: h,
            data: buf.into(),
            placeholder: true,
        }
    }

    /// Wrap already-decoded RGBA8 pixels (the piped transcoder emits these raw).
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = (width as usize) * (height as usize) * 4;
        if data.len() != expected {
            return Err(FrameError::BadGeometry { expected, got: data.len() });
        }
        Ok(Self {
            width,
            height,
            data: data.into(),
            placeholder: false,
        })
    }

    /// Decode an encoded image (PNG/JPEG/TIFF/TGA) from raw bytes.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let img = image::load_from_memory(bytes).map_err(|e| FrameError::Decode(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!("Decoded frame: {}x{}", width, height);
        Ok(Self {
            width,
            height,
            data: rgba.into_raw().into(),
            placeholder: false,
        })
    }

    /// Decode from any seekable stream (the storage provider's `open`).
    pub fn decode_stream<R: BufRead + Seek>(reader: R) -> Result<Self, FrameError> {
        let img = image::ImageReader::new(reader)
            .with_guessed_format()
            .map_err(|e| FrameError::Io(e.to_string()))?
            .decode()
            .map_err(|e| FrameError::Decode(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            data: rgba.into_raw().into(),
            placeholder: false,
        })
    }

    /// Header-only validity check: does this file decode as an image?
    /// Used when building a FrameSequence; full pixel decode is deferred.
    pub fn probe(path: &Path) -> Result<(u32, u32), FrameError> {
        let reader = image::ImageReader::open(path).map_err(|e| FrameError::Io(e.to_string()))?;
        reader
            .into_dimensions()
            .map_err(|e| FrameError::Decode(e.to_string()))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGBA8 pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// True for the fallback frame (not decoded from source material).
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Memory footprint in bytes.
    pub fn mem(&self) -> usize {
        self.data.len()
    }
}
