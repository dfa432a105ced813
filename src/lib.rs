//! FLIPBOOK - Frame-paced media playback engine library
//!
//! Plays units authored as rasterized frame sequences (or an external
//! transcoder pipe) at a fixed target fps, degrading gracefully when decode
//! cannot keep up: placeholder frames instead of stalls, catch-up skips
//! instead of drift.

// Core engine (buffer, prefetch, pacer, controller, workers)
pub mod core;

// App modules
pub mod audio;
pub mod cli;
pub mod config;
pub mod frame;
pub mod meta;
pub mod sequence;
pub mod source;
pub mod store;
pub mod surface;

// Re-export commonly used types from core
pub use crate::core::buffer::{LookaheadBuffer, PlayMode, PlaybackStats, TakeNext};
pub use crate::core::player::PlaybackController;

pub use config::PlaybackConfig;
pub use frame::{FrameError, FrameImage};
pub use meta::VideoMeta;
pub use source::{ConstructError, FrameSource, SourceKind, TranscodeCommand};
pub use store::{FsStore, Store};
