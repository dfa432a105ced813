//! Core playback engine - buffer, prefetch, pacing, control
//!
//! These modules form the playback engine, independent of any host UI.

pub mod buffer;
pub mod pacer;
pub mod player;
pub mod prefetch;
pub mod workers;

// Re-exports for convenience
pub use buffer::{LookaheadBuffer, PlayMode, PlaybackStats, TakeNext};
pub use pacer::{catch_up_skip, Pacer};
pub use player::PlaybackController;
pub use workers::Workers;
