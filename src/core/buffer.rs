//! Lookahead buffer: the shared state of one playback unit
//!
//! **Why**: Smooth playback requires decoded frames ready before the pacer
//! asks for them. A bounded FIFO window of decoded frames rides ahead of the
//! play cursor; a background prefetch task keeps it topped up.
//!
//! **Used by**: Pacer (take_next each tick), Prefetcher (batch commits),
//! PlaybackController (mode transitions, stop/reset)
//!
//! # Concurrency
//!
//! One `RwLock` guards the queue, both cursors, the playback mode, and the
//! pending catch-up skip, the only state shared across the unit's tasks.
//! The decode itself never runs under this lock; only batch commits and
//! take_next do, bounding hold time. `buffering` is an atomic claim flag:
//! at most one prefetch task is in flight per unit. `epoch` invalidates
//! in-flight prefetch work when the unit is stopped.
//!
//! # Invariants
//!
//! - `current_frame` and `buffered_to` are monotonically non-decreasing,
//!   reset only by `reset()` (Stop).
//! - `buffered_to <= total_frames`.
//! - `frames.len() == buffered_to - current_frame` at any quiescent point.
//! - `take_next` never blocks: it returns a real frame, the placeholder, or
//!   end-of-stream, always within bounded time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{trace, warn};

use crate::config::PlaybackConfig;
use crate::frame::FrameImage;
use crate::source::FrameSource;

/// Playback unit lifecycle. `Finished` is terminal until an explicit Stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    Stopped,
    Playing,
    Paused,
    Finished,
}

/// One call of `take_next`.
#[derive(Debug)]
pub enum TakeNext {
    /// Head frame, cursor advanced.
    Ready(FrameImage),
    /// Data not ready this tick; present the placeholder and retry next tick.
    Pending(FrameImage),
    /// Cursor reached `total_frames`.
    Finished,
}

/// Counters exposed to the CLI and tests. Monotonic, relaxed ordering.
#[derive(Debug, Default)]
pub struct PlaybackStats {
    pub presented: AtomicUsize,
    pub placeholders: AtomicUsize,
    pub skipped: AtomicUsize,
    pub decode_failures: AtomicUsize,
    /// Achieved fps of the most recently closed throughput window, in
    /// hundredths (atomics carry no floats).
    pub window_fps_hundredths: AtomicUsize,
}

impl PlaybackStats {
    pub fn record_window_fps(&self, fps: f32) {
        let hundredths = (f64::from(fps.max(0.0)) * 100.0) as usize;
        self.window_fps_hundredths
            .store(hundredths, Ordering::Relaxed);
    }

    /// Achieved fps of the last closed window; 0.0 before the first close.
    pub fn window_fps(&self) -> f32 {
        self.window_fps_hundredths.load(Ordering::Relaxed) as f32 / 100.0
    }
}

pub(crate) struct Inner {
    pub(crate) frames: VecDeque<FrameImage>,
    pub(crate) current_frame: usize,
    pub(crate) buffered_to: usize,
    pub(crate) mode: PlayMode,
    /// Extra frames to drop on the next take_next (catch-up skip).
    pub(crate) pending_skip: usize,
}

pub struct LookaheadBuffer {
    pub(crate) inner: RwLock<Inner>,
    pub(crate) buffering: AtomicBool,
    pub(crate) epoch: Arc<AtomicU64>,
    pub(crate) source: FrameSource,
    pub(crate) total_frames: usize,
    pub(crate) target_fps: f32,
    pub(crate) placeholder: FrameImage,
    pub(crate) config: PlaybackConfig,
    pub(crate) stats: PlaybackStats,
}

impl LookaheadBuffer {
    pub(crate) fn new(source: FrameSource, config: PlaybackConfig, epoch: Arc<AtomicU64>) -> Self {
        let total_frames = source.total_frames();
        let target_fps = source.meta().target_fps;
        let (w, h) = source.frame_geometry();
        Self {
            inner: RwLock::new(Inner {
                frames: VecDeque::new(),
                current_frame: 0,
                buffered_to: 0,
                mode: PlayMode::Stopped,
                pending_skip: 0,
            }),
            buffering: AtomicBool::new(false),
            epoch,
            source,
            total_frames,
            target_fps,
            placeholder: FrameImage::placeholder(w, h),
            config,
            stats: PlaybackStats::default(),
        }
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn target_fps(&self) -> f32 {
        self.target_fps
    }

    pub fn placeholder(&self) -> &FrameImage {
        &self.placeholder
    }

    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.config.decode_timeout_ms)
    }

    /// Current play cursor, consistent with the last completed take_next.
    pub fn current_frame(&self) -> usize {
        self.inner.read().expect("buffer lock").current_frame
    }

    pub fn buffered_to(&self) -> usize {
        self.inner.read().expect("buffer lock").buffered_to
    }

    pub fn buffered_depth(&self) -> usize {
        self.inner.read().expect("buffer lock").frames.len()
    }

    pub fn mode(&self) -> PlayMode {
        self.inner.read().expect("buffer lock").mode
    }

    pub(crate) fn set_mode(&self, mode: PlayMode) {
        self.inner.write().expect("buffer lock").mode = mode;
    }

    /// True while a prefetch task is in flight.
    pub fn is_buffering(&self) -> bool {
        self.buffering.load(Ordering::Acquire)
    }

    /// Schedule a catch-up skip: the next take_next drops this many extra
    /// frames before popping. Skipped frames are never presented.
    pub fn schedule_skip(&self, extra: usize) {
        if extra == 0 {
            return;
        }
        let mut inner = self.inner.write().expect("buffer lock");
        inner.pending_skip = inner.pending_skip.max(extra);
        trace!("Catch-up skip scheduled: {} extra frames", extra);
    }

    fn apply_pending_skip(&self, inner: &mut Inner) {
        if inner.pending_skip == 0 {
            return;
        }
        let skip = inner
            .pending_skip
            .min(self.total_frames - inner.current_frame);
        inner.pending_skip = 0;
        if skip == 0 {
            return;
        }
        let dropped = skip.min(inner.frames.len());
        for _ in 0..dropped {
            inner.frames.pop_front();
        }
        inner.current_frame += skip;
        // Skip may outrun what is buffered; the cursor stays authoritative.
        if inner.buffered_to < inner.current_frame {
            inner.buffered_to = inner.current_frame;
        }
        self.stats.skipped.fetch_add(skip, Ordering::Relaxed);
        trace!(
            "Applied skip of {} (cursor now {}/{})",
            skip,
            inner.current_frame,
            self.total_frames
        );
    }

    /// Pull the next frame for presentation. Never blocks.
    ///
    /// Low-water policy: when fewer than one second of frames remain and more
    /// are fetchable and no prefetch is in flight, a fill is kicked off and
    /// the placeholder is served for this tick instead of blocking.
    pub fn take_next(self: &Arc<Self>) -> TakeNext {
        let mut inner = self.inner.write().expect("buffer lock");
        self.apply_pending_skip(&mut inner);

        if inner.current_frame >= self.total_frames {
            return TakeNext::Finished;
        }

        let low_water = self.target_fps.ceil().max(1.0) as usize;
        let more_to_fetch = inner.buffered_to < self.total_frames;
        if inner.frames.len() < low_water && more_to_fetch && !self.is_buffering() {
            drop(inner);
            crate::core::prefetch::request_fill(self);
            self.stats.placeholders.fetch_add(1, Ordering::Relaxed);
            return TakeNext::Pending(self.placeholder.clone());
        }

        match inner.frames.pop_front() {
            Some(frame) => {
                inner.current_frame += 1;
                self.stats.presented.fetch_add(1, Ordering::Relaxed);
                TakeNext::Ready(frame)
            }
            None => {
                // Fill in flight but nothing committed yet; serve the
                // placeholder and re-attempt next tick.
                self.stats.placeholders.fetch_add(1, Ordering::Relaxed);
                TakeNext::Pending(self.placeholder.clone())
            }
        }
    }

    /// Stop-time reset: bump the epoch so in-flight prefetch work is
    /// discarded, rewind the source, clear the queue, rewind both cursors.
    pub(crate) fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.source.rewind() {
            warn!("Frame source failed to restart for replay: {}", e);
        }
        let mut inner = self.inner.write().expect("buffer lock");
        inner.frames.clear();
        inner.current_frame = 0;
        inner.buffered_to = 0;
        inner.pending_skip = 0;
        inner.mode = PlayMode::Stopped;
    }
}
