//! Playback controller: the public face of one playback unit
//!
//! State machine: Stopped → Playing ⇄ Paused, with Finished terminal until an
//! explicit Stop. `play` on a Finished unit is a no-op; Stop rewinds and the
//! unit is replayable from the start.
//!
//! The controller owns the playback loop task. One tick per frame interval:
//! pull the next frame (never blocking), hand it to the surface, settle the
//! throughput window, sleep out the remainder. Pause is cooperative: the loop
//! task sees the flag at its next tick and exits; resume spawns a fresh one.
//! Stop additionally silences the audio track, bumps the unit epoch so
//! in-flight decodes die quietly, and rewinds.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::audio::{ensure_speaker_init, AudioTrack};
use crate::config::PlaybackConfig;
use crate::core::buffer::{LookaheadBuffer, PlayMode, PlaybackStats, TakeNext};
use crate::core::pacer::{catch_up_skip, Pacer};
use crate::core::prefetch::request_fill;
use crate::core::workers::decode_pool;
use crate::source::{ConstructError, FrameSource, SourceKind};
use crate::store::Store;
use crate::surface::PresentSurface;

pub struct PlaybackController {
    id: Uuid,
    buffer: Arc<LookaheadBuffer>,
    surface: Arc<Mutex<Box<dyn PresentSurface>>>,
    audio: Mutex<Box<dyn AudioTrack>>,
    loop_running: Arc<AtomicBool>,
    loop_handle: Option<JoinHandle<()>>,
}

impl PlaybackController {
    /// Resolve a playable unit at `base` and prepare it for playback.
    /// Kicks a warmup prefetch so `play` has frames ready.
    pub fn open(
        store: Arc<dyn Store>,
        base: &Path,
        kind: SourceKind,
        config: PlaybackConfig,
        surface: Box<dyn PresentSurface>,
        audio: Box<dyn AudioTrack>,
    ) -> Result<Self, ConstructError> {
        let _ = decode_pool(config.workers);
        let epoch = Arc::new(AtomicU64::new(0));
        let source = FrameSource::open(store, base, kind, Arc::clone(&epoch))?;
        let buffer = Arc::new(LookaheadBuffer::new(source, config, epoch));
        let id = Uuid::new_v4();
        info!(
            "Unit {}: {} frames @ {:.2} fps",
            id,
            buffer.total_frames(),
            buffer.target_fps()
        );

        request_fill(&buffer);

        Ok(Self {
            id,
            buffer,
            surface: Arc::new(Mutex::new(surface)),
            audio: Mutex::new(audio),
            loop_running: Arc::new(AtomicBool::new(false)),
            loop_handle: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> PlayMode {
        self.buffer.mode()
    }

    pub fn is_finished(&self) -> bool {
        self.buffer.mode() == PlayMode::Finished
    }

    /// Cursor of the last presented frame.
    pub fn current_frame(&self) -> usize {
        self.buffer.current_frame()
    }

    pub fn total_frames(&self) -> usize {
        self.buffer.total_frames()
    }

    pub fn stats(&self) -> &PlaybackStats {
        self.buffer.stats()
    }

    /// Start or resume playback.
    ///
    /// Stopped starts the loop from frame 0; Paused resumes in place; Playing
    /// is a no-op. Finished is a no-op too: replay requires an explicit
    /// `stop` first.
    pub fn play(&mut self) {
        match self.buffer.mode() {
            PlayMode::Playing => debug!("Unit {}: already playing", self.id),
            PlayMode::Finished => {
                warn!("Unit {}: finished; stop() before replaying", self.id)
            }
            PlayMode::Paused => {
                // The paused loop task may still be mid-tick and would see
                // Playing again if the mode flipped first; retire it before
                // resuming. The join is bounded by one tick sleep.
                self.loop_running.store(false, Ordering::Release);
                self.reap_loop();
                self.audio.lock().expect("audio lock").resume();
                self.buffer.set_mode(PlayMode::Playing);
                self.start_loop();
                info!("Unit {}: resumed at frame {}", self.id, self.current_frame());
            }
            PlayMode::Stopped => {
                ensure_speaker_init();
                self.audio.lock().expect("audio lock").play();
                self.buffer.set_mode(PlayMode::Playing);
                request_fill(&self.buffer);
                self.start_loop();
                info!("Unit {}: playing", self.id);
            }
        }
    }

    /// Spawn the loop task. Only one runs per unit: the previous task has
    /// always exited (pause/finish) or been joined (stop) before this runs.
    fn start_loop(&mut self) {
        self.reap_loop();
        let buffer = Arc::clone(&self.buffer);
        let surface = Arc::clone(&self.surface);
        let running = Arc::clone(&self.loop_running);
        running.store(true, Ordering::Release);
        let handle = thread::Builder::new()
            .name(format!("flipbook-play-{}", self.id.simple()))
            .spawn(move || playback_loop(buffer, surface, running));
        match handle {
            Ok(handle) => self.loop_handle = Some(handle),
            Err(e) => {
                self.loop_running.store(false, Ordering::Release);
                self.buffer.set_mode(PlayMode::Stopped);
                warn!("Unit {}: failed to start playback loop: {}", self.id, e);
            }
        }
    }

    /// Freeze on the current frame. Cooperative: the loop task observes the
    /// mode at the top of its next tick and exits cleanly; the audio track is
    /// gated alongside.
    pub fn pause(&mut self) {
        if self.buffer.mode() == PlayMode::Playing {
            self.audio.lock().expect("audio lock").pause();
            self.buffer.set_mode(PlayMode::Paused);
            info!("Unit {}: paused at frame {}", self.id, self.current_frame());
        }
    }

    /// Forwarded to the unit's audio track.
    pub fn set_volume(&self, volume: f32) {
        self.audio.lock().expect("audio lock").set_volume(volume);
    }

    /// Tear down playback and rewind to frame 0. Valid in every state; after
    /// this the unit is replayable.
    pub fn stop(&mut self) {
        self.loop_running.store(false, Ordering::Release);
        self.reap_loop();
        self.audio.lock().expect("audio lock").stop();
        self.buffer.reset();
        info!("Unit {}: stopped", self.id);
    }

    /// Block until playback reaches Finished, up to `timeout`. Headless runs
    /// and tests only; interactive hosts poll `is_finished` instead.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    fn reap_loop(&mut self) {
        if let Some(handle) = self.loop_handle.take() {
            if let Err(e) = handle.join() {
                warn!("Unit {}: playback loop panicked: {:?}", self.id, e);
            }
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn playback_loop(
    buffer: Arc<LookaheadBuffer>,
    surface: Arc<Mutex<Box<dyn PresentSurface>>>,
    running: Arc<AtomicBool>,
) {
    let mut pacer = Pacer::new(buffer.target_fps());
    {
        let (w, h) = buffer.placeholder().resolution();
        surface.lock().expect("surface lock").resize(w, h);
    }

    while running.load(Ordering::Acquire) {
        let tick = Instant::now();

        // Cooperative suspension: a Pause (or a racing Stop) is observed
        // here and the task exits; resume spawns a fresh task.
        if buffer.mode() != PlayMode::Playing {
            debug!("Playback loop exiting at frame {}", buffer.current_frame());
            break;
        }

        let presented = match buffer.take_next() {
            TakeNext::Ready(frame) => {
                surface.lock().expect("surface lock").present(&frame);
                true
            }
            TakeNext::Pending(frame) => {
                surface.lock().expect("surface lock").present(&frame);
                false
            }
            TakeNext::Finished => {
                buffer.set_mode(PlayMode::Finished);
                info!("Playback finished at frame {}", buffer.current_frame());
                break;
            }
        };

        if let Some(achieved) = pacer.record(presented) {
            buffer.stats().record_window_fps(achieved);
            let skip = catch_up_skip(buffer.target_fps(), achieved);
            if skip > 0 {
                warn!(
                    "Behind realtime ({:.2}/{:.2} fps), skipping {} frames",
                    achieved,
                    buffer.target_fps(),
                    skip
                );
                buffer.schedule_skip(skip);
            }
        }

        pacer.pace(tick);
    }
    running.store(false, Ordering::Release);
}
