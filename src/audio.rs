//! Audio track hooks driven by playback transitions
//!
//! The engine does not decode or mix audio itself; it drives whatever track
//! implementation the host supplies in lockstep with the video transitions:
//! Play starts the track, Pause/Resume gate it, Stop rewinds it. Sync is
//! one-directional: video skips to stay near the audio clock, the audio is
//! never resampled.

use once_cell::sync::OnceCell;

use log::debug;

/// Host-supplied audio sink for one playback unit.
pub trait AudioTrack: Send {
    fn play(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);

    /// Linear volume in `[0, 1]`. Default ignores it.
    fn set_volume(&mut self, _volume: f32) {}
}

/// Silent track for units without audio and for headless runs.
#[derive(Debug, Default)]
pub struct NullAudio;

impl AudioTrack for NullAudio {
    fn play(&mut self) {}
    fn pause(&mut self) {}
    fn resume(&mut self) {}
    fn stop(&mut self) {}
}

static SPEAKER_INIT: OnceCell<()> = OnceCell::new();

/// One-time audio device warmup. The first `play` on some backends pays a
/// device-open latency that desyncs the opening frames; hosts call this once
/// at startup instead. Idempotent.
pub fn ensure_speaker_init() {
    SPEAKER_INIT.get_or_init(|| {
        debug!("Speaker init");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_audio_is_inert() {
        let mut audio = NullAudio;
        audio.play();
        audio.pause();
        audio.resume();
        audio.stop();
    }

    #[test]
    fn test_speaker_init_idempotent() {
        ensure_speaker_init();
        ensure_speaker_init();
    }
}
