//! Background fill of the lookahead window
//!
//! `request_fill` is the only entry point: an atomic claim on the unit's
//! `buffering` flag guarantees at most one fill task per unit at a time.
//! Redundant kicks (every low-water tick while a fill runs) are free no-ops.
//!
//! The fill task decodes without holding the buffer lock, then commits in
//! small batches under a short write lock, so take_next never waits on a
//! decode. Each batch commit re-checks the unit epoch: a Stop between decode
//! and commit discards the batch instead of resurrecting stale frames.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use log::{debug, trace, warn};

use crate::core::buffer::LookaheadBuffer;

/// Frames decoded per commit. Small enough that a commit lock hold is
/// negligible next to a frame interval.
const FILL_BATCH: usize = 8;

/// Kick a background fill if none is in flight. Returns immediately.
pub fn request_fill(buffer: &Arc<LookaheadBuffer>) {
    if buffer
        .buffering
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        trace!("Fill already in flight, kick ignored");
        return;
    }

    let unit = Arc::clone(buffer);
    let spawned = thread::Builder::new()
        .name("flipbook-prefetch".into())
        .spawn(move || {
            fill_window(&unit);
            unit.buffering.store(false, Ordering::Release);
        });

    if let Err(e) = spawned {
        buffer.buffering.store(false, Ordering::Release);
        warn!("Failed to spawn prefetch task: {}", e);
    }
}

/// Decode up to one lookahead window of frames past `buffered_to` and commit
/// them in batches. Exits early when the epoch moves (Stop) or the window is
/// already full.
fn fill_window(buffer: &LookaheadBuffer) {
    let epoch = buffer.epoch.load(Ordering::Acquire);
    let window = (f64::from(buffer.target_fps) * f64::from(buffer.config.lookahead_seconds))
        .ceil()
        .max(1.0) as usize;

    let (start, end) = {
        let inner = buffer.inner.read().expect("buffer lock");
        let end = (inner.current_frame + window).min(buffer.total_frames);
        (inner.buffered_to, end)
    };
    if start >= end {
        trace!("Lookahead window already full ({}..{})", start, end);
        return;
    }
    debug!("Filling frames {}..{}", start, end);

    let timeout = buffer.decode_timeout();
    let mut next = start;
    while next < end {
        let batch_end = (next + FILL_BATCH).min(end);
        let mut batch = Vec::with_capacity(batch_end - next);
        for idx in next..batch_end {
            if buffer.epoch.load(Ordering::Acquire) != epoch {
                debug!("Fill abandoned at frame {}: unit stopped", idx);
                return;
            }
            let frame = match buffer.source.fetch(idx, timeout) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Frame {} failed to decode ({}), substituting placeholder", idx, e);
                    buffer.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                    buffer.placeholder.clone()
                }
            };
            batch.push(frame);
        }

        let mut inner = buffer.inner.write().expect("buffer lock");
        if buffer.epoch.load(Ordering::Acquire) != epoch {
            debug!("Discarding stale batch {}..{}", next, batch_end);
            return;
        }
        // A skip may have moved buffered_to past this batch's start; drop the
        // overlap so the queue stays aligned with the cursor.
        let already = inner.buffered_to.saturating_sub(next);
        if already < batch.len() {
            inner.frames.extend(batch.into_iter().skip(already));
            inner.buffered_to = batch_end;
        }
        drop(inner);
        next = batch_end;
    }
    trace!("Fill complete: buffered to {}", end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaybackConfig;
    use crate::source::{FrameSource, SourceKind};
    use crate::store::FsStore;
    use std::fs;
    use std::sync::atomic::AtomicU64;
    use std::time::{Duration, Instant};

    fn png_bytes(shade: u8) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([shade, 0, 0, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn build_unit(frames: usize, fps: f32) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(crate::meta::META_FILE),
            format!(
                r#"{{"totalFrames":{},"targetFps":{},"realFrames":150,"realSeconds":30,"path":"clip.mp4"}}"#,
                frames, fps
            ),
        )
        .unwrap();
        let frames_dir = dir.path().join(crate::sequence::FRAMES_DIR);
        fs::create_dir(&frames_dir).unwrap();
        for i in 0..frames {
            fs::write(frames_dir.join(format!("f.{:04}.png", i)), png_bytes(i as u8)).unwrap();
        }
        dir
    }

    fn buffer_for(dir: &std::path::Path, config: PlaybackConfig) -> Arc<LookaheadBuffer> {
        let epoch = Arc::new(AtomicU64::new(0));
        let source = FrameSource::open(
            Arc::new(FsStore),
            dir,
            SourceKind::Rasterized,
            Arc::clone(&epoch),
        )
        .unwrap();
        Arc::new(LookaheadBuffer::new(source, config, epoch))
    }

    fn wait_idle(buffer: &Arc<LookaheadBuffer>) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while buffer.is_buffering() {
            assert!(Instant::now() < deadline, "fill stalled");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_fill_respects_lookahead_window() {
        let dir = build_unit(30, 4.0);
        let config = PlaybackConfig {
            lookahead_seconds: 2.0,
            ..PlaybackConfig::default()
        };
        let buffer = buffer_for(dir.path(), config);
        request_fill(&buffer);
        wait_idle(&buffer);
        // 4 fps * 2 s = 8 frames, not the whole unit.
        assert_eq!(buffer.buffered_to(), 8);
        assert_eq!(buffer.buffered_depth(), 8);
    }

    #[test]
    fn test_fill_clamps_at_total() {
        let dir = build_unit(5, 30.0);
        let buffer = buffer_for(dir.path(), PlaybackConfig::default());
        request_fill(&buffer);
        wait_idle(&buffer);
        assert_eq!(buffer.buffered_to(), 5);
    }

    #[test]
    fn test_concurrent_kicks_single_fill() {
        let dir = build_unit(12, 6.0);
        let buffer = buffer_for(dir.path(), PlaybackConfig::default());
        for _ in 0..8 {
            request_fill(&buffer);
        }
        wait_idle(&buffer);
        // Every frame committed exactly once.
        assert_eq!(buffer.buffered_depth(), buffer.buffered_to());
    }

    #[test]
    fn test_epoch_bump_discards_fill() {
        let dir = build_unit(20, 10.0);
        let buffer = buffer_for(dir.path(), PlaybackConfig::default());
        buffer.epoch.fetch_add(1, Ordering::AcqRel);
        // Fill observes the new epoch at start, so it still runs; bump again
        // mid-flight to exercise the stale path.
        request_fill(&buffer);
        buffer.epoch.fetch_add(1, Ordering::AcqRel);
        wait_idle(&buffer);
        // No invariant violation either way: queue matches the commit cursor.
        assert_eq!(buffer.buffered_depth(), buffer.buffered_to());
    }

    #[test]
    fn test_unreadable_frame_becomes_placeholder() {
        let dir = build_unit(4, 4.0);
        // Corrupt one frame after sequence scan would normally drop it, so
        // corrupt post-open.
        let buffer = buffer_for(dir.path(), PlaybackConfig::default());
        fs::write(
            dir.path()
                .join(crate::sequence::FRAMES_DIR)
                .join("f.0002.png"),
            b"truncated",
        )
        .unwrap();
        request_fill(&buffer);
        wait_idle(&buffer);
        assert_eq!(buffer.buffered_to(), 4);
        assert_eq!(buffer.stats().decode_failures.load(Ordering::Relaxed), 1);
    }
}
