//! Frame sources: where decoded frames come from
//!
//! One tagged enum replaces the three near-duplicate engines of the original
//! tool: playback control flow is written once, and only the byte-fetch
//! strategy varies.
//!
//! - `Rasterized`: a directory of numbered images; random access, each decode
//!   runs on the shared pool with a bounded wait.
//! - `Piped`: an external transcoder process streaming raw RGBA frames over
//!   stdout; sequential access, a dedicated reader thread feeds a bounded
//!   channel so a hung transcoder surfaces as a timeout, not a hang.
//!
//! Both variants expose the same `fetch(idx, timeout)` contract to the
//! Prefetcher. A fetch never blocks past its timeout.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::{debug, warn};

use crate::core::workers::decode_pool;
use crate::frame::{FrameError, FrameImage};
use crate::meta::VideoMeta;
use crate::sequence::FrameSequence;
use crate::store::Store;

/// Frames the pipe reader keeps decoded ahead of the prefetcher.
const PIPE_CHANNEL_DEPTH: usize = 16;

/// Construction-time failures. Fatal: the unit cannot be created.
#[derive(Debug)]
pub enum ConstructError {
    /// Frame directory or metadata record absent.
    NotFound(String),
    /// Metadata record present but undecodable.
    ParseError(String),
    /// No playable frames.
    EmptySequence,
    /// Transcoder process could not be started.
    Spawn(String),
}

impl fmt::Display for ConstructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructError::NotFound(what) => write!(f, "not found: {}", what),
            ConstructError::ParseError(e) => write!(f, "metadata parse error: {}", e),
            ConstructError::EmptySequence => write!(f, "unit has no playable frames"),
            ConstructError::Spawn(e) => write!(f, "failed to start transcoder: {}", e),
        }
    }
}

impl std::error::Error for ConstructError {}

/// External transcoder invocation for the piped variant.
#[derive(Debug, Clone)]
pub struct TranscodeCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Strategy selected at construction time.
#[derive(Debug, Clone)]
pub enum SourceKind {
    Rasterized,
    Piped(TranscodeCommand),
}

pub enum FrameSource {
    Rasterized(RasterSource),
    Piped(PipeSource),
}

impl FrameSource {
    /// Resolve a playable unit at `base`: parse its metadata record and set up
    /// the selected fetch strategy.
    pub fn open(
        store: Arc<dyn Store>,
        base: &Path,
        kind: SourceKind,
        epoch: Arc<AtomicU64>,
    ) -> Result<Self, ConstructError> {
        let meta = VideoMeta::load(store.as_ref(), base)?;
        match kind {
            SourceKind::Rasterized => {
                let sequence = FrameSequence::scan(store.as_ref(), base)?;
                Ok(FrameSource::Rasterized(RasterSource {
                    store,
                    meta,
                    sequence,
                    epoch,
                }))
            }
            SourceKind::Piped(cmd) => Ok(FrameSource::Piped(PipeSource::spawn(meta, &cmd)?)),
        }
    }

    pub fn meta(&self) -> &VideoMeta {
        match self {
            FrameSource::Rasterized(s) => &s.meta,
            FrameSource::Piped(s) => &s.meta,
        }
    }

    /// Playable frame count: the metadata bound, clamped to what actually
    /// survived sequence validation for the rasterized variant.
    pub fn total_frames(&self) -> usize {
        match self {
            FrameSource::Rasterized(s) => (s.meta.total_frames as usize).min(s.sequence.len()),
            FrameSource::Piped(s) => s.meta.total_frames as usize,
        }
    }

    /// Frame geometry for placeholder sizing. Rasterized units probe their
    /// first frame; piped units trust the metadata record.
    pub fn frame_geometry(&self) -> (u32, u32) {
        match self {
            FrameSource::Rasterized(s) => s
                .sequence
                .path(0)
                .and_then(|p| FrameImage::probe(p).ok())
                .unwrap_or((s.meta.width.max(1), s.meta.height.max(1))),
            FrameSource::Piped(s) => (s.meta.width.max(1), s.meta.height.max(1)),
        }
    }

    /// Fetch one decoded frame with a bounded wait. Never blocks past
    /// `timeout`; a stall degrades to `FrameError::Timeout`.
    pub fn fetch(&self, idx: usize, timeout: Duration) -> Result<FrameImage, FrameError> {
        match self {
            FrameSource::Rasterized(s) => s.fetch(idx, timeout),
            FrameSource::Piped(s) => s.fetch(idx, timeout),
        }
    }

    /// Rewind to frame 0 for replay. Rasterized units are random access and
    /// need nothing; piped units restart their transcoder process.
    pub fn rewind(&self) -> Result<(), ConstructError> {
        match self {
            FrameSource::Rasterized(_) => Ok(()),
            FrameSource::Piped(s) => s.rewind(),
        }
    }
}

/// Pre-rasterized directory variant.
pub struct RasterSource {
    store: Arc<dyn Store>,
    meta: VideoMeta,
    sequence: FrameSequence,
    epoch: Arc<AtomicU64>,
}

impl RasterSource {
    fn fetch(&self, idx: usize, timeout: Duration) -> Result<FrameImage, FrameError> {
        let path = self
            .sequence
            .path(idx)
            .ok_or_else(|| FrameError::Io(format!("frame index {} out of range", idx)))?
            .to_path_buf();

        // Decode on the pool; only wait here, bounded. A stop() between
        // dispatch and pickup drops the job via the epoch check.
        let (tx, rx) = bounded::<Result<FrameImage, FrameError>>(1);
        let store = Arc::clone(&self.store);
        let epoch_val = self.epoch.load(Ordering::Relaxed);
        decode_pool(None).execute_with_epoch(Arc::clone(&self.epoch), epoch_val, move || {
            let result = store
                .open(&path)
                .map_err(|e| FrameError::Io(e.to_string()))
                .and_then(|mut stream| {
                    let mut bytes = Vec::new();
                    stream
                        .read_to_end(&mut bytes)
                        .map_err(|e| FrameError::Io(e.to_string()))?;
                    FrameImage::decode_bytes(&bytes)
                });
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(FrameError::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                Err(FrameError::Decode("decode job dropped".into()))
            }
        }
    }
}

struct PipeInner {
    child: Child,
    rx: Receiver<Result<FrameImage, FrameError>>,
    /// Next frame index the channel will yield.
    next_idx: usize,
}

/// Transcoder-pipe variant: frames arrive in order on stdout as raw RGBA.
pub struct PipeSource {
    meta: VideoMeta,
    cmd: TranscodeCommand,
    inner: Mutex<PipeInner>,
}

impl PipeSource {
    fn spawn(meta: VideoMeta, cmd: &TranscodeCommand) -> Result<Self, ConstructError> {
        if meta.width == 0 || meta.height == 0 {
            return Err(ConstructError::ParseError(
                "piped unit requires width/height in metadata".into(),
            ));
        }

        let (child, rx) = launch_transcoder(&meta, cmd)?;
        Ok(Self {
            meta,
            cmd: cmd.clone(),
            inner: Mutex::new(PipeInner {
                child,
                rx,
                next_idx: 0,
            }),
        })
    }

    /// Restart the stream from frame 0 for replay: the exhausted transcoder
    /// is killed and a fresh one spawned.
    fn rewind(&self) -> Result<(), ConstructError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| ConstructError::Spawn("pipe state poisoned".into()))?;
        if let Err(e) = inner.child.kill() {
            debug!("Transcoder already gone on rewind: {}", e);
        }
        let _ = inner.child.wait();

        let (child, rx) = launch_transcoder(&self.meta, &self.cmd)?;
        inner.child = child;
        inner.rx = rx;
        inner.next_idx = 0;
        Ok(())
    }

    fn fetch(&self, idx: usize, timeout: Duration) -> Result<FrameImage, FrameError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| FrameError::Decode("pipe state poisoned".into()))?;

        if idx < inner.next_idx {
            return Err(FrameError::Io(format!(
                "pipe cannot seek backward to frame {}",
                idx
            )));
        }

        // Drain frames a catch-up skip jumped over; they are never presented.
        while inner.next_idx < idx {
            match inner.rx.recv_timeout(timeout) {
                Ok(_) => inner.next_idx += 1,
                Err(RecvTimeoutError::Timeout) => return Err(FrameError::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(FrameError::Io("transcoder pipe closed".into()))
                }
            }
        }

        match inner.rx.recv_timeout(timeout) {
            Ok(result) => {
                inner.next_idx += 1;
                result
            }
            Err(RecvTimeoutError::Timeout) => Err(FrameError::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                Err(FrameError::Io("transcoder pipe closed".into()))
            }
        }
    }
}

/// Spawn the transcoder and its reader thread; frames land on the returned
/// channel in stream order.
fn launch_transcoder(
    meta: &VideoMeta,
    cmd: &TranscodeCommand,
) -> Result<(Child, Receiver<Result<FrameImage, FrameError>>), ConstructError> {
    let mut child = Command::new(&cmd.program)
        .args(&cmd.args)
        .stdout(Stdio::piped())
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ConstructError::Spawn(format!("{}: {}", cmd.program, e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ConstructError::Spawn("transcoder stdout unavailable".into()))?;

    let frame_bytes = (meta.width as usize) * (meta.height as usize) * 4;
    let (width, height) = (meta.width, meta.height);
    let total = meta.total_frames as usize;
    let (tx, rx) = bounded::<Result<FrameImage, FrameError>>(PIPE_CHANNEL_DEPTH);

    thread::Builder::new()
        .name("flipbook-pipe-reader".into())
        .spawn(move || {
            let mut stdout = stdout;
            for idx in 0..total {
                let mut buf = vec![0u8; frame_bytes];
                let result = stdout
                    .read_exact(&mut buf)
                    .map_err(|e| FrameError::Io(e.to_string()))
                    .and_then(|_| FrameImage::from_rgba8(width, height, buf));
                let stop = result.is_err();
                if tx.send(result).is_err() {
                    debug!("Pipe reader: consumer gone after frame {}", idx);
                    return;
                }
                if stop {
                    return;
                }
            }
            debug!("Pipe reader: all {} frames delivered", total);
        })
        .map_err(|e| ConstructError::Spawn(e.to_string()))?;

    Ok((child, rx))
}

impl Drop for PipeSource {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Err(e) = inner.child.kill() {
                warn!("Failed to kill transcoder: {}", e);
            }
            let _ = inner.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::META_FILE;
    use crate::sequence::FRAMES_DIR;
    use crate::store::FsStore;
    use std::fs;

    fn png_bytes(shade: u8) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([shade, 0, 0, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn build_unit(frames: usize) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let meta = format!(
            r#"{{"totalFrames":{},"targetFps":5.0,"realFrames":150,"realSeconds":30,"path":"clip.mp4"}}"#,
            frames
        );
        fs::write(dir.path().join(META_FILE), meta).unwrap();
        let frames_dir = dir.path().join(FRAMES_DIR);
        fs::create_dir(&frames_dir).unwrap();
        for i in 0..frames {
            fs::write(frames_dir.join(format!("f.{:04}.png", i)), png_bytes(i as u8)).unwrap();
        }
        dir
    }

    fn open_raster(dir: &Path) -> Result<FrameSource, ConstructError> {
        FrameSource::open(
            Arc::new(FsStore),
            dir,
            SourceKind::Rasterized,
            Arc::new(AtomicU64::new(0)),
        )
    }

    #[test]
    fn test_open_rasterized_unit() {
        let dir = build_unit(4);
        let source = open_raster(dir.path()).unwrap();
        assert_eq!(source.total_frames(), 4);
        assert_eq!(source.frame_geometry(), (2, 2));

        let frame = source.fetch(2, Duration::from_secs(5)).unwrap();
        assert_eq!(frame.resolution(), (2, 2));
        assert_eq!(frame.pixels()[0], 2); // red channel encodes frame index
    }

    #[test]
    fn test_missing_frames_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(META_FILE),
            r#"{"totalFrames":1,"targetFps":5.0,"realFrames":1,"realSeconds":1,"path":""}"#,
        )
        .unwrap();
        assert!(matches!(
            open_raster(dir.path()),
            Err(ConstructError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_entries_dropped_not_fatal() {
        let dir = build_unit(3);
        fs::write(dir.path().join(FRAMES_DIR).join("junk.png"), b"not an image").unwrap();
        let source = open_raster(dir.path()).unwrap();
        // meta bounds the cursor; the junk entry never joins the sequence
        assert_eq!(source.total_frames(), 3);
    }

    #[test]
    fn test_meta_bounds_cursor_below_sequence_len() {
        let dir = build_unit(5);
        fs::write(
            dir.path().join(META_FILE),
            r#"{"totalFrames":3,"targetFps":5.0,"realFrames":5,"realSeconds":1,"path":""}"#,
        )
        .unwrap();
        let source = open_raster(dir.path()).unwrap();
        assert_eq!(source.total_frames(), 3);
    }

    #[test]
    fn test_fetch_out_of_range() {
        let dir = build_unit(2);
        let source = open_raster(dir.path()).unwrap();
        assert!(source.fetch(7, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_pipe_requires_geometry() {
        let meta = VideoMeta {
            total_frames: 2,
            target_fps: 5.0,
            real_frames: 2,
            real_seconds: 1,
            source_path: String::new(),
            width: 0,
            height: 0,
        };
        let cmd = TranscodeCommand {
            program: "true".into(),
            args: vec![],
        };
        assert!(matches!(
            PipeSource::spawn(meta, &cmd),
            Err(ConstructError::ParseError(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_streams_frames_in_order() {
        // `printf`-free deterministic byte stream: two 1x1 RGBA frames.
        let meta = VideoMeta {
            total_frames: 2,
            target_fps: 5.0,
            real_frames: 2,
            real_seconds: 1,
            source_path: String::new(),
            width: 1,
            height: 1,
        };
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("frames.raw");
        fs::write(&raw, [1u8, 0, 0, 255, 2, 0, 0, 255]).unwrap();
        let cmd = TranscodeCommand {
            program: "cat".into(),
            args: vec![raw.display().to_string()],
        };
        let source = PipeSource::spawn(meta, &cmd).unwrap();
        let a = source.fetch(0, Duration::from_secs(5)).unwrap();
        let b = source.fetch(1, Duration::from_secs(5)).unwrap();
        assert_eq!(a.pixels()[0], 1);
        assert_eq!(b.pixels()[0], 2);
        assert!(source.fetch(0, Duration::from_secs(1)).is_err()); // no backward seek
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_rewind_restarts_stream_for_replay() {
        let meta = VideoMeta {
            total_frames: 2,
            target_fps: 5.0,
            real_frames: 2,
            real_seconds: 1,
            source_path: String::new(),
            width: 1,
            height: 1,
        };
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("frames.raw");
        fs::write(&raw, [7u8, 0, 0, 255, 8, 0, 0, 255]).unwrap();
        let cmd = TranscodeCommand {
            program: "cat".into(),
            args: vec![raw.display().to_string()],
        };
        let source = PipeSource::spawn(meta, &cmd).unwrap();

        // Exhaust the stream, then replay from frame 0.
        source.fetch(0, Duration::from_secs(5)).unwrap();
        source.fetch(1, Duration::from_secs(5)).unwrap();
        source.rewind().unwrap();

        let a = source.fetch(0, Duration::from_secs(5)).unwrap();
        let b = source.fetch(1, Duration::from_secs(5)).unwrap();
        assert_eq!(a.pixels()[0], 7);
        assert_eq!(b.pixels()[0], 8);
    }
}
