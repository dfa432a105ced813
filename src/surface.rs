//! Presentation seam between the engine and the host
//!
//! The playback loop hands each frame (real or placeholder) to a
//! `PresentSurface`; what happens to the pixels is the host's business. The
//! engine ships a logging surface for headless runs; GUI hosts implement the
//! trait over their texture upload path.

use log::{debug, info};

use crate::frame::FrameImage;

/// Where presented frames go. Called from the playback loop thread, once per
/// presented tick; implementations must not block for longer than a frame
/// interval or they become the bottleneck the pacer measures.
pub trait PresentSurface: Send {
    fn present(&mut self, frame: &FrameImage);

    /// Geometry hint before the first frame. Default ignores it.
    fn resize(&mut self, _width: u32, _height: u32) {}
}

/// Headless surface: counts frames and logs a line per unit of progress.
#[derive(Debug, Default)]
pub struct LogSurface {
    presented: usize,
    placeholders: usize,
}

impl LogSurface {
    pub fn presented(&self) -> usize {
        self.presented
    }

    pub fn placeholders(&self) -> usize {
        self.placeholders
    }
}

impl PresentSurface for LogSurface {
    fn present(&mut self, frame: &FrameImage) {
        if frame.is_placeholder() {
            self.placeholders += 1;
        } else {
            self.presented += 1;
        }
        if (self.presented + self.placeholders) % 100 == 0 {
            debug!(
                "Presented {} frames ({} placeholders)",
                self.presented, self.placeholders
            );
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        info!("Surface geometry: {}x{}", width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_surface_counts_by_kind() {
        let mut surface = LogSurface::default();
        let real = FrameImage::from_rgba8(1, 1, vec![9, 9, 9, 255]).unwrap();
        let fallback = FrameImage::placeholder(1, 1);
        surface.present(&real);
        surface.present(&real);
        surface.present(&fallback);
        assert_eq!(surface.presented(), 2);
        assert_eq!(surface.placeholders(), 1);
    }
}
