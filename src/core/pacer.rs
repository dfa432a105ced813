//! Frame pacing and throughput accounting
//!
//! The playback loop runs one tick per nominal frame interval
//! (`1 / target_fps`). Each tick does its work, then `pace` sleeps out the
//! remainder of the interval. When a tick overruns there is no sleep and no
//! compensation within the tick itself; sustained overruns are handled by
//! the throughput window instead.
//!
//! Throughput is measured over fixed 5-second windows. When a window closes
//! with achieved fps below target, `catch_up_skip` yields the number of
//! frames to drop so the cursor tracks wall-clock time instead of drifting
//! ever further behind the audio.

use std::time::{Duration, Instant};

use log::{debug, trace};

/// Throughput measurement window.
const WINDOW: Duration = Duration::from_secs(5);

/// Whole frames to drop after a slow window: floor of the fps deficit.
/// A deficit under one frame per second is left to the pacing slack.
pub fn catch_up_skip(target_fps: f32, achieved_fps: f32) -> usize {
    if !(target_fps.is_finite() && achieved_fps.is_finite()) {
        return 0;
    }
    let deficit = target_fps - achieved_fps;
    if deficit < 1.0 {
        return 0;
    }
    deficit.floor() as usize
}

/// Per-unit tick clock. Owned by the playback loop thread, not shared.
pub struct Pacer {
    interval: Duration,
    window: Duration,
    window_started: Instant,
    presented_in_window: u32,
    _timer: FineTimer,
}

impl Pacer {
    pub fn new(target_fps: f32) -> Self {
        Self::with_window(target_fps, WINDOW)
    }

    fn with_window(target_fps: f32, window: Duration) -> Self {
        let interval = Duration::from_secs_f64(1.0 / f64::from(target_fps.max(0.001)));
        Self {
            interval,
            window,
            window_started: Instant::now(),
            presented_in_window: 0,
            _timer: FineTimer::acquire(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep out the remainder of the tick that began at `tick_started`.
    /// An overrun tick returns immediately.
    pub fn pace(&self, tick_started: Instant) {
        let elapsed = tick_started.elapsed();
        if let Some(remaining) = self.interval.checked_sub(elapsed) {
            std::thread::sleep(remaining);
        } else {
            trace!("Tick overran interval by {:?}", elapsed - self.interval);
        }
    }

    /// Record one tick's outcome. Returns the achieved fps when a throughput
    /// window just closed, `None` mid-window.
    pub fn record(&mut self, presented: bool) -> Option<f32> {
        if presented {
            self.presented_in_window += 1;
        }
        let elapsed = self.window_started.elapsed();
        if elapsed < self.window {
            return None;
        }
        let achieved = (f64::from(self.presented_in_window) / elapsed.as_secs_f64()) as f32;
        debug!(
            "Throughput window closed: {} frames in {:.2}s ({:.2} fps)",
            self.presented_in_window,
            elapsed.as_secs_f64(),
            achieved
        );
        self.window_started = Instant::now();
        self.presented_in_window = 0;
        Some(achieved)
    }
}

/// Scoped request for fine-grained sleep granularity. On Windows the default
/// timer quantum (~15ms) makes sub-frame sleeps overshoot badly at 30+ fps;
/// holding this guard drops it to 1ms for the life of the playback loop.
/// Elsewhere it is a no-op.
struct FineTimer {
    active: bool,
}

#[cfg(windows)]
#[link(name = "winmm")]
extern "system" {
    fn timeBeginPeriod(period: u32) -> u32;
    fn timeEndPeriod(period: u32) -> u32;
}

impl FineTimer {
    #[cfg(windows)]
    fn acquire() -> Self {
        // TIMERR_NOERROR == 0
        let active = unsafe { timeBeginPeriod(1) } == 0;
        if active {
            debug!("Timer resolution raised to 1ms");
        }
        Self { active }
    }

    #[cfg(not(windows))]
    fn acquire() -> Self {
        Self { active: false }
    }
}

impl Drop for FineTimer {
    fn drop(&mut self) {
        #[cfg(windows)]
        if self.active {
            unsafe {
                timeEndPeriod(1);
            }
        }
        let _ = self.active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_is_floor_of_deficit() {
        assert_eq!(catch_up_skip(30.0, 30.0), 0);
        assert_eq!(catch_up_skip(30.0, 29.5), 0); // under one frame: no skip
        assert_eq!(catch_up_skip(30.0, 15.0), 15); // half speed
        assert_eq!(catch_up_skip(30.0, 27.2), 2);
        assert_eq!(catch_up_skip(5.0, 2.5), 2);
    }

    #[test]
    fn test_skip_never_negative() {
        assert_eq!(catch_up_skip(24.0, 60.0), 0);
        assert_eq!(catch_up_skip(24.0, f32::NAN), 0);
    }

    #[test]
    fn test_interval_from_fps() {
        let pacer = Pacer::new(20.0);
        assert_eq!(pacer.interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_pace_sleeps_out_the_interval() {
        let pacer = Pacer::new(20.0);
        let started = Instant::now();
        pacer.pace(started);
        assert!(started.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_pace_overrun_returns_immediately() {
        let pacer = Pacer::new(20.0);
        let long_ago = Instant::now() - Duration::from_millis(200);
        let started = Instant::now();
        pacer.pace(long_ago);
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn test_window_reports_achieved_fps() {
        let mut pacer = Pacer::with_window(100.0, Duration::from_millis(100));
        let mut achieved = None;
        let deadline = Instant::now() + Duration::from_secs(5);
        while achieved.is_none() {
            assert!(Instant::now() < deadline);
            achieved = pacer.record(true);
            std::thread::sleep(Duration::from_millis(5));
        }
        // ~1 presented frame per 5ms tick over a 100ms window.
        let fps = achieved.unwrap();
        assert!(fps > 50.0 && fps < 300.0, "implausible fps {}", fps);
    }

    #[test]
    fn test_window_resets_after_close() {
        let mut pacer = Pacer::with_window(100.0, Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(25));
        assert!(pacer.record(true).is_some());
        assert!(pacer.record(true).is_none()); // new window just opened
    }
}
