//! Capabilities the page host hands to the tracker.
//!
//! Nothing in the tracking pipeline reads a global window, document or clock.
//! The host reports viewport geometry and lifecycle signals as values and
//! provides time and frame scheduling through the traits below, so the whole
//! pipeline runs deterministically in tests.

use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::time::Instant;

/// Monotonic time source used for dwell time and rate limiting.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Reads `tokio::time::Instant`, which follows tokio's paused clock in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub type FrameCallback = Box<dyn FnOnce() + Send + 'static>;

/// Runs a callback on the next animation frame.
pub trait FrameScheduler: Send + Sync {
    fn request_frame(&self, callback: FrameCallback);
}

/// Emulates animation frames on the tokio runtime with a fixed frame length.
#[derive(Debug, Clone, Copy)]
pub struct TokioFrameScheduler {
    frame: Duration,
}

impl TokioFrameScheduler {
    pub fn new(frame: Duration) -> Self {
        Self { frame }
    }
}

impl FrameScheduler for TokioFrameScheduler {
    fn request_frame(&self, callback: FrameCallback) {
        let frame = self.frame;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(frame).await;
                    callback();
                });
            }
            // Outside a runtime there is no next frame to wait for.
            Err(_) => callback(),
        }
    }
}

/// Frame scheduler whose queued callbacks run only when the caller says so.
#[derive(Clone, Default)]
pub struct ManualFrames {
    pending: Arc<Mutex<Vec<FrameCallback>>>,
}

impl ManualFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Runs every callback queued so far; returns how many ran.
    pub fn run_frame(&self) -> usize {
        let callbacks: Vec<FrameCallback> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.drain(..).collect()
        };
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }
}

impl FrameScheduler for ManualFrames {
    fn request_frame(&self, callback: FrameCallback) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }
}

/// Scroll geometry of the page at the time of a scroll event, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportMetrics {
    pub scroll_top: f64,
    pub document_height: f64,
    pub viewport_height: f64,
}

impl ViewportMetrics {
    pub fn new(scroll_top: f64, document_height: f64, viewport_height: f64) -> Self {
        Self {
            scroll_top,
            document_height,
            viewport_height,
        }
    }

    /// Unrounded scroll percentage in [0, 100]; 0 when nothing can scroll.
    pub fn scroll_fraction_percent(&self) -> f64 {
        let scrollable = self.document_height - self.viewport_height;
        if !(scrollable > 0.0) || !self.scroll_top.is_finite() {
            return 0.0;
        }
        (self.scroll_top / scrollable * 100.0).clamp(0.0, 100.0)
    }
}

/// Navigation-away signals the host forwards to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleSignal {
    PageHide,
    PopState,
    BeforeUnload,
}

impl LifecycleSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleSignal::PageHide => "pagehide",
            LifecycleSignal::PopState => "popstate",
            LifecycleSignal::BeforeUnload => "beforeunload",
        }
    }
}

/// Bundle of capabilities a page view needs from its host.
#[derive(Clone)]
pub struct PageHost {
    pub clock: Arc<dyn Clock>,
    pub frames: Arc<dyn FrameScheduler>,
}

impl PageHost {
    pub fn new(clock: Arc<dyn Clock>, frames: Arc<dyn FrameScheduler>) -> Self {
        Self { clock, frames }
    }

    pub fn tokio(frame: Duration) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            frames: Arc::new(TokioFrameScheduler::new(frame)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unscrollable_document_is_zero() {
        assert_eq!(ViewportMetrics::new(0.0, 800.0, 800.0).scroll_fraction_percent(), 0.0);
        assert_eq!(ViewportMetrics::new(40.0, 600.0, 800.0).scroll_fraction_percent(), 0.0);
    }

    #[test]
    fn test_fraction_is_clamped() {
        assert_eq!(ViewportMetrics::new(5000.0, 1800.0, 800.0).scroll_fraction_percent(), 100.0);
        assert_eq!(ViewportMetrics::new(-30.0, 1800.0, 800.0).scroll_fraction_percent(), 0.0);
        assert_eq!(ViewportMetrics::new(250.0, 1800.0, 800.0).scroll_fraction_percent(), 25.0);
    }

    #[test]
    fn test_manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now() - start, Duration::from_millis(1500));
    }

    #[test]
    fn test_manual_frames_run_in_batches() {
        let frames = ManualFrames::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let hits = hits.clone();
            frames.request_frame(Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(frames.pending(), 2);
        assert_eq!(frames.run_frame(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(frames.run_frame(), 0);
    }
}
