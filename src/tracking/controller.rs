use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    api::{TelemetrySink, TrackingAction},
    host::{Clock, FrameScheduler, LifecycleSignal, PageHost, ViewportMetrics},
    settings::TrackingConfig,
};

use super::{
    dispatcher::{SendOutcome, TelemetryDispatcher},
    dwell::run_heartbeat,
    scroll::{depth_percent, SampleDecision},
    state::{SessionMetrics, TrackerState},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Tracks one article view: scroll depth, dwell time and the terminal update.
///
/// Cloning yields another handle to the same session. The page that owns
/// the view calls [`SessionTracker::stop`] when it unmounts.
#[derive(Clone)]
pub struct SessionTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    state: Mutex<TrackerState>,
    dispatcher: TelemetryDispatcher,
    clock: Arc<dyn Clock>,
    frames: Arc<dyn FrameScheduler>,
    config: TrackingConfig,
    heartbeat: Mutex<Option<CancellationToken>>,
}

impl SessionTracker {
    pub fn new(sink: Arc<dyn TelemetrySink>, host: &PageHost, config: TrackingConfig) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                state: Mutex::new(TrackerState::new(&config)),
                dispatcher: TelemetryDispatcher::new(sink, config.min_send_gap()),
                clock: host.clock.clone(),
                frames: host.frames.clone(),
                config,
                heartbeat: Mutex::new(None),
            }),
        }
    }

    /// Starts tracking `visit_id`.
    ///
    /// An empty id leaves the tracker idle; starting a tracker that is
    /// already live is an error.
    pub fn start(&self, visit_id: &str) -> Result<()> {
        let visit_id = visit_id.trim();
        if visit_id.is_empty() {
            log_warn!("no visit id for this page view; tracking not started");
            return Ok(());
        }

        {
            let mut state = self.inner.lock_state();
            if state.is_tracking() {
                bail!(
                    "tracking already active for visit {}",
                    state.visit_id.as_deref().unwrap_or_default()
                );
            }
            state.begin(visit_id.to_string(), Utc::now(), self.inner.clock.now());
        }

        self.spawn_heartbeat();
        log_info!("tracking started for visit {}", visit_id);
        Ok(())
    }

    /// Ends the session with a `leave` update. Only the first call sends.
    pub fn stop(&self) -> bool {
        self.inner.finish(TrackingAction::Leave, "stop")
    }

    /// Ends the session with a `bounce` update instead of `leave`.
    pub fn mark_bounce(&self) -> bool {
        self.inner.finish(TrackingAction::Bounce, "bounce")
    }

    /// Navigation-away signal from the host. The first one ends the session.
    pub fn on_lifecycle(&self, signal: LifecycleSignal) -> bool {
        self.inner.finish(TrackingAction::Leave, signal.as_str())
    }

    pub fn on_scroll(&self, viewport: ViewportMetrics) {
        let needs_frame = {
            let mut state = self.inner.lock_state();
            if !state.is_tracking() {
                return;
            }

            let percent = depth_percent(&viewport);
            state.record_depth(percent);

            match state.sampler.sample(percent) {
                SampleDecision::Forward => state.sampler.claim_frame(),
                SampleDecision::Held | SampleDecision::Insignificant => false,
            }
        };

        // Schedulers may run the callback inline, so the state lock is released first.
        if needs_frame {
            let weak = Arc::downgrade(&self.inner);
            self.inner.frames.request_frame(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.frame_tick();
                }
            }));
        }
    }

    /// Current `{timeOnPage, scrollDepth, isTracking}`; `None` before the first start.
    pub fn get_metrics(&self) -> Option<SessionMetrics> {
        let now = self.inner.clock.now();
        self.inner.lock_state().metrics(now)
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.lock_state().is_tracking()
    }

    pub fn visit_id(&self) -> Option<String> {
        self.inner.lock_state().visit_id.clone()
    }

    /// Wall-clock start of the current or last session.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_state().started_at
    }

    /// Current depth next to the reported maximum, for diagnostics.
    pub fn depths(&self) -> (u8, u8) {
        let state = self.inner.lock_state();
        (state.scroll_depth, state.max_scroll_depth)
    }

    fn spawn_heartbeat(&self) {
        let token = CancellationToken::new();
        if let Some(previous) = self.inner.lock_heartbeat().replace(token.clone()) {
            previous.cancel();
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log_warn!("no async runtime; periodic tracking updates disabled");
            return;
        };

        let weak: Weak<TrackerInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.heartbeat();
        handle.spawn(run_heartbeat(period, token, move || match weak.upgrade() {
            Some(inner) => inner.heartbeat_tick(),
            None => false,
        }));
    }
}

impl TrackerInner {
    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_heartbeat(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, action: TrackingAction, reason: &str) -> bool {
        let now = self.clock.now();
        let (ended, visit_id, started_at, metrics) = {
            let mut state = self.lock_state();
            let ended = self.dispatcher.finish(&mut state, action, now);
            (ended, state.visit_id.clone(), state.started_at, state.metrics(now))
        };

        if ended {
            if let Some(token) = self.lock_heartbeat().take() {
                token.cancel();
            }
            let metrics = metrics.unwrap_or_else(SessionMetrics::zero);
            log_info!(
                "tracking ended ({}) for visit {} started {}: {}s on page, {}% max depth",
                reason,
                visit_id.unwrap_or_default(),
                started_at.map(|at| at.to_rfc3339()).unwrap_or_default(),
                metrics.time_on_page,
                metrics.scroll_depth
            );
        }

        ended
    }

    fn frame_tick(&self) {
        let now = self.clock.now();
        let mut state = self.lock_state();
        state.sampler.release_frame();
        if state.is_tracking() {
            self.dispatcher
                .send_update(&mut state, TrackingAction::Update, now);
        }
    }

    /// Returns false once the session is over so the heartbeat loop exits.
    fn heartbeat_tick(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.lock_state();
        if !state.is_tracking() {
            return false;
        }

        if self
            .dispatcher
            .send_update(&mut state, TrackingAction::Update, now)
            == SendOutcome::RateLimited
        {
            log::debug!("heartbeat update skipped by the rate gate");
        }
        true
    }
}
