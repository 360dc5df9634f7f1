use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::{
    api::{TrackingAction, TrackingUpdate},
    settings::TrackingConfig,
};

use super::{dwell::DwellTimeAccumulator, scroll::ScrollDepthSampler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingStatus {
    #[default]
    Idle,
    Tracking,
    Stopped,
}

/// Current values for consumers that cannot wait on a network round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMetrics {
    pub time_on_page: u64,
    /// The session's maximum depth, never the instantaneous one.
    pub scroll_depth: u8,
    pub is_tracking: bool,
}

impl SessionMetrics {
    pub fn zero() -> Self {
        Self {
            time_on_page: 0,
            scroll_depth: 0,
            is_tracking: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerState {
    pub status: TrackingStatus,
    pub visit_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub scroll_depth: u8,
    pub max_scroll_depth: u8,
    /// Last send attempt, for rate limiting only.
    pub last_update: Option<Instant>,
    pub(crate) dwell: DwellTimeAccumulator,
    pub(crate) sampler: ScrollDepthSampler,
}

impl TrackerState {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            status: TrackingStatus::Idle,
            visit_id: None,
            started_at: None,
            scroll_depth: 0,
            max_scroll_depth: 0,
            last_update: None,
            dwell: DwellTimeAccumulator::default(),
            sampler: ScrollDepthSampler::new(config),
        }
    }

    pub fn begin(&mut self, visit_id: String, start_at: DateTime<Utc>, now: Instant) {
        self.status = TrackingStatus::Tracking;
        self.visit_id = Some(visit_id);
        self.started_at = Some(start_at);
        self.scroll_depth = 0;
        self.max_scroll_depth = 0;
        self.last_update = None;
        self.dwell.start(now);
        self.sampler.reset();
    }

    pub fn is_tracking(&self) -> bool {
        self.status == TrackingStatus::Tracking
    }

    pub fn record_depth(&mut self, percent: u8) {
        let percent = percent.min(100);
        self.scroll_depth = percent;
        self.max_scroll_depth = self.max_scroll_depth.max(percent);
    }

    pub fn time_on_page(&self, now: Instant) -> u64 {
        self.dwell.time_on_page(now)
    }

    /// `None` until tracking has been started once.
    pub fn metrics(&self, now: Instant) -> Option<SessionMetrics> {
        if !self.dwell.is_started() {
            return None;
        }

        Some(SessionMetrics {
            time_on_page: self.time_on_page(now),
            scroll_depth: self.max_scroll_depth,
            is_tracking: self.is_tracking(),
        })
    }

    pub fn build_update(&self, action: TrackingAction, now: Instant) -> Option<TrackingUpdate> {
        let visit_id = self.visit_id.clone()?;
        Some(TrackingUpdate {
            visit_id,
            time_on_page: self.time_on_page(now),
            scroll_depth: self.max_scroll_depth,
            action,
        })
    }

    pub fn finish(&mut self) {
        self.status = TrackingStatus::Stopped;
        self.sampler.release_frame();
    }
}
