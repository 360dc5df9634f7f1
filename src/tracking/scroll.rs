use crate::{host::ViewportMetrics, settings::TrackingConfig};

/// Rounded scroll depth in [0, 100].
pub fn depth_percent(viewport: &ViewportMetrics) -> u8 {
    viewport.scroll_fraction_percent().round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDecision {
    /// Within the step of the last reported depth.
    Insignificant,
    /// Significant, but not this change's turn to reach the network.
    Held,
    /// Should be sent on the next frame.
    Forward,
}

/// Decides which depth changes are worth a network send.
#[derive(Debug, Clone)]
pub struct ScrollDepthSampler {
    step: u8,
    forward_every: u32,
    last_reported: u8,
    significant: u32,
    frame_pending: bool,
}

impl ScrollDepthSampler {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            step: config.scroll_step_percent,
            forward_every: config.forward_every.max(1),
            last_reported: 0,
            significant: 0,
            frame_pending: false,
        }
    }

    /// Counters belong to one tracking session.
    pub fn reset(&mut self) {
        self.last_reported = 0;
        self.significant = 0;
        self.frame_pending = false;
    }

    pub fn sample(&mut self, percent: u8) -> SampleDecision {
        if percent.abs_diff(self.last_reported) < self.step {
            return SampleDecision::Insignificant;
        }

        self.last_reported = percent;
        self.significant = self.significant.wrapping_add(1);

        if self.significant % self.forward_every == 0 {
            SampleDecision::Forward
        } else {
            SampleDecision::Held
        }
    }

    /// Returns true when the caller should schedule the frame; false while one is already queued.
    pub fn claim_frame(&mut self) -> bool {
        if self.frame_pending {
            false
        } else {
            self.frame_pending = true;
            true
        }
    }

    pub fn release_frame(&mut self) {
        self.frame_pending = false;
    }

    pub fn last_reported(&self) -> u8 {
        self.last_reported
    }
}
