/// One-shot trigger for visitor identification.
///
/// The latch closes the first time the reader scrolls past the threshold
/// (or the dwell fallback fires) and never reopens for this page view.
#[derive(Debug, Clone)]
pub struct EngagementModalPolicy {
    threshold_percent: f64,
    has_shown_modal: bool,
    scroll_percentage: f64,
}

impl EngagementModalPolicy {
    pub fn new(threshold_percent: f64) -> Self {
        Self {
            threshold_percent,
            has_shown_modal: false,
            scroll_percentage: 0.0,
        }
    }

    /// Returns true exactly once: on the first scroll at or past the threshold.
    pub fn observe_scroll(&mut self, scroll_percentage: f64) -> bool {
        self.scroll_percentage = scroll_percentage;
        scroll_percentage >= self.threshold_percent && self.try_latch()
    }

    /// Closes the latch regardless of scroll; false if it was already closed.
    pub fn try_latch(&mut self) -> bool {
        if self.has_shown_modal {
            return false;
        }
        self.has_shown_modal = true;
        true
    }

    pub fn has_shown_modal(&self) -> bool {
        self.has_shown_modal
    }

    pub fn scroll_percentage(&self) -> f64 {
        self.scroll_percentage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_does_not_trigger() {
        let mut policy = EngagementModalPolicy::new(20.0);
        assert!(!policy.observe_scroll(10.0));
        assert!(!policy.observe_scroll(19.9));
        assert!(!policy.has_shown_modal());
    }

    #[test]
    fn test_triggers_once_under_oscillation() {
        let mut policy = EngagementModalPolicy::new(20.0);
        assert!(!policy.observe_scroll(10.0));
        assert!(policy.observe_scroll(22.0));

        let mut triggers = 0;
        for percent in [15.0, 25.0, 5.0, 60.0, 19.0, 20.0, 100.0] {
            if policy.observe_scroll(percent) {
                triggers += 1;
            }
        }
        assert_eq!(triggers, 0);
        assert_eq!(policy.scroll_percentage(), 100.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut policy = EngagementModalPolicy::new(20.0);
        assert!(policy.observe_scroll(20.0));
    }

    #[test]
    fn test_fallback_latch_blocks_later_scroll() {
        let mut policy = EngagementModalPolicy::new(20.0);
        assert!(policy.try_latch());
        assert!(!policy.observe_scroll(50.0));
        assert!(!policy.try_latch());
    }
}
