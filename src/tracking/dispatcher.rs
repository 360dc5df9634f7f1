use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

use crate::api::{TelemetrySink, TrackingAction};

use super::state::TrackerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    NoVisit,
    NotTracking,
    RateLimited,
}

/// The only part of the tracker that talks to the backend.
///
/// Every send is fire-and-forget: the update is handed to the sink and the
/// dispatcher never learns whether it arrived.
#[derive(Clone)]
pub struct TelemetryDispatcher {
    sink: Arc<dyn TelemetrySink>,
    min_gap: Duration,
}

impl TelemetryDispatcher {
    pub fn new(sink: Arc<dyn TelemetrySink>, min_gap: Duration) -> Self {
        Self { sink, min_gap }
    }

    pub fn send_update(
        &self,
        state: &mut TrackerState,
        action: TrackingAction,
        now: Instant,
    ) -> SendOutcome {
        if state.visit_id.is_none() {
            return SendOutcome::NoVisit;
        }
        if !state.is_tracking() && action != TrackingAction::Leave {
            return SendOutcome::NotTracking;
        }
        if !action.is_terminal() {
            if let Some(last) = state.last_update {
                if now.saturating_duration_since(last) < self.min_gap {
                    return SendOutcome::RateLimited;
                }
            }
        }

        let Some(update) = state.build_update(action, now) else {
            return SendOutcome::NoVisit;
        };
        state.last_update = Some(now);
        self.sink.dispatch(update);
        SendOutcome::Sent
    }

    /// Sends the terminal `action` and stops tracking, only if tracking is still live.
    ///
    /// Returns true when this call ended the session. Every later caller
    /// (another lifecycle signal, a repeated `stop`) sees the stopped flag and
    /// sends nothing.
    pub fn finish(&self, state: &mut TrackerState, action: TrackingAction, now: Instant) -> bool {
        if !state.is_tracking() {
            return false;
        }

        self.send_update(state, action, now);
        state.finish();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{settings::TrackingConfig, testing::RecordingSink};
    use chrono::Utc;

    fn tracking_state(now: Instant) -> TrackerState {
        let mut state = TrackerState::new(&TrackingConfig::default());
        state.begin("v1".into(), Utc::now(), now);
        state
    }

    fn dispatcher(sink: &Arc<RecordingSink>) -> TelemetryDispatcher {
        TelemetryDispatcher::new(sink.clone(), Duration::from_secs(2))
    }

    #[test]
    fn test_updates_within_gap_are_dropped() {
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = dispatcher(&sink);
        let start = Instant::now();
        let mut state = tracking_state(start);

        assert_eq!(
            dispatcher.send_update(&mut state, TrackingAction::Update, start),
            SendOutcome::Sent
        );
        assert_eq!(
            dispatcher.send_update(
                &mut state,
                TrackingAction::Update,
                start + Duration::from_millis(1999)
            ),
            SendOutcome::RateLimited
        );
        assert_eq!(
            dispatcher.send_update(
                &mut state,
                TrackingAction::Update,
                start + Duration::from_millis(2000)
            ),
            SendOutcome::Sent
        );
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_leave_ignores_gap() {
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = dispatcher(&sink);
        let start = Instant::now();
        let mut state = tracking_state(start);

        let later = start + Duration::from_millis(500);
        assert_eq!(
            dispatcher.send_update(&mut state, TrackingAction::Leave, start),
            SendOutcome::Sent
        );
        assert_eq!(
            dispatcher.send_update(&mut state, TrackingAction::Leave, later),
            SendOutcome::Sent
        );
        assert_eq!(sink.actions(), vec![TrackingAction::Leave, TrackingAction::Leave]);
    }

    #[test]
    fn test_without_visit_nothing_is_sent() {
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = dispatcher(&sink);
        let mut state = TrackerState::new(&TrackingConfig::default());

        assert_eq!(
            dispatcher.send_update(&mut state, TrackingAction::Leave, Instant::now()),
            SendOutcome::NoVisit
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_stopped_session_only_accepts_leave() {
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = dispatcher(&sink);
        let start = Instant::now();
        let mut state = tracking_state(start);
        state.finish();

        let later = start + Duration::from_secs(10);
        assert_eq!(
            dispatcher.send_update(&mut state, TrackingAction::Update, later),
            SendOutcome::NotTracking
        );
        assert_eq!(
            dispatcher.send_update(&mut state, TrackingAction::Bounce, later),
            SendOutcome::NotTracking
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_finish_sends_once() {
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = dispatcher(&sink);
        let start = Instant::now();
        let mut state = tracking_state(start);

        assert!(dispatcher.finish(&mut state, TrackingAction::Leave, start));
        assert!(!dispatcher.finish(&mut state, TrackingAction::Leave, start));
        assert!(!dispatcher.finish(&mut state, TrackingAction::Bounce, start));
        assert_eq!(sink.actions(), vec![TrackingAction::Leave]);
        assert!(!state.is_tracking());
    }

    #[test]
    fn test_finish_right_after_update_still_sends() {
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = dispatcher(&sink);
        let start = Instant::now();
        let mut state = tracking_state(start);

        dispatcher.send_update(&mut state, TrackingAction::Update, start);
        assert!(dispatcher.finish(
            &mut state,
            TrackingAction::Bounce,
            start + Duration::from_millis(10)
        ));
        assert_eq!(
            sink.actions(),
            vec![TrackingAction::Update, TrackingAction::Bounce]
        );
    }
}
