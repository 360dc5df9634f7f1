use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Time on page, always derived from the start anchor so pauses and timer
/// jitter never accumulate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DwellTimeAccumulator {
    started: Option<Instant>,
}

impl DwellTimeAccumulator {
    pub fn start(&mut self, now: Instant) {
        self.started = Some(now);
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    /// Whole seconds since `start`; 0 before it.
    pub fn time_on_page(&self, now: Instant) -> u64 {
        self.started
            .map(|started| now.saturating_duration_since(started).as_secs())
            .unwrap_or(0)
    }
}

/// Calls `on_tick` every `period` until it returns false or `cancel` fires.
///
/// The first tick happens one full period after the call.
pub async fn run_heartbeat<F>(period: Duration, cancel: CancellationToken, mut on_tick: F)
where
    F: FnMut() -> bool + Send,
{
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !on_tick() {
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}
