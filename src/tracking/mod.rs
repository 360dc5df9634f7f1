pub mod controller;
pub mod dispatcher;
pub mod dwell;
pub mod scroll;
pub mod state;

pub use controller::SessionTracker;
pub use dispatcher::{SendOutcome, TelemetryDispatcher};
pub use dwell::DwellTimeAccumulator;
pub use scroll::{depth_percent, SampleDecision, ScrollDepthSampler};
pub use state::{SessionMetrics, TrackerState, TrackingStatus};
