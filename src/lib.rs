//! Reader engagement tracking for blog article pages.
//!
//! An [`page::ArticlePage`] owns one article view: its [`tracking::SessionTracker`]
//! measures scroll depth and dwell time and streams them to the backend, and
//! its consent flow identifies the visitor once the reader is engaged.

pub mod api;
pub mod host;
pub mod page;
pub mod settings;
pub mod tracking;
pub mod utils;
pub mod visitor;

#[cfg(test)]
mod testing;

pub use api::{HttpVisitorApi, TelemetrySink, VisitorApi};
pub use host::{LifecycleSignal, PageHost, ViewportMetrics};
pub use page::{ArticlePage, PageContext};
pub use settings::{Settings, SettingsStore, TrackingConfig};
pub use tracking::{SessionMetrics, SessionTracker};
pub use utils::init_logging;
pub use visitor::{ConsentFormUi, EngagementOutcome, IdentityState};
