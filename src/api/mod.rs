pub mod http;
pub mod types;

use anyhow::Result;
use std::future::Future;

pub use http::HttpVisitorApi;
pub use types::{
    ArticleRef, ArticleResponse, ArticleVisit, BlogSummary, LocalizedText, SubmitResponse,
    TrackingAction, TrackingUpdate, VisitorLookup, VisitorProfile, VisitorSubmission,
};

/// Backend endpoints used by an article page for identity and visit records.
pub trait VisitorApi: Send + Sync + 'static {
    /// Loads the article by slug; the backend may open a visit record for it.
    fn open_article(&self, slug: &str) -> impl Future<Output = Result<ArticleVisit>> + Send;

    /// Looks up a stored profile for the requesting browser.
    fn check_visitor(&self) -> impl Future<Output = Result<VisitorLookup>> + Send;

    fn submit_visitor_form(
        &self,
        submission: &VisitorSubmission,
    ) -> impl Future<Output = Result<SubmitResponse>> + Send;
}

/// Destination of tracking updates.
///
/// `dispatch` must return without waiting on the network: it is called from
/// lifecycle handlers where nothing deferred is guaranteed to run.
pub trait TelemetrySink: Send + Sync {
    fn dispatch(&self, update: TrackingUpdate);
}
