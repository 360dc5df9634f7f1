use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    api::{ArticleRef, ArticleVisit, TelemetrySink, VisitorApi},
    host::{LifecycleSignal, PageHost, ViewportMetrics},
    settings::TrackingConfig,
    tracking::{SessionMetrics, SessionTracker},
    visitor::{
        ConsentFormUi, EngagementModalPolicy, EngagementOutcome, IdentityState,
        VisitorIdentityResolver,
    },
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Everything an article page needs from the application.
pub struct PageContext<A, U> {
    pub api: Arc<A>,
    pub sink: Arc<dyn TelemetrySink>,
    pub ui: Arc<U>,
    pub host: PageHost,
    pub config: TrackingConfig,
}

impl<A, U> Clone for PageContext<A, U> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            sink: self.sink.clone(),
            ui: self.ui.clone(),
            host: self.host.clone(),
            config: self.config.clone(),
        }
    }
}

/// One view of one article.
///
/// Owns the view's tracker and consent flow; dropping the page (or calling
/// [`ArticlePage::unmount`]) ends tracking with a final `leave`.
pub struct ArticlePage<A, U> {
    article: ArticleRef,
    tracker: Option<SessionTracker>,
    engagement: Arc<Engagement<A, U>>,
    fallback: Option<CancellationToken>,
}

struct Engagement<A, U> {
    ui: Arc<U>,
    resolver: tokio::sync::Mutex<VisitorIdentityResolver<A>>,
    policy: Mutex<EngagementModalPolicy>,
    tracker: Option<SessionTracker>,
    enabled: bool,
    task: Mutex<Option<JoinHandle<EngagementOutcome>>>,
}

impl<A: VisitorApi, U: ConsentFormUi> ArticlePage<A, U> {
    /// Loads the article and mounts the page; fails only if the article cannot be loaded.
    pub async fn open(ctx: &PageContext<A, U>, slug: &str) -> Result<Self> {
        let visit = ctx.api.open_article(slug).await?;
        Ok(Self::mount(ctx, visit))
    }

    pub fn mount(ctx: &PageContext<A, U>, visit: ArticleVisit) -> Self {
        let ArticleVisit { article, visit_id } = visit;

        let tracker = visit_id.map(|visit_id| {
            let tracker = SessionTracker::new(ctx.sink.clone(), &ctx.host, ctx.config.clone());
            if let Err(err) = tracker.start(&visit_id) {
                log_error!("could not start tracking for visit {visit_id}: {err:?}");
            }
            tracker
        });
        if tracker.is_none() {
            log_info!("no visit id for {}; engagement is not tracked", article.blog_slug);
        }

        let enabled = article.is_complete();
        if !enabled {
            log_warn!("article reference incomplete ({:?}); consent flow disabled", article);
        }

        let engagement = Arc::new(Engagement {
            ui: ctx.ui.clone(),
            resolver: tokio::sync::Mutex::new(VisitorIdentityResolver::new(
                ctx.api.clone(),
                article.clone(),
            )),
            policy: Mutex::new(EngagementModalPolicy::new(ctx.config.modal_threshold_percent)),
            tracker: tracker.clone(),
            enabled,
            task: Mutex::new(None),
        });

        let fallback = match ctx.config.modal_fallback() {
            Some(delay) if enabled => spawn_fallback(Arc::downgrade(&engagement), delay),
            _ => None,
        };

        Self {
            article,
            tracker,
            engagement,
            fallback,
        }
    }

    pub fn on_scroll(&self, viewport: ViewportMetrics) {
        if let Some(tracker) = &self.tracker {
            tracker.on_scroll(viewport);
        }
        self.engagement
            .on_scroll(viewport.scroll_fraction_percent());
    }

    pub fn on_lifecycle(&self, signal: LifecycleSignal) -> bool {
        self.cancel_fallback();
        self.tracker
            .as_ref()
            .is_some_and(|tracker| tracker.on_lifecycle(signal))
    }

    pub fn mark_bounce(&self) -> bool {
        self.tracker
            .as_ref()
            .is_some_and(|tracker| tracker.mark_bounce())
    }

    pub fn article(&self) -> &ArticleRef {
        &self.article
    }

    pub fn tracker(&self) -> Option<&SessionTracker> {
        self.tracker.as_ref()
    }

    pub fn has_shown_modal(&self) -> bool {
        self.engagement.lock_policy().has_shown_modal()
    }

    /// Waits for the identity state once any running consent flow has let go of it.
    pub async fn identity_state(&self) -> IdentityState {
        self.engagement.resolver.lock().await.state().clone()
    }

    /// Waits for the consent flow started by the policy, if one was started and not yet collected.
    pub async fn engagement_outcome(&self) -> Option<EngagementOutcome> {
        let task = self
            .engagement
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        match task.await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                log_error!("consent flow task failed: {err}");
                None
            }
        }
    }

    /// Ends the page view: an open consent form is closed and the tracker sends its final `leave`.
    pub fn unmount(self) {
        drop(self);
    }

    fn cancel_fallback(&self) {
        if let Some(token) = &self.fallback {
            token.cancel();
        }
    }
}

impl<A, U> Drop for ArticlePage<A, U> {
    fn drop(&mut self) {
        if let Some(token) = self.fallback.take() {
            token.cancel();
        }
        self.engagement.abort();
        if let Some(tracker) = &self.tracker {
            tracker.stop();
        }
    }
}

impl<A, U> Engagement<A, U> {
    fn lock_policy(&self) -> MutexGuard<'_, EngagementModalPolicy> {
        self.policy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tears down a consent flow that is still open; a finished one is left alone.
    fn abort(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if !task.is_finished() {
                log_info!("page unmounted; closing the open consent flow");
            }
            task.abort();
        }
    }
}

impl<A: VisitorApi, U: ConsentFormUi> Engagement<A, U> {
    fn on_scroll(self: &Arc<Self>, scroll_percentage: f64) {
        if !self.enabled {
            return;
        }
        let triggered = self.lock_policy().observe_scroll(scroll_percentage);
        if triggered {
            self.launch("scroll threshold");
        }
    }

    fn on_dwell_fallback(self: &Arc<Self>) {
        if !self.enabled {
            return;
        }
        let triggered = self.lock_policy().try_latch();
        if triggered {
            self.launch("dwell fallback");
        }
    }

    fn launch(self: &Arc<Self>, reason: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log_warn!("no async runtime; consent flow ({reason}) not started");
            return;
        };

        log_info!("consent flow triggered by {reason}");
        let this = Arc::clone(self);
        let task = handle.spawn(async move { this.run().await });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    async fn run(&self) -> EngagementOutcome {
        let tracker = self.tracker.clone();
        let metrics = move || {
            tracker
                .as_ref()
                .and_then(|tracker| tracker.get_metrics())
                .unwrap_or_else(SessionMetrics::zero)
        };

        let mut resolver = self.resolver.lock().await;
        resolver.engage(self.ui.as_ref(), metrics).await
    }
}

fn spawn_fallback<A: VisitorApi, U: ConsentFormUi>(
    engagement: Weak<Engagement<A, U>>,
    delay: std::time::Duration,
) -> Option<CancellationToken> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        log_warn!("no async runtime; dwell fallback for the consent flow disabled");
        return None;
    };

    let token = CancellationToken::new();
    let cancelled = token.clone();
    handle.spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                if let Some(engagement) = engagement.upgrade() {
                    engagement.on_dwell_fallback();
                }
            }
            _ = cancelled.cancelled() => {}
        }
    });

    Some(token)
}
