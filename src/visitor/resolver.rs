use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::{
    api::{ArticleRef, SubmitResponse, VisitorApi, VisitorProfile},
    tracking::SessionMetrics,
};

use super::form::{ConsentFields, ConsentFormUi, FieldErrors, FormRequest};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "visitor", rename_all = "camelCase")]
pub enum IdentityState {
    /// No lookup attempted yet.
    Unknown,
    /// Lookup in flight.
    Checking,
    /// No stored profile; the consent form decides.
    New,
    Returning(VisitorProfile),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngagementOutcome {
    /// A returning visitor's stored profile was submitted without a form.
    AutoSubmitted(SubmitResponse),
    /// The reader filled in and submitted the form.
    Submitted(SubmitResponse),
    /// The reader closed the form.
    Dismissed,
    /// The article is missing its id, title or slug.
    Skipped,
}

/// Decides new-vs-returning for one page view and runs the matching flow.
pub struct VisitorIdentityResolver<A> {
    api: Arc<A>,
    article: ArticleRef,
    state: IdentityState,
}

impl<A: VisitorApi> VisitorIdentityResolver<A> {
    pub fn new(api: Arc<A>, article: ArticleRef) -> Self {
        Self {
            api,
            article,
            state: IdentityState::Unknown,
        }
    }

    pub fn state(&self) -> &IdentityState {
        &self.state
    }

    pub fn article(&self) -> &ArticleRef {
        &self.article
    }

    /// Runs the lookup once; a failed lookup counts as a new visitor.
    pub async fn resolve(&mut self) -> &IdentityState {
        if self.state != IdentityState::Unknown {
            return &self.state;
        }

        self.state = IdentityState::Checking;
        self.state = match self.api.check_visitor().await {
            Ok(lookup) => match lookup.into_profile() {
                Some(profile) => IdentityState::Returning(profile),
                None => IdentityState::New,
            },
            Err(err) => {
                log_error!("visitor lookup failed, asking the reader instead: {err:?}");
                IdentityState::New
            }
        };

        &self.state
    }

    /// Resolves the visitor and runs the auto-submit or consent-form flow.
    ///
    /// `metrics` is read at the moment of each submission so the payload
    /// carries the reader's engagement at that point.
    pub async fn engage<U, M>(&mut self, ui: &U, metrics: M) -> EngagementOutcome
    where
        U: ConsentFormUi,
        M: Fn() -> SessionMetrics + Send + Sync,
    {
        if !self.article.is_complete() {
            log_warn!(
                "article reference incomplete ({:?}); skipping visitor identification",
                self.article
            );
            return EngagementOutcome::Skipped;
        }

        let request = match self.resolve().await.clone() {
            IdentityState::Returning(profile) => {
                match self.auto_submit(&profile, metrics()).await {
                    Ok(response) => {
                        log_info!("returning visitor view recorded for {}", self.article.blog_slug);
                        ui.welcome_back(&response.visitor);
                        return EngagementOutcome::AutoSubmitted(response);
                    }
                    Err(err) => {
                        log_error!("auto-submit for returning visitor failed: {err:?}");
                        FormRequest {
                            prefill: Some(ConsentFields::from_profile(&profile)),
                            read_only: true,
                            errors: FieldErrors::default(),
                        }
                    }
                }
            }
            _ => FormRequest::default(),
        };

        self.run_form(ui, request, &metrics).await
    }

    async fn auto_submit(
        &self,
        profile: &VisitorProfile,
        metrics: SessionMetrics,
    ) -> Result<SubmitResponse> {
        let submission = ConsentFields::from_profile(profile).into_submission(&self.article, metrics);
        self.api.submit_visitor_form(&submission).await
    }

    async fn run_form<U, M>(
        &mut self,
        ui: &U,
        mut request: FormRequest,
        metrics: &M,
    ) -> EngagementOutcome
    where
        U: ConsentFormUi,
        M: Fn() -> SessionMetrics + Send + Sync,
    {
        loop {
            let Some(fields) = ui.collect(request.clone()).await else {
                return EngagementOutcome::Dismissed;
            };

            let valid = match fields.validate() {
                Ok(valid) => valid,
                Err(errors) => {
                    request = FormRequest {
                        prefill: Some(fields),
                        read_only: request.read_only,
                        errors,
                    };
                    continue;
                }
            };

            let submission = valid.clone().into_submission(&self.article, metrics());
            match self.api.submit_visitor_form(&submission).await {
                Ok(response) => {
                    if !response.is_new_visitor {
                        self.state = IdentityState::Returning(response.visitor.clone());
                    }
                    ui.submitted(&response);
                    return EngagementOutcome::Submitted(response);
                }
                Err(err) => {
                    log_error!("visitor form submission failed: {err:?}");
                    ui.submission_failed(&err);
                    request = FormRequest {
                        prefill: Some(valid),
                        read_only: request.read_only,
                        errors: FieldErrors::default(),
                    };
                }
            }
        }
    }
}
