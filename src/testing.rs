//! In-memory stand-ins for the backend and the consent UI.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};

use crate::{
    api::{
        ArticleVisit, SubmitResponse, TelemetrySink, TrackingAction, TrackingUpdate, VisitorApi,
        VisitorLookup, VisitorProfile, VisitorSubmission,
    },
    visitor::{ConsentFields, ConsentFormUi, FormRequest},
};

pub fn ada() -> VisitorProfile {
    VisitorProfile {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "ada@example.org".into(),
        country: "Senegal".into(),
        is_returning_visitor: true,
        total_blogs_visited: Some(3),
        last_visit_at: None,
    }
}

#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<TrackingUpdate>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<TrackingUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<TrackingAction> {
        self.updates().into_iter().map(|u| u.action).collect()
    }

    pub fn len(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for RecordingSink {
    fn dispatch(&self, update: TrackingUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

pub struct FakeVisitorApi {
    lookup: Option<VisitorLookup>,
    article: Option<ArticleVisit>,
    recognise_on_submit: bool,
    submit_failures: AtomicUsize,
    lookups: AtomicUsize,
    submissions: Mutex<Vec<VisitorSubmission>>,
}

impl FakeVisitorApi {
    fn with(lookup: Option<VisitorLookup>) -> Self {
        Self {
            lookup,
            article: None,
            recognise_on_submit: false,
            submit_failures: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(profile: VisitorProfile) -> Self {
        Self::with(Some(VisitorLookup {
            exists: true,
            visitor: Some(profile),
        }))
    }

    pub fn new_visitor() -> Self {
        Self::with(Some(VisitorLookup {
            exists: false,
            visitor: None,
        }))
    }

    pub fn lookup_failing() -> Self {
        Self::with(None)
    }

    pub fn with_lookup(lookup: VisitorLookup) -> Self {
        Self::with(Some(lookup))
    }

    pub fn with_article(mut self, article: ArticleVisit) -> Self {
        self.article = Some(article);
        self
    }

    /// The next `count` submissions fail.
    pub fn failing_submissions(self, count: usize) -> Self {
        self.submit_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn recognising_on_submit(mut self) -> Self {
        self.recognise_on_submit = true;
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Every submission attempt, failed ones included.
    pub fn submissions(&self) -> Vec<VisitorSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    fn known_visitor(&self) -> bool {
        self.recognise_on_submit || self.lookup.as_ref().is_some_and(|lookup| lookup.exists)
    }
}

impl VisitorApi for FakeVisitorApi {
    async fn open_article(&self, slug: &str) -> Result<ArticleVisit> {
        self.article
            .clone()
            .ok_or_else(|| anyhow!("article {slug} not found"))
    }

    async fn check_visitor(&self) -> Result<VisitorLookup> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.lookup
            .clone()
            .ok_or_else(|| anyhow!("visitor lookup unavailable"))
    }

    async fn submit_visitor_form(&self, submission: &VisitorSubmission) -> Result<SubmitResponse> {
        self.submissions.lock().unwrap().push(submission.clone());

        let failing = self
            .submit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("submission rejected"));
        }

        let known = self.known_visitor();
        Ok(SubmitResponse {
            is_new_visitor: !known,
            visitor: VisitorProfile {
                first_name: submission.first_name.clone(),
                last_name: submission.last_name.clone(),
                email: submission.email.clone(),
                country: submission.country.clone(),
                is_returning_visitor: known,
                total_blogs_visited: Some(1),
                last_visit_at: None,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    WelcomeBack(String),
    Submitted(bool),
    SubmissionFailed,
}

/// Answers each form rendering from a script; an exhausted script closes the form.
pub struct ScriptedConsentForm {
    answers: Mutex<VecDeque<Option<ConsentFields>>>,
    requests: Mutex<Vec<FormRequest>>,
    events: Mutex<Vec<UiEvent>>,
    think_time: Option<Duration>,
}

impl ScriptedConsentForm {
    pub fn new(answers: Vec<Option<ConsentFields>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            requests: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            think_time: None,
        }
    }

    /// The reader takes `delay` to answer each rendering.
    pub fn answering_after(mut self, delay: Duration) -> Self {
        self.think_time = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<FormRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn forms_shown(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ConsentFormUi for ScriptedConsentForm {
    async fn collect(&self, request: FormRequest) -> Option<ConsentFields> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.think_time {
            tokio::time::sleep(delay).await;
        }
        self.answers.lock().unwrap().pop_front().flatten()
    }

    fn welcome_back(&self, profile: &VisitorProfile) {
        self.events
            .lock()
            .unwrap()
            .push(UiEvent::WelcomeBack(profile.first_name.clone()));
    }

    fn submitted(&self, response: &SubmitResponse) {
        self.events
            .lock()
            .unwrap()
            .push(UiEvent::Submitted(response.is_new_visitor));
    }

    fn submission_failed(&self, _error: &anyhow::Error) {
        self.events.lock().unwrap().push(UiEvent::SubmissionFailed);
    }
}
