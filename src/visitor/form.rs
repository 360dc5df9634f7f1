use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, future::Future, sync::OnceLock};

use crate::{
    api::{ArticleRef, SubmitResponse, VisitorProfile, VisitorSubmission},
    tracking::SessionMetrics,
};

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\w+([.+-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,})+$").expect("email pattern compiles")
    })
}

/// What the reader typed into the consent form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentFields {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub country: String,
}

impl ConsentFields {
    pub fn from_profile(profile: &VisitorProfile) -> Self {
        Self {
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            email: profile.email.clone(),
            country: profile.country.clone(),
        }
    }

    fn trimmed(&self) -> Self {
        Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            country: self.country.trim().to_string(),
        }
    }

    /// Trimmed copy of the fields, or every failing field at once.
    pub fn validate(&self) -> Result<ConsentFields, FieldErrors> {
        let fields = self.trimmed();
        let mut errors = FieldErrors::default();

        if fields.first_name.is_empty() {
            errors.insert(ConsentField::FirstName, FieldError::Required);
        }
        if fields.last_name.is_empty() {
            errors.insert(ConsentField::LastName, FieldError::Required);
        }
        if fields.email.is_empty() {
            errors.insert(ConsentField::Email, FieldError::Required);
        } else if !email_pattern().is_match(&fields.email) {
            errors.insert(ConsentField::Email, FieldError::InvalidEmail);
        }
        if fields.country.is_empty() {
            errors.insert(ConsentField::Country, FieldError::Required);
        }

        if errors.is_empty() {
            Ok(fields)
        } else {
            Err(errors)
        }
    }

    pub fn into_submission(self, article: &ArticleRef, metrics: SessionMetrics) -> VisitorSubmission {
        VisitorSubmission {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            country: self.country,
            blog_id: article.blog_id.clone(),
            blog_title: article.blog_title.clone(),
            blog_slug: article.blog_slug.clone(),
            scroll_depth: metrics.scroll_depth,
            time_on_page: metrics.time_on_page,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsentField {
    FirstName,
    LastName,
    Email,
    Country,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldError {
    Required,
    InvalidEmail,
}

impl FieldError {
    pub fn message(&self, field: ConsentField) -> &'static str {
        match (self, field) {
            (FieldError::Required, ConsentField::FirstName) => "First name is required",
            (FieldError::Required, ConsentField::LastName) => "Last name is required",
            (FieldError::Required, ConsentField::Email) => "Email is required",
            (FieldError::Required, ConsentField::Country) => "Country is required",
            (FieldError::InvalidEmail, _) => "Please enter a valid email address",
        }
    }
}

/// Inline, per-field validation errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors(BTreeMap<ConsentField, FieldError>);

impl FieldErrors {
    pub fn insert(&mut self, field: ConsentField, error: FieldError) {
        self.0.insert(field, error);
    }

    /// Editing a field clears its error.
    pub fn clear(&mut self, field: ConsentField) {
        self.0.remove(&field);
    }

    pub fn get(&self, field: ConsentField) -> Option<FieldError> {
        self.0.get(&field).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConsentField, FieldError)> + '_ {
        self.0.iter().map(|(field, error)| (*field, *error))
    }
}

/// One rendering of the consent form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormRequest {
    pub prefill: Option<ConsentFields>,
    /// Returning visitors see their stored profile without editing it.
    pub read_only: bool,
    pub errors: FieldErrors,
}

/// The UI that renders the consent form and the passive acknowledgments.
pub trait ConsentFormUi: Send + Sync + 'static {
    /// Shows the form and resolves with the submitted fields, or `None` when the reader closes it.
    fn collect(&self, request: FormRequest) -> impl Future<Output = Option<ConsentFields>> + Send;

    /// Non-blocking "welcome back" for a returning visitor.
    fn welcome_back(&self, profile: &VisitorProfile);

    fn submitted(&self, response: &SubmitResponse);

    fn submission_failed(&self, error: &anyhow::Error);
}
