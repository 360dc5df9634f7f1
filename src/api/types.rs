use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackingAction {
    Update,
    Leave,
    Bounce,
}

impl TrackingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingAction::Update => "update",
            TrackingAction::Leave => "leave",
            TrackingAction::Bounce => "bounce",
        }
    }

    /// Terminal actions are the last send of a page view and bypass the rate gate.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackingAction::Leave | TrackingAction::Bounce)
    }
}

/// Body of `POST /blogs/track`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    pub visit_id: String,
    pub time_on_page: u64,
    pub scroll_depth: u8,
    pub action: TrackingAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitorProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub country: String,
    #[serde(default)]
    pub is_returning_visitor: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_blogs_visited: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_visit_at: Option<DateTime<Utc>>,
}

/// Response of `GET /blog-visitors/check`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitorLookup {
    pub exists: bool,
    #[serde(default)]
    pub visitor: Option<VisitorProfile>,
}

impl VisitorLookup {
    /// The stored profile, only when the backend both claims a match and sends one.
    pub fn into_profile(self) -> Option<VisitorProfile> {
        if self.exists {
            self.visitor
        } else {
            None
        }
    }
}

/// The article a consent submission is attributed to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRef {
    pub blog_id: String,
    pub blog_title: String,
    pub blog_slug: String,
}

impl ArticleRef {
    pub fn new(
        blog_id: impl Into<String>,
        blog_title: impl Into<String>,
        blog_slug: impl Into<String>,
    ) -> Self {
        Self {
            blog_id: blog_id.into(),
            blog_title: blog_title.into(),
            blog_slug: blog_slug.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.blog_id.trim().is_empty()
            && !self.blog_title.trim().is_empty()
            && !self.blog_slug.trim().is_empty()
    }
}

/// Body of `POST /blog-visitors/submit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VisitorSubmission {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub country: String,
    pub blog_id: String,
    pub blog_title: String,
    pub blog_slug: String,
    pub scroll_depth: u8,
    pub time_on_page: u64,
}

/// Response of `POST /blog-visitors/submit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub is_new_visitor: bool,
    pub visitor: VisitorProfile,
}

/// A text field that is either plain or keyed by language (`{"fr": .., "en": ..}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LocalizedText {
    Plain(String),
    Localized(BTreeMap<String, String>),
}

impl LocalizedText {
    /// Picks `language`, then `fr`, then any non-empty translation.
    pub fn resolve(&self, language: &str) -> String {
        match self {
            LocalizedText::Plain(text) => text.clone(),
            LocalizedText::Localized(map) => map
                .get(language)
                .filter(|text| !text.is_empty())
                .or_else(|| map.get("fr").filter(|text| !text.is_empty()))
                .or_else(|| map.values().find(|text| !text.is_empty()))
                .cloned()
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlogSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: LocalizedText,
    pub slug: LocalizedText,
}

/// Response of `GET /blogs/{slug}`; `visitId` is present when the backend opened a visit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArticleResponse {
    pub data: BlogSummary,
    #[serde(default)]
    pub visit_id: Option<String>,
}

/// A loaded article page, ready for tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleVisit {
    pub article: ArticleRef,
    pub visit_id: Option<String>,
}

impl ArticleResponse {
    pub fn into_visit(self, language: &str) -> ArticleVisit {
        let visit_id = self.visit_id.filter(|id| !id.trim().is_empty());
        ArticleVisit {
            article: ArticleRef {
                blog_id: self.data.id,
                blog_title: self.data.title.resolve(language),
                blog_slug: self.data.slug.resolve(language),
            },
            visit_id,
        }
    }
}
