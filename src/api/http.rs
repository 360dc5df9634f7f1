use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};

use crate::settings::Settings;

use super::{
    ArticleResponse, ArticleVisit, SubmitResponse, TelemetrySink, TrackingUpdate, VisitorApi,
    VisitorLookup, VisitorSubmission,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_warn};

/// `VisitorApi` and `TelemetrySink` over the backend's REST endpoints.
#[derive(Clone)]
pub struct HttpVisitorApi {
    client: Client,
    base_url: String,
    language: String,
}

impl HttpVisitorApi {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            language: settings.language.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl VisitorApi for HttpVisitorApi {
    async fn open_article(&self, slug: &str) -> Result<ArticleVisit> {
        let response = self
            .client
            .get(self.url(&format!("blogs/{slug}")))
            .query(&[("lang", self.language.as_str())])
            .send()
            .await
            .with_context(|| format!("failed to load article {slug}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(anyhow!("article {slug} not found"));
        }

        let body: ArticleResponse = response
            .error_for_status()?
            .json()
            .await
            .context("malformed article response")?;

        Ok(body.into_visit(&self.language))
    }

    async fn check_visitor(&self) -> Result<VisitorLookup> {
        let lookup = self
            .client
            .get(self.url("blog-visitors/check"))
            .send()
            .await
            .context("visitor lookup request failed")?
            .error_for_status()?
            .json()
            .await
            .context("malformed visitor lookup response")?;

        Ok(lookup)
    }

    async fn submit_visitor_form(&self, submission: &VisitorSubmission) -> Result<SubmitResponse> {
        let response = self
            .client
            .post(self.url("blog-visitors/submit"))
            .json(submission)
            .send()
            .await
            .context("visitor form submission failed")?
            .error_for_status()?
            .json()
            .await
            .context("malformed visitor form response")?;

        Ok(response)
    }
}

impl TelemetrySink for HttpVisitorApi {
    fn dispatch(&self, update: TrackingUpdate) {
        let request = self.client.post(self.url("blogs/track")).json(&update);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log_warn!(
                "no runtime to send {} update for visit {}; dropped",
                update.action.as_str(),
                update.visit_id
            );
            return;
        };

        handle.spawn(async move {
            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => {}
                Err(err) => log_error!(
                    "tracking {} for visit {} failed: {}",
                    update.action.as_str(),
                    update.visit_id,
                    err
                ),
            }
        });
    }
}
