//! Replays a recorded article session against a live backend.
//!
//! ```text
//! readtrack <slug> [--settings readtrack.json] [--profile visitor.json] < events.ndjson
//! ```
//!
//! Each stdin line is one page event:
//! `{"type":"scroll","scrollTop":640,"documentHeight":4200,"viewportHeight":900}`,
//! `{"type":"wait","ms":1500}`, `{"type":"lifecycle","signal":"pageHide"}` or
//! `{"type":"bounce"}`. The page unmounts at end of input.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use log::{error, info, warn};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use readtrack_lib::{
    api::{SubmitResponse, VisitorProfile},
    init_logging,
    visitor::{ConsentFields, FormRequest},
    ArticlePage, ConsentFormUi, HttpVisitorApi, LifecycleSignal, PageContext, PageHost,
    SettingsStore, ViewportMetrics,
};

const DEFAULT_SETTINGS_PATH: &str = "readtrack.json";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum PageEvent {
    Scroll(ViewportMetrics),
    Wait { ms: u64 },
    Lifecycle { signal: LifecycleSignal },
    Bounce,
}

struct Args {
    slug: String,
    settings: PathBuf,
    profile: Option<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut slug = None;
        let mut settings = PathBuf::from(DEFAULT_SETTINGS_PATH);
        let mut profile = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--settings" => {
                    settings = args
                        .next()
                        .map(PathBuf::from)
                        .ok_or_else(|| anyhow!("--settings needs a path"))?;
                }
                "--profile" => {
                    profile = Some(
                        args.next()
                            .map(PathBuf::from)
                            .ok_or_else(|| anyhow!("--profile needs a path"))?,
                    );
                }
                flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
                _ if slug.is_none() => slug = Some(arg),
                _ => bail!("unexpected argument {arg}"),
            }
        }

        Ok(Self {
            slug: slug.ok_or_else(|| anyhow!("usage: readtrack <slug> [--settings path] [--profile path]"))?,
            settings,
            profile,
        })
    }
}

/// Answers the consent form from a profile file; without one the form is closed.
struct ProfileFileForm {
    fields: Option<ConsentFields>,
}

impl ProfileFileForm {
    fn load(path: Option<&PathBuf>) -> Result<Self> {
        let fields = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read profile from {}", path.display()))?;
                Some(serde_json::from_str(&contents).context("malformed profile")?)
            }
            None => None,
        };
        Ok(Self { fields })
    }
}

impl ConsentFormUi for ProfileFileForm {
    async fn collect(&self, request: FormRequest) -> Option<ConsentFields> {
        if !request.errors.is_empty() {
            for (field, err) in request.errors.iter() {
                warn!("consent form: {}", err.message(field));
            }
            // The same answers would fail again.
            return None;
        }
        match (&self.fields, request.prefill) {
            (Some(fields), _) => Some(fields.clone()),
            (None, Some(prefill)) if request.read_only => Some(prefill),
            _ => {
                info!("consent form shown; no profile supplied, closing it");
                None
            }
        }
    }

    fn welcome_back(&self, profile: &VisitorProfile) {
        info!("welcome back, {} {}", profile.first_name, profile.last_name);
    }

    fn submitted(&self, response: &SubmitResponse) {
        info!(
            "consent recorded for {} (new visitor: {})",
            response.visitor.email, response.is_new_visitor
        );
    }

    fn submission_failed(&self, error: &anyhow::Error) {
        error!("consent submission failed: {error:?}");
    }
}

async fn replay<A, U>(page: &ArticlePage<A, U>) -> Result<()>
where
    A: readtrack_lib::VisitorApi,
    U: ConsentFormUi,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("failed to read events")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let event: PageEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                warn!("skipping event on line {line_no}: {err}");
                continue;
            }
        };

        match event {
            PageEvent::Scroll(viewport) => page.on_scroll(viewport),
            PageEvent::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            PageEvent::Lifecycle { signal } => {
                page.on_lifecycle(signal);
            }
            PageEvent::Bounce => {
                page.mark_bounce();
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse(std::env::args().skip(1))?;
    let settings = SettingsStore::new(args.settings.clone())?.settings();
    info!("readtrack using backend {}", settings.api_base_url);

    let api = Arc::new(HttpVisitorApi::new(&settings)?);
    let ctx = PageContext {
        api: api.clone(),
        sink: api,
        ui: Arc::new(ProfileFileForm::load(args.profile.as_ref())?),
        host: PageHost::tokio(settings.tracking.frame()),
        config: settings.tracking.clone(),
    };

    let page = ArticlePage::open(&ctx, &args.slug)
        .await
        .with_context(|| format!("failed to open article {}", args.slug))?;

    replay(&page).await?;

    if let Some(outcome) = page.engagement_outcome().await {
        info!("consent flow finished: {outcome:?}");
    }
    if let Some(metrics) = page.tracker().and_then(|tracker| tracker.get_metrics()) {
        info!(
            "session summary: {}s on page, {}% max depth",
            metrics.time_on_page, metrics.scroll_depth
        );
    }

    page.unmount();

    // Tracking sends are fire-and-forget; let the last one leave before the runtime stops.
    tokio::time::sleep(SHUTDOWN_GRACE.min(settings.request_timeout())).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        Args::parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_args_defaults() {
        let parsed = args(&["bilan-de-sante"]).unwrap();
        assert_eq!(parsed.slug, "bilan-de-sante");
        assert_eq!(parsed.settings, PathBuf::from(DEFAULT_SETTINGS_PATH));
        assert!(parsed.profile.is_none());
    }

    #[test]
    fn test_args_flags() {
        let parsed = args(&["--profile", "ada.json", "bilan", "--settings", "prod.json"]).unwrap();
        assert_eq!(parsed.slug, "bilan");
        assert_eq!(parsed.settings, PathBuf::from("prod.json"));
        assert_eq!(parsed.profile, Some(PathBuf::from("ada.json")));
    }

    #[test]
    fn test_args_errors() {
        assert!(args(&[]).is_err());
        assert!(args(&["a", "b"]).is_err());
        assert!(args(&["a", "--verbose"]).is_err());
        assert!(args(&["a", "--profile"]).is_err());
    }

    #[test]
    fn test_event_lines() {
        let scroll: PageEvent = serde_json::from_str(
            r#"{"type":"scroll","scrollTop":640,"documentHeight":4200,"viewportHeight":900}"#,
        )
        .unwrap();
        assert!(matches!(scroll, PageEvent::Scroll(v) if v.scroll_top == 640.0));

        let hide: PageEvent =
            serde_json::from_str(r#"{"type":"lifecycle","signal":"pageHide"}"#).unwrap();
        assert!(matches!(
            hide,
            PageEvent::Lifecycle {
                signal: LifecycleSignal::PageHide
            }
        ));

        let wait: PageEvent = serde_json::from_str(r#"{"type":"wait","ms":1500}"#).unwrap();
        assert!(matches!(wait, PageEvent::Wait { ms: 1500 }));
    }
}
