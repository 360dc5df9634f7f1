use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, sync::RwLock, time::Duration};

const API_URL_ENV: &str = "READTRACK_API_URL";

/// Tunable thresholds of the tracking pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingConfig {
    /// Depth changes smaller than this many points are not worth reporting.
    pub scroll_step_percent: u8,

    /// Of the depth changes that pass the step filter, forward every Nth.
    pub forward_every: u32,

    /// Minimum gap between two `update` sends.
    pub min_send_gap_ms: u64,

    /// Forced `update` cadence for readers that never scroll.
    pub heartbeat_ms: u64,

    /// Scroll percentage that opens the consent flow.
    pub modal_threshold_percent: f64,

    /// Dwell time after which the consent flow opens anyway; `None` disables it.
    pub modal_fallback_ms: Option<u64>,

    /// Length of one animation frame for the tokio frame scheduler.
    pub frame_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            scroll_step_percent: 5,
            forward_every: 3,
            min_send_gap_ms: 2_000,
            heartbeat_ms: 60_000,
            modal_threshold_percent: 20.0,
            modal_fallback_ms: Some(30_000),
            frame_ms: 16,
        }
    }
}

impl TrackingConfig {
    pub fn min_send_gap(&self) -> Duration {
        Duration::from_millis(self.min_send_gap_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(1))
    }

    pub fn modal_fallback(&self) -> Option<Duration> {
        self.modal_fallback_ms.map(Duration::from_millis)
    }

    pub fn frame(&self) -> Duration {
        Duration::from_millis(self.frame_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_base_url: String,
    pub language: String,
    pub request_timeout_ms: u64,
    pub tracking: TrackingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".into(),
            language: "fr".into(),
            request_timeout_ms: 10_000,
            tracking: TrackingConfig::default(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `READTRACK_API_URL` wins over the file value.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring malformed settings in {}: {}",
                    path.display(),
                    err
                );
                Settings::default()
            })
        } else {
            Settings::default()
        };
        data.apply_env_overrides();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update_tracking(&self, tracking: TrackingConfig) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.tracking = tracking;
        self.persist(&guard)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
