//! JSON configuration consumed by the capture pipeline
//!
//! Loaded once at startup and passed explicitly into the tracking session;
//! nothing here is global. Missing keys fall back to the defaults in
//! `crate::constants`, so a partial file is always valid.

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::constants::{alerts, capture, eve, layout};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
    #[serde(default)]
    pub layout: LayoutSettings,
    /// Only windows whose title contains this string are tracked
    #[serde(default = "default_title_filter")]
    pub title_filter: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Capture scheduling knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Interval for the active window (ms)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Interval for inactive or minimized windows (ms)
    #[serde(default = "default_inactive_interval_ms")]
    pub inactive_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

/// Alert classification thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub medium: f32,
    pub high: f32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            medium: alerts::DEFAULT_MEDIUM_THRESHOLD,
            high: alerts::DEFAULT_HIGH_THRESHOLD,
        }
    }
}

/// Alert detection knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f32,
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_sample_stride")]
    pub sample_stride: u32,
    #[serde(default = "default_red_rise_min")]
    pub red_rise_min: u8,
    #[serde(default = "default_red_dominance")]
    pub red_dominance: u8,
    /// Forward `FrameAvailable` events to consumers that prefer push over poll
    #[serde(default)]
    pub emit_frame_events: bool,
    /// Per-window threshold overrides keyed by window title
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, AlertThresholds>,
}

/// Layout knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSettings {
    #[serde(default = "default_spacing")]
    pub spacing: u32,
    #[serde(default = "default_main_fraction")]
    pub main_fraction: f32,
    #[serde(default = "default_cascade_step")]
    pub cascade_step: i32,
}

// Default value functions
fn default_title_filter() -> String {
    eve::DEFAULT_TITLE_FILTER.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_ms() -> u64 {
    capture::DEFAULT_INTERVAL_MS
}

fn default_inactive_interval_ms() -> u64 {
    capture::DEFAULT_INACTIVE_INTERVAL_MS
}

fn default_timeout_ms() -> u64 {
    capture::DEFAULT_TIMEOUT_MS
}

fn default_max_consecutive_failures() -> u32 {
    capture::DEFAULT_MAX_CONSECUTIVE_FAILURES
}

fn default_backoff_ceiling_ms() -> u64 {
    capture::DEFAULT_BACKOFF_CEILING_MS
}

fn default_shutdown_grace_ms() -> u64 {
    capture::DEFAULT_SHUTDOWN_GRACE_MS
}

fn default_medium_threshold() -> f32 {
    alerts::DEFAULT_MEDIUM_THRESHOLD
}

fn default_high_threshold() -> f32 {
    alerts::DEFAULT_HIGH_THRESHOLD
}

fn default_cooldown_ms() -> u64 {
    alerts::DEFAULT_COOLDOWN_MS
}

fn default_sample_stride() -> u32 {
    alerts::DEFAULT_SAMPLE_STRIDE
}

fn default_red_rise_min() -> u8 {
    alerts::DEFAULT_RED_RISE_MIN
}

fn default_red_dominance() -> u8 {
    alerts::DEFAULT_RED_DOMINANCE
}

fn default_spacing() -> u32 {
    layout::DEFAULT_SPACING
}

fn default_main_fraction() -> f32 {
    layout::DEFAULT_MAIN_FRACTION
}

fn default_cascade_step() -> i32 {
    layout::DEFAULT_CASCADE_STEP
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            inactive_interval_ms: default_inactive_interval_ms(),
            timeout_ms: default_timeout_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            backoff_ceiling_ms: default_backoff_ceiling_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            medium_threshold: default_medium_threshold(),
            high_threshold: default_high_threshold(),
            cooldown_ms: default_cooldown_ms(),
            sample_stride: default_sample_stride(),
            red_rise_min: default_red_rise_min(),
            red_dominance: default_red_dominance(),
            emit_frame_events: false,
            overrides: HashMap::new(),
        }
    }
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            spacing: default_spacing(),
            main_fraction: default_main_fraction(),
            cascade_step: default_cascade_step(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            alerts: AlertSettings::default(),
            layout: LayoutSettings::default(),
            title_filter: default_title_filter(),
            log_level: default_log_level(),
        }
    }
}

impl CaptureSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn inactive_interval(&self) -> Duration {
        Duration::from_millis(self.inactive_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.backoff_ceiling_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl AlertSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn default_thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            medium: self.medium_threshold,
            high: self.high_threshold,
        }
    }

    /// Thresholds for a window title, falling back to the global pair
    pub fn thresholds_for(&self, title: &str) -> AlertThresholds {
        self.overrides
            .get(title)
            .copied()
            .unwrap_or_else(|| self.default_thresholds())
    }
}

impl Config {
    /// Whether a window title passes the title filter; an empty filter matches everything
    pub fn matches_title(&self, title: &str) -> bool {
        self.title_filter.is_empty() || title.contains(&self.title_filter)
    }

    pub fn path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(crate::constants::config::APP_DIR);
        path.push(crate::constants::config::FILENAME);
        path
    }

    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config = Self::from_json(&contents)
            .with_context(|| format!("Invalid config in {}", path.display()))?;

        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(contents).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        ensure!(capture.interval_ms > 0, "capture.interval_ms must be positive");
        ensure!(
            capture.inactive_interval_ms > 0,
            "capture.inactive_interval_ms must be positive"
        );
        ensure!(capture.timeout_ms > 0, "capture.timeout_ms must be positive");
        ensure!(
            capture.max_consecutive_failures > 0,
            "capture.max_consecutive_failures must be at least 1"
        );

        let alerts = &self.alerts;
        validate_thresholds("alerts", alerts.default_thresholds())?;
        for (title, thresholds) in &alerts.overrides {
            validate_thresholds(&format!("alerts.overrides[{title:?}]"), *thresholds)?;
        }
        ensure!(alerts.sample_stride > 0, "alerts.sample_stride must be at least 1");

        let layout = &self.layout;
        ensure!(
            layout.main_fraction > 0.0 && layout.main_fraction < 1.0,
            "layout.main_fraction must be between 0 and 1 (exclusive), got {}",
            layout.main_fraction
        );
        Ok(())
    }
}

fn validate_thresholds(scope: &str, thresholds: AlertThresholds) -> Result<()> {
    for (name, value) in [("medium", thresholds.medium), ("high", thresholds.high)] {
        ensure!(
            (0.0..=1.0).contains(&value),
            "{scope} {name} threshold must be within 0..=1, got {value}"
        );
    }
    Ok(())
}
