//! Alert detection from consecutive frames of a window
//!
//! Each registered window keeps its own reference frame, thresholds and
//! cooldown. A frame is compared against the previous one, classified, and
//! emitted only once the window's cooldown has run out, so a persistent
//! flash (or an escalation right after an alert) produces at most one alert
//! per cooldown period.

pub mod metrics;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::config::{AlertSettings, AlertThresholds};
use crate::events::AlertEvent;
use crate::types::{Frame, WindowId};

use metrics::SampleSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    #[default]
    None,
    Medium,
    High,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::None => write!(f, "none"),
            AlertLevel::Medium => write!(f, "medium"),
            AlertLevel::High => write!(f, "high"),
        }
    }
}

/// Receives alerts for one window
pub trait AlertHandler: Send + Sync {
    fn on_alert(&self, event: &AlertEvent);
}

impl<F> AlertHandler for F
where
    F: Fn(&AlertEvent) + Send + Sync,
{
    fn on_alert(&self, event: &AlertEvent) {
        self(event)
    }
}

/// Per-window detector state
#[derive(Debug, Clone, Default)]
pub struct AlertState {
    /// Frame the next update is compared against
    pub reference: Option<Frame>,
    pub last_sequence: Option<u64>,
    /// Level of the last emitted alert
    pub level: AlertLevel,
    pub last_emitted: Option<Instant>,
    pub cooldown_until: Option<Instant>,
}

impl AlertState {
    /// Whether an alert emitted earlier still suppresses new ones at `now`
    pub fn is_cooling_down(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

/// Detector-wide parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    pub cooldown: Duration,
    pub thresholds: AlertThresholds,
    pub sampling: SampleSettings,
}

impl From<&AlertSettings> for DetectorSettings {
    fn from(settings: &AlertSettings) -> Self {
        Self {
            cooldown: settings.cooldown(),
            thresholds: settings.default_thresholds(),
            sampling: SampleSettings {
                stride: settings.sample_stride,
                red_rise_min: settings.red_rise_min,
                red_dominance: settings.red_dominance,
            },
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self::from(&AlertSettings::default())
    }
}

struct WindowEntry {
    state: AlertState,
    thresholds: AlertThresholds,
    handler: Option<Arc<dyn AlertHandler>>,
}

pub struct AlertDetector {
    settings: DetectorSettings,
    windows: RwLock<HashMap<WindowId, Arc<Mutex<WindowEntry>>>>,
}

impl AlertDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Start watching a window with the default thresholds; no-op if already registered
    pub fn register(&self, window: WindowId) {
        self.windows.write().entry(window).or_insert_with(|| {
            Arc::new(Mutex::new(WindowEntry {
                state: AlertState::default(),
                thresholds: self.settings.thresholds,
                handler: None,
            }))
        });
    }

    /// Register (if needed) and install the window's alert handler, replacing any previous one
    pub fn register_callback<H>(&self, window: WindowId, handler: H)
    where
        H: AlertHandler + 'static,
    {
        self.register(window);
        if let Some(entry) = self.entry(window) {
            entry.lock().handler = Some(Arc::new(handler));
        }
        debug!(window = %window, "Alert handler registered");
    }

    /// Forget a window's state and handler
    pub fn unregister(&self, window: WindowId) -> bool {
        self.windows.write().remove(&window).is_some()
    }

    /// Drop every window, releasing their handlers
    pub fn clear(&self) {
        self.windows.write().clear();
    }

    pub fn set_thresholds(&self, window: WindowId, thresholds: AlertThresholds) -> bool {
        match self.entry(window) {
            Some(entry) => {
                entry.lock().thresholds = thresholds;
                true
            }
            None => false,
        }
    }

    pub fn thresholds(&self, window: WindowId) -> Option<AlertThresholds> {
        self.entry(window).map(|entry| entry.lock().thresholds)
    }

    pub fn state(&self, window: WindowId) -> Option<AlertState> {
        self.entry(window).map(|entry| entry.lock().state.clone())
    }

    pub fn is_registered(&self, window: WindowId) -> bool {
        self.windows.read().contains_key(&window)
    }

    /// Feed a new frame; returns the alert it raised, which has already been
    /// passed to the window's handler
    pub fn on_frame_update(&self, frame: &Frame) -> Option<AlertEvent> {
        let entry = self.entry(frame.window)?;

        let (event, handler) = {
            let mut entry = entry.lock();
            let thresholds = entry.thresholds;
            let event = evaluate(&mut entry.state, frame, &thresholds, &self.settings);
            (event, entry.handler.clone())
        };

        let event = event?;
        info!(window = %event.window, level = %event.level, "Alert raised");
        if let Some(handler) = handler {
            handler.on_alert(&event);
        }
        Some(event)
    }

    fn entry(&self, window: WindowId) -> Option<Arc<Mutex<WindowEntry>>> {
        self.windows.read().get(&window).cloned()
    }
}

fn evaluate(
    state: &mut AlertState,
    frame: &Frame,
    thresholds: &AlertThresholds,
    settings: &DetectorSettings,
) -> Option<AlertEvent> {
    if state.last_sequence.is_some_and(|last| frame.sequence <= last) {
        trace!(window = %frame.window, sequence = frame.sequence, "Ignoring already seen frame");
        return None;
    }
    state.last_sequence = Some(frame.sequence);

    // First frame only establishes the baseline
    let reference = state.reference.replace(frame.clone())?;

    let Some(change) = metrics::measure(&reference.image, &frame.image, &settings.sampling) else {
        debug!(window = %frame.window, "Frame size or format changed, resetting baseline");
        return None;
    };

    let level = metrics::classify(&change, thresholds);
    let now = frame.captured_at;
    if level == AlertLevel::None {
        return None;
    }
    if state.is_cooling_down(now) {
        trace!(
            window = %frame.window,
            overall = change.overall,
            red_flash = change.red_flash,
            %level,
            last = %state.level,
            "Alert suppressed during cooldown"
        );
        return None;
    }

    state.level = level;
    state.last_emitted = Some(now);
    state.cooldown_until = Some(now + settings.cooldown);
    Some(AlertEvent {
        window: frame.window,
        level,
        timestamp: frame.wall_clock,
    })
}
