//! Tracking session: cache, scheduler and alert detector wired together
//!
//! Capture tasks report through an internal channel. A single dispatcher
//! task feeds new frames to the detector and forwards alerts and capture
//! failures to the session's outward event stream, so detection never runs
//! on a capture task.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::alert::{AlertDetector, AlertLevel, DetectorSettings};
use crate::backend::CaptureSource;
use crate::cache::FrameCache;
use crate::config::Config;
use crate::error::LayoutError;
use crate::events::{AlertEvent, PipelineEvent};
use crate::layout::{self, GridPattern, LayoutAssignment};
use crate::scheduler::{CaptureScheduler, SchedulerPolicy};
use crate::types::{Frame, Rect, TrackedWindow, WindowId, WindowInfo};

/// What a reconcile pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<WindowId>,
    pub removed: Vec<WindowId>,
    /// Already tracked windows whose title, geometry or interval was refreshed
    pub updated: Vec<WindowId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Point-in-time view of one tracked window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStatus {
    pub id: WindowId,
    pub title: String,
    pub geometry: Rect,
    pub interval_ms: u64,
    pub enabled: bool,
    pub consecutive_failures: u32,
    pub last_sequence: Option<u64>,
    pub alert_level: AlertLevel,
}

pub struct TrackingSession<C> {
    config: Config,
    cache: Arc<FrameCache>,
    scheduler: CaptureScheduler<C>,
    detector: Arc<AlertDetector>,
    /// Intervals set explicitly per window; reconcile leaves these alone
    pinned_intervals: Mutex<HashMap<WindowId, Duration>>,
    /// Taken on shutdown so the outward stream closes
    outward: Mutex<Option<mpsc::UnboundedSender<PipelineEvent>>>,
    dispatcher: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl<C: CaptureSource> TrackingSession<C> {
    /// Build a session and spawn its dispatcher; must be called inside a tokio runtime
    pub fn start(source: Arc<C>, config: Config) -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let cache = Arc::new(FrameCache::new());
        let detector = Arc::new(AlertDetector::new(DetectorSettings::from(&config.alerts)));
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (outward_tx, outward_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let scheduler = CaptureScheduler::new(
            source,
            Arc::clone(&cache),
            internal_tx,
            SchedulerPolicy::from(&config.capture),
        );

        let dispatcher = Dispatcher {
            cache: Arc::clone(&cache),
            detector: Arc::clone(&detector),
            outward: outward_tx.clone(),
            emit_frame_events: config.alerts.emit_frame_events,
        };
        let handle = tokio::spawn(dispatcher.run(internal_rx, stop_rx));

        info!(
            filter = %config.title_filter,
            interval_ms = config.capture.interval_ms,
            "Tracking session started"
        );

        let session = Self {
            config,
            cache,
            scheduler,
            detector,
            pinned_intervals: Mutex::new(HashMap::new()),
            outward: Mutex::new(Some(outward_tx)),
            dispatcher: Mutex::new(Some((stop_tx, handle))),
        };
        (session, outward_rx)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn detector(&self) -> &AlertDetector {
        &self.detector
    }

    /// Whether the window passes the configured title filter
    pub fn matches(&self, window: &WindowInfo) -> bool {
        self.config.matches_title(&window.title)
    }

    /// Capture interval for a window: its pinned interval, else by focus state
    pub fn interval_for(&self, window: &WindowInfo) -> Duration {
        if let Some(pinned) = self.pinned_intervals.lock().get(&window.id) {
            return *pinned;
        }
        if window.active && !window.minimized {
            self.config.capture.interval()
        } else {
            self.config.capture.inactive_interval()
        }
    }

    /// Bring the tracked set in line with a fresh enumeration snapshot
    pub async fn reconcile(&self, snapshot: &[WindowInfo]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let wanted: Vec<&WindowInfo> = snapshot.iter().filter(|window| self.matches(window)).collect();

        for tracked in self.scheduler.windows() {
            if !wanted.iter().any(|window| window.id == tracked.id) {
                self.untrack(tracked.id).await;
                report.removed.push(tracked.id);
            }
        }

        for window in wanted {
            if self.track(window) {
                report.added.push(window.id);
            } else if self.scheduler.update_window(window) {
                self.scheduler.set_interval(window.id, self.interval_for(window));
                self.detector
                    .set_thresholds(window.id, self.config.alerts.thresholds_for(&window.title));
                report.updated.push(window.id);
            }
        }

        if !report.is_empty() {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                tracked = self.scheduler.len(),
                cached = self.cache.len(),
                "Reconciled window list"
            );
        }
        report
    }

    /// Start tracking one window; false if already tracked or the session is shut down
    pub fn track(&self, window: &WindowInfo) -> bool {
        if self.scheduler.is_tracked(window.id) {
            return false;
        }
        let Some(outward) = self.outward.lock().clone() else {
            debug!(window = %window.id, "Session shut down, not tracking");
            return false;
        };

        self.detector.register_callback(window.id, move |event: &AlertEvent| {
            let _ = outward.send(PipelineEvent::Alert(event.clone()));
        });
        self.detector
            .set_thresholds(window.id, self.config.alerts.thresholds_for(&window.title));
        self.scheduler.track(window, self.interval_for(window))
    }

    pub async fn untrack(&self, window: WindowId) -> bool {
        let untracked = self.scheduler.untrack(window).await;
        self.detector.unregister(window);
        self.pinned_intervals.lock().remove(&window);
        untracked
    }

    /// Pin a window's capture interval so later reconcile passes keep it
    pub fn set_interval(&self, window: WindowId, interval: Duration) -> bool {
        if !self.scheduler.set_interval(window, interval) {
            return false;
        }
        self.pinned_intervals.lock().insert(window, interval);
        true
    }

    /// Drop a pinned interval; the focus-based interval applies from the next reconcile
    pub fn unpin_interval(&self, window: WindowId) -> bool {
        self.pinned_intervals.lock().remove(&window).is_some()
    }

    pub fn enable(&self, window: WindowId) -> bool {
        self.scheduler.enable(window)
    }

    pub fn latest(&self, window: WindowId) -> Option<Frame> {
        self.cache.latest(window)
    }

    pub fn windows(&self) -> Vec<TrackedWindow> {
        self.scheduler.windows()
    }

    pub fn status(&self) -> Vec<WindowStatus> {
        self.scheduler
            .windows()
            .into_iter()
            .map(|window| WindowStatus {
                last_sequence: self.cache.latest(window.id).map(|frame| frame.sequence),
                alert_level: self
                    .detector
                    .state(window.id)
                    .map(|state| state.level)
                    .unwrap_or_default(),
                id: window.id,
                title: window.title,
                geometry: window.geometry,
                interval_ms: window.interval.as_millis() as u64,
                enabled: window.enabled,
                consecutive_failures: window.consecutive_failures,
            })
            .collect()
    }

    /// Lay out `windows` over `screen` with the configured spacing
    pub fn compute_layout(
        &self,
        pattern: &GridPattern,
        windows: &[WindowId],
        screen: Rect,
    ) -> Result<LayoutAssignment, LayoutError> {
        layout::compute_layout(pattern, windows, screen, self.config.layout.spacing)
    }

    /// Stop every capture task, flush pending events and close the outward stream
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;

        let dispatcher = self.dispatcher.lock().take();
        if let Some((stop, handle)) = dispatcher {
            let _ = stop.send(());
            if let Err(e) = handle.await {
                error!(error = %e, "Event dispatcher task failed");
            }
        }

        self.detector.clear();
        self.pinned_intervals.lock().clear();
        self.outward.lock().take();
        info!("Tracking session shut down");
    }
}

struct Dispatcher {
    cache: Arc<FrameCache>,
    detector: Arc<AlertDetector>,
    outward: mpsc::UnboundedSender<PipelineEvent>,
    emit_frame_events: bool,
}

impl Dispatcher {
    async fn run(
        self,
        mut internal: mpsc::UnboundedReceiver<PipelineEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                event = internal.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                _ = &mut stop => {
                    while let Ok(event) = internal.try_recv() {
                        self.handle(event);
                    }
                    break;
                }
            }
        }
        debug!("Event dispatcher stopped");
    }

    fn handle(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::FrameAvailable { window, sequence } => {
                // Alerts reach the outward stream through the window's handler
                if let Some(frame) = self.cache.latest(window) {
                    self.detector.on_frame_update(&frame);
                }
                if self.emit_frame_events {
                    let _ = self.outward.send(PipelineEvent::FrameAvailable { window, sequence });
                }
            }
            other => {
                let _ = self.outward.send(other);
            }
        }
    }
}
