//! Capture scheduler
//!
//! Owns the arena of tracked windows and exactly one capture task per
//! window. Tasks run on the tokio runtime, so a slow or hung window never
//! delays the others. All mutation of `TrackedWindow` records goes through
//! this type (or the task it spawned for that window).

mod task;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use crate::backend::CaptureSource;
use crate::cache::FrameCache;
use crate::config::CaptureSettings;
use crate::constants::capture;
use crate::events::PipelineEvent;
use crate::types::{TrackedWindow, WindowId, WindowInfo};

use task::{CaptureTask, TaskControl};

/// Scheduler-wide behaviour shared by every capture task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerPolicy {
    pub capture_timeout: Duration,
    pub max_consecutive_failures: u32,
    pub backoff_ceiling: Duration,
    pub shutdown_grace: Duration,
}

impl From<&CaptureSettings> for SchedulerPolicy {
    fn from(settings: &CaptureSettings) -> Self {
        Self {
            capture_timeout: settings.timeout(),
            max_consecutive_failures: settings.max_consecutive_failures.max(1),
            backoff_ceiling: settings.backoff_ceiling(),
            shutdown_grace: settings.shutdown_grace(),
        }
    }
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self::from(&CaptureSettings::default())
    }
}

struct TaskEntry {
    record: Arc<Mutex<TrackedWindow>>,
    control: watch::Sender<TaskControl>,
    handle: JoinHandle<()>,
}

/// Keep intervals within what the capture path can sensibly honour
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(
        Duration::from_millis(capture::MIN_INTERVAL_MS),
        Duration::from_millis(capture::MAX_INTERVAL_MS),
    )
}

pub struct CaptureScheduler<C> {
    source: Arc<C>,
    cache: Arc<FrameCache>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    policy: SchedulerPolicy,
    tasks: Mutex<HashMap<WindowId, TaskEntry>>,
}

impl<C: CaptureSource> CaptureScheduler<C> {
    pub fn new(
        source: Arc<C>,
        cache: Arc<FrameCache>,
        events: mpsc::UnboundedSender<PipelineEvent>,
        policy: SchedulerPolicy,
    ) -> Self {
        Self {
            source,
            cache,
            events,
            policy,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> SchedulerPolicy {
        self.policy
    }

    /// Start monitoring a window; must be called inside a tokio runtime.
    /// Returns false (and only refreshes title/geometry) if already tracked.
    pub fn track(&self, window: &WindowInfo, interval: Duration) -> bool {
        let mut tasks = self.tasks.lock();
        if let Some(entry) = tasks.get(&window.id) {
            refresh_record(&entry.record, window);
            return false;
        }

        let interval = clamp_interval(interval);
        let record = Arc::new(Mutex::new(TrackedWindow::new(window, interval)));
        let (control, control_rx) = watch::channel(TaskControl {
            interval,
            stopped: false,
        });
        self.cache.insert_slot(window.id);

        let task = CaptureTask {
            window: window.id,
            source: Arc::clone(&self.source),
            cache: Arc::clone(&self.cache),
            record: Arc::clone(&record),
            control: control_rx,
            events: self.events.clone(),
            policy: self.policy,
        };
        let handle = tokio::spawn(task.run());

        info!(window = %window.id, title = %window.title, interval = ?interval, "Tracking window");
        tasks.insert(
            window.id,
            TaskEntry {
                record,
                control,
                handle,
            },
        );
        true
    }

    /// Stop monitoring a window, waiting up to the grace period for its task
    pub async fn untrack(&self, window: WindowId) -> bool {
        let Some(entry) = self.tasks.lock().remove(&window) else {
            return false;
        };
        self.cache.remove_slot(window);
        entry.control.send_modify(|control| control.stopped = true);

        let deadline = Instant::now() + self.policy.shutdown_grace;
        stop_task(window, entry, deadline).await;
        info!(window = %window, "Untracked window");
        true
    }

    /// Untrack every window, sharing one grace deadline
    pub async fn shutdown(&self) {
        let entries: Vec<_> = self.tasks.lock().drain().collect();
        if entries.is_empty() {
            return;
        }
        for (window, entry) in &entries {
            self.cache.remove_slot(*window);
            entry.control.send_modify(|control| control.stopped = true);
        }

        let deadline = Instant::now() + self.policy.shutdown_grace;
        let count = entries.len();
        for (window, entry) in entries {
            stop_task(window, entry, deadline).await;
        }
        info!(count, "Capture scheduler shut down");
    }

    pub fn set_interval(&self, window: WindowId, interval: Duration) -> bool {
        let tasks = self.tasks.lock();
        let Some(entry) = tasks.get(&window) else {
            return false;
        };
        let interval = clamp_interval(interval);
        {
            let mut record = entry.record.lock();
            if record.interval == interval {
                return true;
            }
            record.interval = interval;
        }
        entry.control.send_modify(|control| control.interval = interval);
        debug!(window = %window, interval = ?interval, "Capture interval changed");
        true
    }

    /// Re-enable a disabled window and clear its failure count
    pub fn enable(&self, window: WindowId) -> bool {
        let tasks = self.tasks.lock();
        let Some(entry) = tasks.get(&window) else {
            return false;
        };
        {
            let mut record = entry.record.lock();
            record.enabled = true;
            record.consecutive_failures = 0;
        }
        entry.control.send_modify(|_| {});
        info!(window = %window, "Capture enabled");
        true
    }

    /// Park a window's task without untracking it
    pub fn disable(&self, window: WindowId) -> bool {
        let tasks = self.tasks.lock();
        let Some(entry) = tasks.get(&window) else {
            return false;
        };
        entry.record.lock().enabled = false;
        entry.control.send_modify(|_| {});
        info!(window = %window, "Capture disabled by request");
        true
    }

    /// Refresh title/geometry from a newer enumeration snapshot
    pub fn update_window(&self, window: &WindowInfo) -> bool {
        match self.tasks.lock().get(&window.id) {
            Some(entry) => {
                refresh_record(&entry.record, window);
                true
            }
            None => false,
        }
    }

    pub fn window(&self, window: WindowId) -> Option<TrackedWindow> {
        self.tasks
            .lock()
            .get(&window)
            .map(|entry| entry.record.lock().clone())
    }

    /// Snapshot of every tracked window, ordered by id
    pub fn windows(&self) -> Vec<TrackedWindow> {
        let mut windows: Vec<_> = self
            .tasks
            .lock()
            .values()
            .map(|entry| entry.record.lock().clone())
            .collect();
        windows.sort_by_key(|window| window.id);
        windows
    }

    pub fn is_tracked(&self, window: WindowId) -> bool {
        self.tasks.lock().contains_key(&window)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn refresh_record(record: &Mutex<TrackedWindow>, window: &WindowInfo) {
    let mut record = record.lock();
    record.title.clone_from(&window.title);
    record.geometry = window.geometry;
}

async fn stop_task(window: WindowId, entry: TaskEntry, deadline: Instant) {
    let TaskEntry {
        control,
        mut handle,
        ..
    } = entry;
    match timeout_at(deadline, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(window = %window, error = %e, "Capture task failed"),
        Err(_) => {
            warn!(window = %window, "Capture task did not stop within grace period, aborting");
            handle.abort();
        }
    }
    drop(control);
}
