//! Per-window capture loop

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, error, info, warn};

use crate::backend::CaptureSource;
use crate::cache::{FrameCache, PublishOutcome};
use crate::error::CaptureError;
use crate::events::PipelineEvent;
use crate::types::{Frame, RawImage, TrackedWindow, WindowId};

use super::SchedulerPolicy;

/// Latest instructions from the scheduler to one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TaskControl {
    pub interval: Duration,
    pub stopped: bool,
}

pub(crate) struct CaptureTask<C> {
    pub window: WindowId,
    pub source: Arc<C>,
    pub cache: Arc<FrameCache>,
    pub record: Arc<Mutex<TrackedWindow>>,
    pub control: watch::Receiver<TaskControl>,
    pub events: mpsc::UnboundedSender<PipelineEvent>,
    pub policy: SchedulerPolicy,
}

impl<C: CaptureSource> CaptureTask<C> {
    pub async fn run(mut self) {
        debug!(window = %self.window, "Capture task started");
        let mut sequence: u64 = 0;
        let mut next_tick = Instant::now();

        loop {
            // Checkpoint: read control before the enabled flag so a concurrent
            // enable() is never missed
            let control = *self.control.borrow_and_update();
            if control.stopped {
                break;
            }

            if !self.record.lock().enabled {
                if self.control.changed().await.is_err() {
                    break;
                }
                next_tick = Instant::now();
                continue;
            }

            tokio::select! {
                _ = sleep_until(next_tick) => {}
                changed = self.control.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let interval = self.control.borrow().interval;
                    // A new interval applies right away unless we are backing off
                    if self.record.lock().consecutive_failures == 0 {
                        next_tick = next_tick.min(Instant::now() + interval);
                    }
                    continue;
                }
            }

            let result = self.capture_once().await;
            let TaskControl { interval, stopped } = *self.control.borrow();
            if stopped {
                break;
            }

            let now = Instant::now();
            match result {
                Ok(image) => {
                    sequence += 1;
                    if !self.publish(image, sequence, now) {
                        break;
                    }
                    next_tick = next_tick_after(next_tick, interval, now);
                }
                Err(reason) => {
                    next_tick = self.handle_failure(reason, interval, now);
                }
            }
        }

        debug!(window = %self.window, "Capture task stopped");
    }

    async fn capture_once(&self) -> Result<RawImage, CaptureError> {
        match timeout(self.policy.capture_timeout, self.source.capture(self.window)).await {
            Ok(result) => result,
            Err(_) => Err(CaptureError::Timeout(self.policy.capture_timeout)),
        }
    }

    /// Returns false when the window's cache slot is gone and the task should exit
    fn publish(&self, image: RawImage, sequence: u64, now: Instant) -> bool {
        let frame = Frame::at(self.window, image, sequence, now.into_std());
        match self.cache.publish(frame) {
            PublishOutcome::Stored => {}
            PublishOutcome::Untracked => return false,
            PublishOutcome::Stale => {
                warn!(window = %self.window, sequence, "Cache rejected frame as stale");
                return true;
            }
        }

        {
            let mut record = self.record.lock();
            if record.consecutive_failures > 0 {
                info!(
                    window = %self.window,
                    failures = record.consecutive_failures,
                    "Capture recovered"
                );
            }
            record.consecutive_failures = 0;
        }

        let _ = self.events.send(PipelineEvent::FrameAvailable {
            window: self.window,
            sequence,
        });
        true
    }

    /// Record a failure; returns the next tick (backoff) or parks the window
    fn handle_failure(&self, reason: CaptureError, interval: Duration, now: Instant) -> Instant {
        let failures = {
            let mut record = self.record.lock();
            record.consecutive_failures += 1;
            record.consecutive_failures
        };

        if reason.is_fatal() || failures >= self.policy.max_consecutive_failures {
            self.record.lock().enabled = false;
            error!(
                window = %self.window,
                failures,
                error = %reason,
                "Capture disabled for window"
            );
            let _ = self.events.send(PipelineEvent::CaptureFailed {
                window: self.window,
                reason,
                consecutive_failures: failures,
            });
            return now;
        }

        let delay = backoff_delay(interval, failures, self.policy.backoff_ceiling);
        if matches!(reason, CaptureError::Timeout(_)) {
            warn!(window = %self.window, failures, retry_in = ?delay, "Capture timed out");
        } else {
            debug!(window = %self.window, failures, error = %reason, retry_in = ?delay, "Capture failed, backing off");
        }
        now + delay
    }
}

/// Next tick strictly after `now`, keeping the original phase; missed ticks are skipped
pub(crate) fn next_tick_after(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let next = previous + interval;
    if next > now {
        return next;
    }
    let interval_ns = interval.as_nanos().max(1);
    let missed = now.duration_since(next).as_nanos() / interval_ns + 1;
    let skip = u64::try_from(missed * interval_ns).unwrap_or(u64::MAX);
    next + Duration::from_nanos(skip)
}

/// `interval * 2^failures`, capped at `ceiling`
pub(crate) fn backoff_delay(interval: Duration, failures: u32, ceiling: Duration) -> Duration {
    let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
    interval.checked_mul(factor).unwrap_or(ceiling).min(ceiling)
}
