//! Blocking capture workers with one outstanding grab per window
//!
//! A capture that times out only drops the future waiting on its
//! `spawn_blocking` worker; the worker itself keeps waiting on the window
//! manager. Its handle is parked here until it finishes, and further
//! captures for that window fail fast instead of piling up more workers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::CaptureError;
use crate::types::WindowId;

type Worker<T> = JoinHandle<Result<T, CaptureError>>;

pub struct BlockingCaptures<T> {
    outstanding: Arc<Mutex<HashMap<WindowId, Worker<T>>>>,
}

impl<T> Default for BlockingCaptures<T> {
    fn default() -> Self {
        Self {
            outstanding: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Send + 'static> BlockingCaptures<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `grab` on the blocking pool unless an abandoned grab for the same
    /// window is still running
    pub fn run<F>(&self, window: WindowId, grab: F) -> impl Future<Output = Result<T, CaptureError>> + Send + 'static
    where
        F: FnOnce() -> Result<T, CaptureError> + Send + 'static,
    {
        let outstanding = Arc::clone(&self.outstanding);
        async move {
            let handle = {
                let mut workers = outstanding.lock();
                if workers.get(&window).is_some_and(|worker| !worker.is_finished()) {
                    debug!(window = %window, "Previous capture still outstanding");
                    return Err(CaptureError::Unavailable(
                        "previous capture still outstanding".to_string(),
                    ));
                }
                // A finished abandoned grab holds an outdated image
                workers.remove(&window);
                tokio::task::spawn_blocking(grab)
            };

            let mut pending = Pending {
                outstanding,
                window,
                handle: Some(handle),
            };
            let joined = match pending.handle.as_mut() {
                Some(handle) => handle.await,
                None => return Err(CaptureError::Failed("capture worker missing".to_string())),
            };
            pending.handle = None;

            match joined {
                Ok(result) => result,
                Err(e) => Err(CaptureError::Failed(format!("capture worker failed: {e}"))),
            }
        }
    }

    /// Whether an abandoned grab for `window` is still running
    pub fn is_outstanding(&self, window: WindowId) -> bool {
        self.outstanding
            .lock()
            .get(&window)
            .is_some_and(|worker| !worker.is_finished())
    }
}

/// Parks the worker handle if the waiting future is dropped first
struct Pending<T> {
    outstanding: Arc<Mutex<HashMap<WindowId, Worker<T>>>>,
    window: WindowId,
    handle: Option<Worker<T>>,
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                self.outstanding.lock().insert(self.window, handle);
            }
        }
    }
}
