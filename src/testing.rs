//! Scriptable in-memory collaborators for unit tests

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::backend::CaptureSource;
use crate::error::CaptureError;
use crate::types::{PixelFormat, Rect, RawImage, WindowId, WindowInfo};

pub(crate) fn window_info(id: u32, title: &str) -> WindowInfo {
    WindowInfo {
        id: WindowId(id),
        title: title.to_string(),
        geometry: Rect::new(0, 0, 1280, 720),
        minimized: false,
        active: false,
    }
}

pub(crate) fn solid(rgb: [u8; 3]) -> RawImage {
    RawImage::solid(8, 8, PixelFormat::Bgra8, rgb)
}

enum Script {
    FailAlways(CaptureError),
    FailTimes(usize, CaptureError),
    Hang,
}

#[derive(Default)]
struct Recorded {
    scripts: HashMap<WindowId, Script>,
    images: HashMap<WindowId, VecDeque<RawImage>>,
    last_image: HashMap<WindowId, RawImage>,
    calls: HashMap<WindowId, usize>,
    spans: HashMap<WindowId, Vec<(Instant, Instant)>>,
}

enum Outcome {
    Image(RawImage),
    Fail(CaptureError),
    Hang,
}

/// Capture source whose per-window behaviour is scripted by the test
#[derive(Default)]
pub(crate) struct FakeCapture {
    latency: Duration,
    state: Mutex<Recorded>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_always(&self, window: WindowId, error: CaptureError) {
        self.state.lock().scripts.insert(window, Script::FailAlways(error));
    }

    pub fn fail_times(&self, window: WindowId, times: usize, error: CaptureError) {
        self.state.lock().scripts.insert(window, Script::FailTimes(times, error));
    }

    pub fn hang(&self, window: WindowId) {
        self.state.lock().scripts.insert(window, Script::Hang);
    }

    /// Queue images returned by successive captures; the last one repeats
    pub fn push_images(&self, window: WindowId, images: impl IntoIterator<Item = RawImage>) {
        self.state.lock().images.entry(window).or_default().extend(images);
    }

    pub fn calls(&self, window: WindowId) -> usize {
        self.state.lock().calls.get(&window).copied().unwrap_or(0)
    }

    /// (start, end) of every capture of the window, in start order
    pub fn spans(&self, window: WindowId) -> Vec<(Instant, Instant)> {
        let mut spans = self.state.lock().spans.get(&window).cloned().unwrap_or_default();
        spans.sort_by_key(|(start, _)| *start);
        spans
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, window: WindowId) -> Outcome {
        let mut state = self.state.lock();
        *state.calls.entry(window).or_default() += 1;

        match state.scripts.get_mut(&window) {
            Some(Script::FailAlways(error)) => return Outcome::Fail(error.clone()),
            Some(Script::Hang) => return Outcome::Hang,
            Some(Script::FailTimes(remaining, error)) if *remaining > 0 => {
                *remaining -= 1;
                return Outcome::Fail(error.clone());
            }
            _ => {}
        }

        let image = match state.images.get_mut(&window).and_then(VecDeque::pop_front) {
            Some(image) => image,
            None => state
                .last_image
                .get(&window)
                .cloned()
                .unwrap_or_else(|| solid([0, 0, 0])),
        };
        state.last_image.insert(window, image.clone());
        Outcome::Image(image)
    }
}

/// Records the span and in-flight count even when the capture future is dropped
struct InFlight<'a> {
    source: &'a FakeCapture,
    window: WindowId,
    started: Instant,
}

impl<'a> InFlight<'a> {
    fn enter(source: &'a FakeCapture, window: WindowId) -> Self {
        let now = source.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        source.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self {
            source,
            window,
            started: Instant::now(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.source.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.source
            .state
            .lock()
            .spans
            .entry(self.window)
            .or_default()
            .push((self.started, Instant::now()));
    }
}

impl CaptureSource for FakeCapture {
    fn capture(&self, window: WindowId) -> impl Future<Output = Result<RawImage, CaptureError>> + Send {
        async move {
            let _guard = InFlight::enter(self, window);
            let outcome = self.next_outcome(window);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            match outcome {
                Outcome::Image(image) => Ok(image),
                Outcome::Fail(error) => Err(error),
                Outcome::Hang => std::future::pending().await,
            }
        }
    }
}
