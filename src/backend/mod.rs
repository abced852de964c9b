//! Window-manager collaborators
//!
//! The pipeline only talks to the outside world through these traits:
//! enumeration, screenshot acquisition and geometry application. The X11
//! implementation lives in [`x11`]; tests use in-memory fakes.

pub mod blocking;
pub mod x11;

use std::future::Future;

use crate::error::CaptureError;
use crate::layout::LayoutAssignment;
use crate::types::{RawImage, WindowId, WindowInfo};

/// Point-in-time snapshot of the window manager's client list
pub trait WindowEnumerator {
    fn list_windows(&self) -> anyhow::Result<Vec<WindowInfo>>;
}

/// Grabs the current pixels of one window
///
/// Called from each window's capture task; implementations must tolerate
/// concurrent calls for different windows. The scheduler bounds every call
/// with a timeout and drops the future when it expires, so blocking work
/// must not outlive that drop unnoticed; see [`blocking::BlockingCaptures`].
pub trait CaptureSource: Send + Sync + 'static {
    fn capture(&self, window: WindowId) -> impl Future<Output = Result<RawImage, CaptureError>> + Send;
}

/// Issues move/resize requests for a computed layout
pub trait GeometryApplier {
    fn apply(&self, assignment: &LayoutAssignment) -> anyhow::Result<()>;
}
