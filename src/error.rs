//! Typed failures surfaced by the capture pipeline and the layout calculator

use std::time::Duration;

use crate::layout::LayoutAssignment;
use crate::types::{Rect, WindowId};

/// Why a single capture attempt failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("window no longer exists")]
    WindowGone,

    #[error("window temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("capture tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("capture failed: {0}")]
    Failed(String),
}

impl CaptureError {
    /// Fatal failures disable the window immediately instead of backing off
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied(_) | CaptureError::ToolUnavailable(_)
        )
    }
}

/// Layout computation failures; never silently truncated or clamped
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    /// More windows than the pattern has cells. `assignment` holds the
    /// placements that did fit, identical to a run without the extras.
    #[error("{} window(s) did not fit the layout", unplaced.len())]
    Overflow {
        assignment: LayoutAssignment,
        unplaced: Vec<WindowId>,
    },

    #[error("{} custom rect(s) lie outside the screen {screen}", offending.len())]
    InvalidCustomRect {
        screen: Rect,
        offending: Vec<(WindowId, Rect)>,
    },

    #[error("invalid layout pattern: {0}")]
    InvalidPattern(String),
}
