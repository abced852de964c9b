//! Typed notifications flowing out of the pipeline

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::alert::AlertLevel;
use crate::error::CaptureError;
use crate::types::WindowId;

/// A classified alert emitted by the detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub window: WindowId,
    pub level: AlertLevel,
    /// Wall-clock capture time of the frame that raised the alert
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Alert(AlertEvent),
    /// The window was disabled; emitted once per disable
    CaptureFailed {
        window: WindowId,
        reason: CaptureError,
        consecutive_failures: u32,
    },
    FrameAvailable {
        window: WindowId,
        sequence: u64,
    },
}

impl PipelineEvent {
    pub fn window(&self) -> WindowId {
        match self {
            PipelineEvent::Alert(alert) => alert.window,
            PipelineEvent::CaptureFailed { window, .. } | PipelineEvent::FrameAvailable { window, .. } => *window,
        }
    }
}
