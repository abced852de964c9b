//! IPC message types for daemon ↔ client communication

use serde::{Deserialize, Serialize};

use crate::events::{AlertEvent, PipelineEvent};
use crate::pipeline::WindowStatus;
use crate::types::WindowId;

/// Requests sent from a client to the `watch` daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum MonitorRequest {
    /// Health check
    Ping,

    /// Query every tracked window
    ListWindows,

    /// Change one window's capture interval
    SetInterval { window: WindowId, interval_ms: u64 },

    /// Re-enable a window disabled after repeated failures
    Enable { window: WindowId },

    /// Request graceful shutdown
    Shutdown,
}

/// Replies and unsolicited pipeline events sent to clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum MonitorMessage {
    /// Health check response
    Pong,

    /// Response to ListWindows
    Windows(Vec<WindowStatus>),

    Alert(AlertEvent),

    /// A window was disabled after its capture kept failing
    CaptureFailed {
        window: WindowId,
        reason: String,
        consecutive_failures: u32,
    },

    FrameAvailable { window: WindowId, sequence: u64 },

    /// Acknowledgment that request was processed
    Ready,

    /// Error occurred
    Error(String),
}

impl From<&PipelineEvent> for MonitorMessage {
    fn from(event: &PipelineEvent) -> Self {
        match event {
            PipelineEvent::Alert(alert) => MonitorMessage::Alert(alert.clone()),
            PipelineEvent::CaptureFailed {
                window,
                reason,
                consecutive_failures,
            } => MonitorMessage::CaptureFailed {
                window: *window,
                reason: reason.to_string(),
                consecutive_failures: *consecutive_failures,
            },
            PipelineEvent::FrameAvailable { window, sequence } => MonitorMessage::FrameAvailable {
                window: *window,
                sequence: *sequence,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;

    #[test]
    fn test_capture_failure_carries_reason_text() {
        let event = PipelineEvent::CaptureFailed {
            window: WindowId(3),
            reason: CaptureError::WindowGone,
            consecutive_failures: 5,
        };
        assert_eq!(
            MonitorMessage::from(&event),
            MonitorMessage::CaptureFailed {
                window: WindowId(3),
                reason: "window no longer exists".to_string(),
                consecutive_failures: 5,
            }
        );
    }

    #[test]
    fn test_request_json_shape() {
        let json = serde_json::to_string(&MonitorRequest::SetInterval {
            window: WindowId(42),
            interval_ms: 250,
        })
        .unwrap();
        assert_eq!(json, r#"{"SetInterval":{"window":42,"interval_ms":250}}"#);
        assert_eq!(serde_json::to_string(&MonitorRequest::Ping).unwrap(), r#""Ping""#);
    }
}
