//! Configuration for eve-l-monitor
//!
//! A single JSON file holds capture, alert and layout settings. It is read
//! once and handed to the tracking session as an explicit value.

pub mod settings;

pub use settings::{AlertSettings, AlertThresholds, CaptureSettings, Config, LayoutSettings};
