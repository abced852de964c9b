//! Application-wide constants
//!
//! Defaults and protocol values used across the pipeline, kept in one place
//! so config defaults and tests agree on them.

/// X11 protocol constants
pub mod x11 {
    /// Plane mask selecting every bit plane for GetImage
    pub const ALL_PLANES: u32 = u32::MAX;

    /// Maximum property length (in 32-bit units) requested for string properties
    pub const PROPERTY_MAX_LENGTH: u32 = 1024;

    /// Maximum number of client windows read from _NET_CLIENT_LIST
    pub const CLIENT_LIST_MAX_LENGTH: u32 = 4096;

    /// Depth of the TrueColor visuals GetImage is decoded for
    pub const TRUECOLOR_DEPTH: u8 = 24;

    /// ARGB visuals (compositing clients) share the same ZPixmap byte layout
    pub const ARGB_DEPTH: u8 = 32;
}

/// EVE Online window detection constants
pub mod eve {
    /// Prefix for EVE client window titles (followed by character name)
    pub const WINDOW_TITLE_PREFIX: &str = "EVE - ";

    /// Title filter applied to enumeration when the config has none
    pub const DEFAULT_TITLE_FILTER: &str = "EVE";
}

/// Capture scheduling defaults
pub mod capture {
    /// ~30 FPS for active windows
    pub const DEFAULT_INTERVAL_MS: u64 = 33;

    /// Resource-saving interval for inactive or minimized windows
    pub const DEFAULT_INACTIVE_INTERVAL_MS: u64 = 1000;

    /// Fastest interval the scheduler accepts (~60 FPS)
    pub const MIN_INTERVAL_MS: u64 = 16;

    /// Slowest interval the scheduler accepts
    pub const MAX_INTERVAL_MS: u64 = 60_000;

    /// Upper bound on a single capture call
    pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

    /// Consecutive failures before a window is disabled
    pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

    /// Backoff never waits longer than this between retries
    pub const DEFAULT_BACKOFF_CEILING_MS: u64 = 10_000;

    /// How long untrack waits for a task before aborting it
    pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 500;
}

/// Alert detection defaults
pub mod alerts {
    /// Mean RGB change (0..1) above which a frame counts as Medium activity
    pub const DEFAULT_MEDIUM_THRESHOLD: f32 = 0.05;

    /// Fraction of sampled pixels flashing red above which a frame is High
    pub const DEFAULT_HIGH_THRESHOLD: f32 = 0.10;

    /// Minimum time between two alert emissions for one window
    pub const DEFAULT_COOLDOWN_MS: u64 = 5000;

    /// Every Nth pixel on both axes is sampled
    pub const DEFAULT_SAMPLE_STRIDE: u32 = 4;

    /// Red channel rise that counts toward a red flash
    pub const DEFAULT_RED_RISE_MIN: u8 = 40;

    /// Margin by which red must exceed green and blue to be dominant
    pub const DEFAULT_RED_DOMINANCE: u8 = 50;
}

/// Layout defaults
pub mod layout {
    /// Gap between tiled windows and around the screen edge
    pub const DEFAULT_SPACING: u32 = 10;

    /// Share of the screen given to the main window in main-plus-sides
    pub const DEFAULT_MAIN_FRACTION: f32 = 0.7;

    /// Offset between consecutive cascaded windows
    pub const DEFAULT_CASCADE_STEP: i32 = 30;

    /// Cascaded windows take this share of the screen on each axis
    pub const CASCADE_SIZE_FRACTION: f32 = 0.6;
}

/// Configuration file location
pub mod config {
    /// Directory under the user's config dir
    pub const APP_DIR: &str = "eve-l-monitor";

    /// Config file name
    pub const FILENAME: &str = "config.json";
}

/// IPC socket constants
pub mod ipc {
    /// Socket path relative to the runtime (or cache) dir
    pub const SOCKET_PATH: &str = "eve-l-monitor/monitor.sock";

    /// Maximum message size (10 MB) to prevent memory exhaustion
    pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;
}
