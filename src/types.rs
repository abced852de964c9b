//! Core value types shared by the capture pipeline and the layout calculator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Opaque window handle handed out by the window manager (an X11 XID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u32> for WindowId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Screen-space rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width as i32)
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height as i32)
    }

    /// True when `other` lies entirely inside `self` (edges may touch)
    pub fn contains(&self, other: &Rect) -> bool {
        other.left() >= self.left()
            && other.top() >= self.top()
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// True when the two rectangles share any interior pixel
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// One entry of a point-in-time window enumeration snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    pub geometry: Rect,
    pub minimized: bool,
    pub active: bool,
}

/// Scheduler-owned record for a window under active monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedWindow {
    pub id: WindowId,
    pub title: String,
    pub geometry: Rect,
    pub interval: Duration,
    pub enabled: bool,
    pub consecutive_failures: u32,
}

impl TrackedWindow {
    pub fn new(info: &WindowInfo, interval: Duration) -> Self {
        Self {
            id: info.id,
            title: info.title.clone(),
            geometry: info.geometry,
            interval,
            enabled: true,
            consecutive_failures: 0,
        }
    }
}

/// Byte order of a 4-byte-per-pixel image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// X11 ZPixmap on little-endian TrueColor visuals (alpha byte may be padding)
    Bgra8,
    Rgba8,
}

impl PixelFormat {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Byte offsets of (red, green, blue) within one pixel
    pub fn rgb_offsets(self) -> (usize, usize, usize) {
        match self {
            PixelFormat::Bgra8 => (2, 1, 0),
            PixelFormat::Rgba8 => (0, 1, 2),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("image buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
pub struct ImageSizeMismatch {
    pub width: u32,
    pub height: u32,
    pub expected: usize,
    pub actual: usize,
}

/// Raw captured pixels; the buffer length always matches the dimensions
#[derive(Clone, PartialEq, Eq)]
pub struct RawImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl RawImage {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, ImageSizeMismatch> {
        let expected = width as usize * height as usize * PixelFormat::BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(ImageSizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Image filled with a single RGB color
    pub fn solid(width: u32, height: u32, format: PixelFormat, rgb: [u8; 3]) -> Self {
        let (r, g, b) = format.rgb_offsets();
        let mut pixel = [0xFFu8; PixelFormat::BYTES_PER_PIXEL];
        pixel[r] = rgb[0];
        pixel[g] = rgb[1];
        pixel[b] = rgb[2];
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * PixelFormat::BYTES_PER_PIXEL)
            .collect();
        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// (r, g, b) of the pixel at `(x, y)`; caller keeps coordinates in bounds
    pub fn rgb_at(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let base = (y as usize * self.width as usize + x as usize) * PixelFormat::BYTES_PER_PIXEL;
        let (r, g, b) = self.format.rgb_offsets();
        (self.data[base + r], self.data[base + g], self.data[base + b])
    }

    /// Pixels converted to tightly packed RGB
    pub fn to_rgb8(&self) -> Vec<u8> {
        let (r, g, b) = self.format.rgb_offsets();
        self.data
            .chunks_exact(PixelFormat::BYTES_PER_PIXEL)
            .flat_map(|px| [px[r], px[g], px[b]])
            .collect()
    }
}

impl fmt::Debug for RawImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// One captured image of a tracked window; immutable once built
#[derive(Debug, Clone)]
pub struct Frame {
    pub window: WindowId,
    pub image: Arc<RawImage>,
    pub captured_at: Instant,
    pub wall_clock: SystemTime,
    pub sequence: u64,
}

impl Frame {
    pub fn new(window: WindowId, image: RawImage, sequence: u64) -> Self {
        Self::at(window, image, sequence, Instant::now())
    }

    pub fn at(window: WindowId, image: RawImage, sequence: u64, captured_at: Instant) -> Self {
        Self {
            window,
            image: Arc::new(image),
            captured_at,
            wall_clock: SystemTime::now(),
            sequence,
        }
    }
}
