//! One-shot capture of every matching window to PNG files

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::backend::CaptureSource;
use crate::constants::eve;
use crate::types::{RawImage, WindowInfo};

/// Encode as 8-bit RGB PNG
pub fn write_png<W: std::io::Write>(writer: W, image: &RawImage) -> Result<()> {
    let mut encoder = png::Encoder::new(writer, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().context("Failed to write PNG header")?;
    writer
        .write_image_data(&image.to_rgb8())
        .context("Failed to write PNG image data")?;
    writer.finish().context("Failed to finish PNG stream")?;
    Ok(())
}

/// File name for a window's snapshot: character name (or title) plus window id
pub fn snapshot_file_name(window: &WindowInfo) -> String {
    let name = window
        .title
        .strip_prefix(eve::WINDOW_TITLE_PREFIX)
        .unwrap_or(&window.title);
    let name: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let name = name.trim_matches('_');
    if name.is_empty() {
        format!("{}.png", window.id)
    } else {
        format!("{name}-{}.png", window.id)
    }
}

/// Capture each window once and write it under `out`; failed windows are skipped
pub async fn capture_all<C: CaptureSource>(
    source: &C,
    windows: &[WindowInfo],
    out: &Path,
    capture_timeout: Duration,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create snapshot directory {}", out.display()))?;

    let mut written = Vec::new();
    for window in windows {
        let image = match timeout(capture_timeout, source.capture(window.id)).await {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                warn!(window = %window.id, title = %window.title, error = %e, "Snapshot failed");
                continue;
            }
            Err(_) => {
                warn!(window = %window.id, title = %window.title, "Snapshot timed out");
                continue;
            }
        };

        let path = out.join(snapshot_file_name(window));
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        write_png(BufWriter::new(file), &image)
            .with_context(|| format!("Failed to encode snapshot {}", path.display()))?;
        info!(window = %window.id, path = %path.display(), "Snapshot written");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use crate::testing::{FakeCapture, window_info};
    use crate::types::{PixelFormat, WindowId};
    use std::io::Cursor;

    #[test]
    fn test_png_keeps_pixels() {
        let image = RawImage::solid(3, 2, PixelFormat::Bgra8, [200, 40, 10]);
        let mut bytes = Vec::new();
        write_png(&mut bytes, &image).unwrap();

        let decoder = png::Decoder::new(Cursor::new(bytes));
        let mut reader = decoder.read_info().unwrap();
        assert_eq!(reader.info().width, 3);
        assert_eq!(reader.info().height, 2);
        let mut buf = vec![0; 3 * 2 * 3];
        reader.next_frame(&mut buf).unwrap();
        assert_eq!(&buf[..3], &[200, 40, 10]);
    }

    #[test]
    fn test_file_name_from_character() {
        assert_eq!(snapshot_file_name(&window_info(0x10, "EVE - Alice")), "Alice-0x10.png");
        assert_eq!(snapshot_file_name(&window_info(0x11, "EVE - Bob Smith")), "Bob_Smith-0x11.png");
        assert_eq!(snapshot_file_name(&window_info(0x12, "EVE")), "EVE-0x12.png");
        assert_eq!(snapshot_file_name(&window_info(0x13, "///")), "0x13.png");
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_all_skips_failures() {
        let out = std::env::temp_dir().join(format!("eve-l-monitor-snapshot-{}", std::process::id()));
        let source = FakeCapture::new();
        source.fail_always(WindowId(2), CaptureError::WindowGone);
        source.hang(WindowId(3));

        let windows = [
            window_info(1, "EVE - Alice"),
            window_info(2, "EVE - Bob"),
            window_info(3, "EVE - Carol"),
        ];
        let written = capture_all(&source, &windows, &out, Duration::from_secs(1)).await.unwrap();

        assert_eq!(written, vec![out.join("Alice-0x1.png")]);
        assert!(written[0].exists());
        let _ = std::fs::remove_dir_all(&out);
    }
}
