//! Sampled pixel-change metrics between two frames

use crate::config::AlertThresholds;
use crate::types::RawImage;

use super::AlertLevel;

/// How pixels are sampled and what counts as a red flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSettings {
    /// Every Nth pixel on both axes is compared
    pub stride: u32,
    /// Minimum red channel increase for a red-flash sample
    pub red_rise_min: u8,
    /// Red must exceed both green and blue by this margin
    pub red_dominance: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeMetrics {
    /// Mean absolute RGB difference over the samples, 0..=1
    pub overall: f32,
    /// Fraction of samples that turned (more) dominantly red, 0..=1
    pub red_flash: f32,
    pub samples: u32,
}

/// Compare two frames; `None` when they are not comparable (size or format changed)
pub fn measure(previous: &RawImage, current: &RawImage, settings: &SampleSettings) -> Option<ChangeMetrics> {
    if previous.width() != current.width()
        || previous.height() != current.height()
        || previous.format() != current.format()
        || current.width() == 0
        || current.height() == 0
    {
        return None;
    }

    let stride = settings.stride.max(1) as usize;
    let mut samples: u32 = 0;
    let mut red_samples: u32 = 0;
    let mut total_delta: u64 = 0;

    for y in (0..current.height()).step_by(stride) {
        for x in (0..current.width()).step_by(stride) {
            let (pr, pg, pb) = previous.rgb_at(x, y);
            let (r, g, b) = current.rgb_at(x, y);

            total_delta += (r.abs_diff(pr) as u64) + (g.abs_diff(pg) as u64) + (b.abs_diff(pb) as u64);

            let rose = r > pr && r - pr >= settings.red_rise_min;
            let dominant = r.saturating_sub(g) >= settings.red_dominance
                && r.saturating_sub(b) >= settings.red_dominance;
            if rose && dominant {
                red_samples += 1;
            }
            samples += 1;
        }
    }

    let overall = total_delta as f64 / (samples as f64 * 3.0 * 255.0);
    Some(ChangeMetrics {
        overall: overall as f32,
        red_flash: red_samples as f32 / samples as f32,
        samples,
    })
}

/// Red flashes above the high threshold are High; other change above the
/// medium threshold is Medium. Both comparisons are strict.
pub fn classify(metrics: &ChangeMetrics, thresholds: &AlertThresholds) -> AlertLevel {
    if metrics.red_flash > thresholds.high {
        AlertLevel::High
    } else if metrics.overall > thresholds.medium {
        AlertLevel::Medium
    } else {
        AlertLevel::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    const SAMPLING: SampleSettings = SampleSettings {
        stride: 1,
        red_rise_min: 40,
        red_dominance: 50,
    };

    fn solid(rgb: [u8; 3]) -> RawImage {
        RawImage::solid(8, 8, PixelFormat::Bgra8, rgb)
    }

    /// Left half one color, right half another
    fn split(left: [u8; 3], right: [u8; 3]) -> RawImage {
        let mut data = Vec::new();
        for _y in 0..8 {
            for x in 0..8 {
                let [r, g, b] = if x < 4 { left } else { right };
                data.extend_from_slice(&[b, g, r, 0xFF]);
            }
        }
        RawImage::new(8, 8, PixelFormat::Bgra8, data).unwrap()
    }

    #[test]
    fn test_identical_frames_have_no_change() {
        let metrics = measure(&solid([10, 20, 30]), &solid([10, 20, 30]), &SAMPLING).unwrap();
        assert_eq!(metrics.overall, 0.0);
        assert_eq!(metrics.red_flash, 0.0);
        assert_eq!(metrics.samples, 64);
    }

    #[test]
    fn test_black_to_white_is_full_change() {
        let metrics = measure(&solid([0, 0, 0]), &solid([255, 255, 255]), &SAMPLING).unwrap();
        assert!((metrics.overall - 1.0).abs() < 1e-6);
        // White is not red-dominant
        assert_eq!(metrics.red_flash, 0.0);
        assert_eq!(
            classify(&metrics, &AlertThresholds { medium: 0.05, high: 0.10 }),
            AlertLevel::Medium
        );
    }

    #[test]
    fn test_bright_pink_is_not_red_dominant() {
        let metrics = measure(&solid([128, 128, 128]), &solid([255, 210, 210]), &SAMPLING).unwrap();
        assert_eq!(metrics.red_flash, 0.0);

        // Same rise with a real margin over green and blue
        let metrics = measure(&solid([128, 128, 128]), &solid([255, 200, 200]), &SAMPLING).unwrap();
        assert_eq!(metrics.red_flash, 1.0);
    }

    #[test]
    fn test_black_to_red_is_red_flash() {
        let metrics = measure(&solid([0, 0, 0]), &solid([220, 20, 20]), &SAMPLING).unwrap();
        assert_eq!(metrics.red_flash, 1.0);
        assert_eq!(
            classify(&metrics, &AlertThresholds { medium: 0.05, high: 0.10 }),
            AlertLevel::High
        );
    }

    #[test]
    fn test_red_fading_is_not_a_flash() {
        let metrics = measure(&solid([220, 20, 20]), &solid([0, 0, 0]), &SAMPLING).unwrap();
        assert_eq!(metrics.red_flash, 0.0);
        assert!(metrics.overall > 0.2);
        assert_eq!(
            classify(&metrics, &AlertThresholds { medium: 0.05, high: 0.10 }),
            AlertLevel::Medium
        );
    }

    #[test]
    fn test_small_red_rise_below_minimum_ignored() {
        let metrics = measure(&solid([180, 20, 20]), &solid([200, 20, 20]), &SAMPLING).unwrap();
        assert_eq!(metrics.red_flash, 0.0);
    }

    #[test]
    fn test_partial_red_flash_fraction() {
        let before = split([0, 0, 0], [0, 0, 0]);
        let after = split([0, 0, 0], [230, 10, 10]);
        let metrics = measure(&before, &after, &SAMPLING).unwrap();
        assert_eq!(metrics.red_flash, 0.5);
    }

    #[test]
    fn test_stride_reduces_samples() {
        let settings = SampleSettings { stride: 4, ..SAMPLING };
        let metrics = measure(&solid([0, 0, 0]), &solid([0, 0, 0]), &settings).unwrap();
        assert_eq!(metrics.samples, 4);
    }

    #[test]
    fn test_mismatched_frames_not_comparable() {
        let small = RawImage::solid(4, 4, PixelFormat::Bgra8, [0, 0, 0]);
        assert!(measure(&small, &solid([0, 0, 0]), &SAMPLING).is_none());

        let rgba = RawImage::solid(8, 8, PixelFormat::Rgba8, [0, 0, 0]);
        assert!(measure(&rgba, &solid([0, 0, 0]), &SAMPLING).is_none());
    }

    #[test]
    fn test_classify_thresholds_are_strict() {
        let thresholds = AlertThresholds { medium: 0.25, high: 0.5 };
        let at = |overall, red_flash| classify(&ChangeMetrics { overall, red_flash, samples: 1 }, &thresholds);

        assert_eq!(at(0.25, 0.0), AlertLevel::None);
        assert_eq!(at(0.26, 0.0), AlertLevel::Medium);
        assert_eq!(at(0.0, 0.5), AlertLevel::None);
        assert_eq!(at(0.3, 0.5), AlertLevel::Medium);
        assert_eq!(at(0.0, 0.51), AlertLevel::High);
    }
}
