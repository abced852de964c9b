//! Grid layout geometry
//!
//! Pure functions mapping a pattern, an ordered window list and a screen
//! rectangle to per-window target rectangles. Nothing here touches the
//! window manager; applying the result is the caller's job.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::LayoutError;
use crate::types::{Rect, WindowId};

/// Edge along which the secondary windows of `MainPlusSides` are stacked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideEdge {
    Right,
    Bottom,
}

/// Rule for partitioning a screen rectangle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GridPattern {
    Grid { rows: u32, cols: u32 },
    /// All windows side by side (1 x K)
    Row,
    /// All windows stacked (K x 1)
    Column,
    MainPlusSides { main_fraction: f32, edge: SideEdge },
    Cascade { step_x: i32, step_y: i32, width: u32, height: u32 },
    Custom(Vec<(WindowId, Rect)>),
}

impl GridPattern {
    /// Smallest near-square grid holding `count` windows
    pub fn auto_grid(count: usize) -> Self {
        let count = count.max(1) as u32;
        let cols = (count as f64).sqrt().ceil() as u32;
        let rows = count.div_ceil(cols);
        GridPattern::Grid { rows, cols }
    }
}

/// Computed placements, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutAssignment {
    placements: Vec<(WindowId, Rect)>,
}

impl LayoutAssignment {
    pub fn rect_for(&self, window: WindowId) -> Option<Rect> {
        self.placements
            .iter()
            .find(|(id, _)| *id == window)
            .map(|(_, rect)| *rect)
    }

    pub fn placements(&self) -> &[(WindowId, Rect)] {
        &self.placements
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    fn push(&mut self, window: WindowId, rect: Rect) {
        self.placements.push((window, rect));
    }
}

impl IntoIterator for LayoutAssignment {
    type Item = (WindowId, Rect);
    type IntoIter = std::vec::IntoIter<(WindowId, Rect)>;

    fn into_iter(self) -> Self::IntoIter {
        self.placements.into_iter()
    }
}

/// Compute target rectangles for `windows` laid out by `pattern` over `screen`.
/// A window listed more than once is placed at its first position only.
pub fn compute_layout(
    pattern: &GridPattern,
    windows: &[WindowId],
    screen: Rect,
    spacing: u32,
) -> Result<LayoutAssignment, LayoutError> {
    let mut seen = HashSet::with_capacity(windows.len());
    let windows: Vec<WindowId> = windows.iter().copied().filter(|window| seen.insert(*window)).collect();
    let windows = windows.as_slice();

    match pattern {
        GridPattern::Grid { rows, cols } => grid(*rows, *cols, windows, screen, spacing),
        GridPattern::Row => {
            if windows.is_empty() {
                return Ok(LayoutAssignment::default());
            }
            grid(1, windows.len() as u32, windows, screen, spacing)
        }
        GridPattern::Column => {
            if windows.is_empty() {
                return Ok(LayoutAssignment::default());
            }
            grid(windows.len() as u32, 1, windows, screen, spacing)
        }
        GridPattern::MainPlusSides { main_fraction, edge } => {
            main_plus_sides(*main_fraction, *edge, windows, screen, spacing)
        }
        GridPattern::Cascade {
            step_x,
            step_y,
            width,
            height,
        } => Ok(cascade(*step_x, *step_y, *width, *height, windows, screen, spacing)),
        GridPattern::Custom(rects) => custom(rects, windows, screen),
    }
}

/// Split `total` pixels into `count` equal cells separated (and surrounded) by `spacing`
fn cell_span(total: u32, count: u32, spacing: u32) -> Option<u32> {
    let gaps = spacing.checked_mul(count.checked_add(1)?)?;
    let usable = total.checked_sub(gaps)?;
    let cell = usable / count;
    (cell > 0).then_some(cell)
}

fn grid(
    rows: u32,
    cols: u32,
    windows: &[WindowId],
    screen: Rect,
    spacing: u32,
) -> Result<LayoutAssignment, LayoutError> {
    if rows == 0 || cols == 0 {
        return Err(LayoutError::InvalidPattern(format!(
            "grid needs at least one row and column, got {rows}x{cols}"
        )));
    }
    let (Some(cell_w), Some(cell_h)) = (
        cell_span(screen.width, cols, spacing),
        cell_span(screen.height, rows, spacing),
    ) else {
        return Err(LayoutError::InvalidPattern(format!(
            "{rows}x{cols} grid with spacing {spacing} does not fit {screen}"
        )));
    };

    let capacity = (rows as usize).saturating_mul(cols as usize);
    let mut assignment = LayoutAssignment::default();
    for (index, window) in windows.iter().take(capacity).enumerate() {
        let row = (index / cols as usize) as i32;
        let col = (index % cols as usize) as i32;
        let step_x = (cell_w + spacing) as i32;
        let step_y = (cell_h + spacing) as i32;
        assignment.push(
            *window,
            Rect::new(
                screen.x + spacing as i32 + col * step_x,
                screen.y + spacing as i32 + row * step_y,
                cell_w,
                cell_h,
            ),
        );
    }

    overflow_check(assignment, windows)
}

fn overflow_check(
    assignment: LayoutAssignment,
    windows: &[WindowId],
) -> Result<LayoutAssignment, LayoutError> {
    if assignment.len() == windows.len() {
        return Ok(assignment);
    }
    let unplaced = windows
        .iter()
        .filter(|window| assignment.rect_for(**window).is_none())
        .copied()
        .collect();
    Err(LayoutError::Overflow {
        assignment,
        unplaced,
    })
}

fn main_plus_sides(
    main_fraction: f32,
    edge: SideEdge,
    windows: &[WindowId],
    screen: Rect,
    spacing: u32,
) -> Result<LayoutAssignment, LayoutError> {
    if !(main_fraction > 0.0 && main_fraction < 1.0) {
        return Err(LayoutError::InvalidPattern(format!(
            "main fraction must be between 0 and 1, got {main_fraction}"
        )));
    }
    let Some((first, rest)) = windows.split_first() else {
        return Ok(LayoutAssignment::default());
    };
    let invalid = || {
        LayoutError::InvalidPattern(format!(
            "main-plus-sides with {} window(s) and spacing {spacing} does not fit {screen}",
            windows.len()
        ))
    };

    let mut assignment = LayoutAssignment::default();
    let inset_w = cell_span(screen.width, 1, spacing).ok_or_else(invalid)?;
    let inset_h = cell_span(screen.height, 1, spacing).ok_or_else(invalid)?;
    let origin_x = screen.x + spacing as i32;
    let origin_y = screen.y + spacing as i32;

    if rest.is_empty() {
        assignment.push(*first, Rect::new(origin_x, origin_y, inset_w, inset_h));
        return Ok(assignment);
    }

    let count = rest.len() as u32;
    match edge {
        SideEdge::Right => {
            // Two columns share the width minus three gaps
            let gaps = spacing.checked_mul(3).ok_or_else(invalid)?;
            let usable = screen.width.checked_sub(gaps).ok_or_else(invalid)?;
            let main_w = (usable as f32 * main_fraction).floor() as u32;
            let side_w = usable - main_w;
            let side_h = cell_span(screen.height, count, spacing).ok_or_else(invalid)?;
            if main_w == 0 || side_w == 0 {
                return Err(invalid());
            }
            assignment.push(*first, Rect::new(origin_x, origin_y, main_w, inset_h));
            let side_x = origin_x + (main_w + spacing) as i32;
            for (index, window) in rest.iter().enumerate() {
                let y = origin_y + index as i32 * (side_h + spacing) as i32;
                assignment.push(*window, Rect::new(side_x, y, side_w, side_h));
            }
        }
        SideEdge::Bottom => {
            let gaps = spacing.checked_mul(3).ok_or_else(invalid)?;
            let usable = screen.height.checked_sub(gaps).ok_or_else(invalid)?;
            let main_h = (usable as f32 * main_fraction).floor() as u32;
            let side_h = usable - main_h;
            let side_w = cell_span(screen.width, count, spacing).ok_or_else(invalid)?;
            if main_h == 0 || side_h == 0 {
                return Err(invalid());
            }
            assignment.push(*first, Rect::new(origin_x, origin_y, inset_w, main_h));
            let side_y = origin_y + (main_h + spacing) as i32;
            for (index, window) in rest.iter().enumerate() {
                let x = origin_x + index as i32 * (side_w + spacing) as i32;
                assignment.push(*window, Rect::new(x, side_y, side_w, side_h));
            }
        }
    }
    Ok(assignment)
}

fn cascade(
    step_x: i32,
    step_y: i32,
    width: u32,
    height: u32,
    windows: &[WindowId],
    screen: Rect,
    spacing: u32,
) -> LayoutAssignment {
    let inset = spacing.min(screen.width / 2).min(screen.height / 2);
    let area = Rect::new(
        screen.x.saturating_add(inset as i32),
        screen.y.saturating_add(inset as i32),
        screen.width - inset * 2,
        screen.height - inset * 2,
    );
    let width = width.min(area.width);
    let height = height.min(area.height);
    // Last origin that still keeps the whole window inside the area
    let max_x = area.right().saturating_sub(width as i32).max(area.x);
    let max_y = area.bottom().saturating_sub(height as i32).max(area.y);

    let mut assignment = LayoutAssignment::default();
    for (index, window) in windows.iter().enumerate() {
        let offset = index as i32;
        let x = area.x.saturating_add(offset.saturating_mul(step_x)).clamp(area.x, max_x);
        let y = area.y.saturating_add(offset.saturating_mul(step_y)).clamp(area.y, max_y);
        assignment.push(*window, Rect::new(x, y, width, height));
    }
    assignment
}

fn custom(
    rects: &[(WindowId, Rect)],
    windows: &[WindowId],
    screen: Rect,
) -> Result<LayoutAssignment, LayoutError> {
    let offending: Vec<_> = rects
        .iter()
        .filter(|(window, rect)| windows.contains(window) && !screen.contains(rect))
        .copied()
        .collect();
    if !offending.is_empty() {
        return Err(LayoutError::InvalidCustomRect { screen, offending });
    }

    let mut assignment = LayoutAssignment::default();
    for window in windows {
        if let Some((_, rect)) = rects.iter().find(|(id, _)| id == window) {
            assignment.push(*window, *rect);
        }
    }
    overflow_check(assignment, windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Rect = Rect::new(0, 0, 1920, 1080);

    fn ids(count: u32) -> Vec<WindowId> {
        (1..=count).map(WindowId).collect()
    }

    fn assert_disjoint(assignment: &LayoutAssignment) {
        let rects = assignment.placements();
        for (i, (_, a)) in rects.iter().enumerate() {
            for (_, b) in &rects[i + 1..] {
                assert!(!a.overlaps(b), "{a} overlaps {b}");
            }
        }
    }

    #[test]
    fn test_grid_2x2_row_major() {
        let windows = ids(4);
        let layout = compute_layout(&GridPattern::Grid { rows: 2, cols: 2 }, &windows, SCREEN, 10).unwrap();

        let w = (1920 - 30) / 2;
        let h = (1080 - 30) / 2;
        assert_eq!(layout.rect_for(WindowId(1)), Some(Rect::new(10, 10, w, h)));
        assert_eq!(layout.rect_for(WindowId(2)), Some(Rect::new(20 + w as i32, 10, w, h)));
        assert_eq!(layout.rect_for(WindowId(3)), Some(Rect::new(10, 20 + h as i32, w, h)));
        assert_eq!(
            layout.rect_for(WindowId(4)),
            Some(Rect::new(20 + w as i32, 20 + h as i32, w, h))
        );
        assert_disjoint(&layout);
        for (_, rect) in layout.placements() {
            assert!(SCREEN.contains(rect));
        }
    }

    #[test]
    fn test_grid_overflow_reports_unplaced() {
        let pattern = GridPattern::Grid { rows: 2, cols: 2 };
        let fitted = compute_layout(&pattern, &ids(4), SCREEN, 10).unwrap();

        match compute_layout(&pattern, &ids(5), SCREEN, 10) {
            Err(LayoutError::Overflow { assignment, unplaced }) => {
                assert_eq!(unplaced, vec![WindowId(5)]);
                assert_eq!(assignment, fitted);
            }
            other => panic!("expected overflow, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_window_is_placed_once() {
        let pattern = GridPattern::Grid { rows: 2, cols: 2 };
        let windows = [WindowId(1), WindowId(2), WindowId(1), WindowId(3)];
        let layout = compute_layout(&pattern, &windows, SCREEN, 10).unwrap();
        let fitted = compute_layout(&pattern, &ids(3), SCREEN, 10).unwrap();
        assert_eq!(layout, fitted);

        // Duplicates do not count towards overflow either
        let single = GridPattern::Grid { rows: 1, cols: 1 };
        let layout = compute_layout(&single, &[WindowId(7), WindowId(7)], SCREEN, 0).unwrap();
        assert_eq!(layout.placements(), &[(WindowId(7), SCREEN)]);
    }

    #[test]
    fn test_grid_with_fewer_windows_leaves_cells_empty() {
        let layout = compute_layout(&GridPattern::Grid { rows: 2, cols: 3 }, &ids(2), SCREEN, 0).unwrap();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.rect_for(WindowId(1)), Some(Rect::new(0, 0, 640, 540)));
        assert_eq!(layout.rect_for(WindowId(2)), Some(Rect::new(640, 0, 640, 540)));
    }

    #[test]
    fn test_grid_respects_screen_origin() {
        let screen = Rect::new(1920, 100, 1000, 500);
        let layout = compute_layout(&GridPattern::Grid { rows: 1, cols: 2 }, &ids(2), screen, 0).unwrap();
        assert_eq!(layout.rect_for(WindowId(1)), Some(Rect::new(1920, 100, 500, 500)));
        assert_eq!(layout.rect_for(WindowId(2)), Some(Rect::new(2420, 100, 500, 500)));
    }

    #[test]
    fn test_grid_zero_dimension_is_invalid() {
        let result = compute_layout(&GridPattern::Grid { rows: 0, cols: 2 }, &ids(1), SCREEN, 10);
        assert!(matches!(result, Err(LayoutError::InvalidPattern(_))));
    }

    #[test]
    fn test_grid_spacing_too_large_is_invalid() {
        let result = compute_layout(&GridPattern::Grid { rows: 1, cols: 2 }, &ids(2), Rect::new(0, 0, 30, 30), 10);
        assert!(matches!(result, Err(LayoutError::InvalidPattern(_))));
    }

    #[test]
    fn test_row_and_column() {
        let row = compute_layout(&GridPattern::Row, &ids(3), SCREEN, 0).unwrap();
        assert_eq!(row.rect_for(WindowId(3)), Some(Rect::new(1280, 0, 640, 1080)));

        let column = compute_layout(&GridPattern::Column, &ids(3), SCREEN, 0).unwrap();
        assert_eq!(column.rect_for(WindowId(2)), Some(Rect::new(0, 360, 1920, 360)));

        assert!(compute_layout(&GridPattern::Row, &[], SCREEN, 10).unwrap().is_empty());
    }

    #[test]
    fn test_main_plus_sides_right() {
        let pattern = GridPattern::MainPlusSides {
            main_fraction: 0.75,
            edge: SideEdge::Right,
        };
        let layout = compute_layout(&pattern, &ids(3), SCREEN, 10).unwrap();

        // 1920 - 3*10 = 1890 usable; main gets floor(1890 * 0.75)
        let main = layout.rect_for(WindowId(1)).unwrap();
        assert_eq!(main, Rect::new(10, 10, 1417, 1060));

        let side_h = (1080 - 30) / 2;
        assert_eq!(layout.rect_for(WindowId(2)), Some(Rect::new(1437, 10, 473, side_h)));
        assert_eq!(
            layout.rect_for(WindowId(3)),
            Some(Rect::new(1437, 20 + side_h as i32, 473, side_h))
        );
        assert_disjoint(&layout);
        assert_eq!(layout.rect_for(WindowId(2)).unwrap().right(), 1910);
    }

    #[test]
    fn test_main_plus_sides_bottom() {
        let pattern = GridPattern::MainPlusSides {
            main_fraction: 0.5,
            edge: SideEdge::Bottom,
        };
        let layout = compute_layout(&pattern, &ids(3), SCREEN, 0).unwrap();
        assert_eq!(layout.rect_for(WindowId(1)), Some(Rect::new(0, 0, 1920, 540)));
        assert_eq!(layout.rect_for(WindowId(2)), Some(Rect::new(0, 540, 960, 540)));
        assert_eq!(layout.rect_for(WindowId(3)), Some(Rect::new(960, 540, 960, 540)));
    }

    #[test]
    fn test_main_plus_sides_single_window_fills_inset() {
        let pattern = GridPattern::MainPlusSides {
            main_fraction: 0.7,
            edge: SideEdge::Right,
        };
        let layout = compute_layout(&pattern, &ids(1), SCREEN, 10).unwrap();
        assert_eq!(layout.rect_for(WindowId(1)), Some(Rect::new(10, 10, 1900, 1060)));
    }

    #[test]
    fn test_main_plus_sides_rejects_bad_fraction() {
        let pattern = GridPattern::MainPlusSides {
            main_fraction: 1.2,
            edge: SideEdge::Right,
        };
        assert!(matches!(
            compute_layout(&pattern, &ids(2), SCREEN, 10),
            Err(LayoutError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_huge_spacing_is_invalid_not_overflow() {
        let screen = Rect::new(0, 0, 3_000_000_000, 3_000_000_000);
        let pattern = GridPattern::MainPlusSides {
            main_fraction: 0.5,
            edge: SideEdge::Right,
        };
        assert!(matches!(
            compute_layout(&pattern, &ids(2), screen, 1_450_000_000),
            Err(LayoutError::InvalidPattern(_))
        ));
        assert!(matches!(
            compute_layout(&GridPattern::Grid { rows: 1, cols: 2 }, &ids(2), SCREEN, u32::MAX),
            Err(LayoutError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_cascade_extreme_steps_stay_on_screen() {
        let pattern = GridPattern::Cascade {
            step_x: i32::MAX,
            step_y: i32::MIN,
            width: 1000,
            height: 600,
        };
        let layout = compute_layout(&pattern, &ids(3), SCREEN, 10).unwrap();
        assert_eq!(layout.rect_for(WindowId(1)), Some(Rect::new(10, 10, 1000, 600)));
        assert_eq!(layout.rect_for(WindowId(3)), Some(Rect::new(910, 10, 1000, 600)));
    }

    #[test]
    fn test_cascade_offsets_and_clips() {
        let pattern = GridPattern::Cascade {
            step_x: 400,
            step_y: 300,
            width: 1000,
            height: 600,
        };
        let layout = compute_layout(&pattern, &ids(4), SCREEN, 10).unwrap();

        assert_eq!(layout.rect_for(WindowId(1)), Some(Rect::new(10, 10, 1000, 600)));
        assert_eq!(layout.rect_for(WindowId(2)), Some(Rect::new(410, 310, 1000, 600)));
        // Clamped so the window stays inside the inset screen
        assert_eq!(layout.rect_for(WindowId(3)), Some(Rect::new(810, 470, 1000, 600)));
        assert_eq!(layout.rect_for(WindowId(4)), Some(Rect::new(910, 470, 1000, 600)));
        for (_, rect) in layout.placements() {
            assert!(SCREEN.contains(rect));
        }
    }

    #[test]
    fn test_cascade_shrinks_oversized_windows() {
        let pattern = GridPattern::Cascade {
            step_x: 30,
            step_y: 30,
            width: 4000,
            height: 4000,
        };
        let layout = compute_layout(&pattern, &ids(2), SCREEN, 0).unwrap();
        assert_eq!(layout.rect_for(WindowId(2)), Some(SCREEN));
    }

    #[test]
    fn test_custom_valid() {
        let rects = vec![
            (WindowId(1), Rect::new(0, 0, 800, 600)),
            (WindowId(2), Rect::new(800, 0, 800, 600)),
        ];
        let layout = compute_layout(&GridPattern::Custom(rects), &ids(2), SCREEN, 10).unwrap();
        assert_eq!(layout.rect_for(WindowId(2)), Some(Rect::new(800, 0, 800, 600)));
    }

    #[test]
    fn test_custom_out_of_bounds_is_reported() {
        let bad = Rect::new(1800, 0, 200, 100);
        let rects = vec![(WindowId(1), Rect::new(0, 0, 100, 100)), (WindowId(2), bad)];
        match compute_layout(&GridPattern::Custom(rects), &ids(2), SCREEN, 0) {
            Err(LayoutError::InvalidCustomRect { screen, offending }) => {
                assert_eq!(screen, SCREEN);
                assert_eq!(offending, vec![(WindowId(2), bad)]);
            }
            other => panic!("expected invalid custom rect, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_missing_rect_is_unplaced() {
        let rects = vec![(WindowId(1), Rect::new(0, 0, 100, 100))];
        match compute_layout(&GridPattern::Custom(rects), &ids(2), SCREEN, 0) {
            Err(LayoutError::Overflow { assignment, unplaced }) => {
                assert_eq!(assignment.len(), 1);
                assert_eq!(unplaced, vec![WindowId(2)]);
            }
            other => panic!("expected overflow, got {other:?}"),
        }
    }

    #[test]
    fn test_auto_grid() {
        assert_eq!(GridPattern::auto_grid(1), GridPattern::Grid { rows: 1, cols: 1 });
        assert_eq!(GridPattern::auto_grid(3), GridPattern::Grid { rows: 2, cols: 2 });
        assert_eq!(GridPattern::auto_grid(5), GridPattern::Grid { rows: 2, cols: 3 });
        assert_eq!(GridPattern::auto_grid(9), GridPattern::Grid { rows: 3, cols: 3 });
        assert_eq!(GridPattern::auto_grid(0), GridPattern::Grid { rows: 1, cols: 1 });
    }
}
