//! Table-border detection.
//!
//! ## Why synthesize the horizontal lines?
//!
//! Rows in the rendered tables have a fixed pixel height, while glyphs in
//! adjacent cells often touch the row borders. Detecting horizontal rules
//! from pixel content merges rows whenever that happens; laying them out
//! every `row_height` pixels never does.
//!
//! ## Vertical lines
//!
//! Column borders are recovered from pixel content: after adaptive
//! binarization the image is inverted so ink is foreground, and a tall thin
//! morphological opening erases everything that is not a long vertical run.
//! Each pixel column is then scored by how many of the horizontal border
//! rows it crosses. Columns crossing more than `min_intersection_ratio` of
//! them are border candidates; adjacent candidates are collapsed into one.
//!
//! The right-most columns (average speed and UDP NAT type) are drawn with
//! coloured glyphs and faint borders and are routinely missed. A width
//! heuristic fills them in; see [`close_trailing_columns`].

use crate::config::GridConfig;
use crate::error::LayoutError;
use crate::pipeline::binarize;
use crate::pipeline::schema::ColumnSchema;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Pixel offsets of the horizontal and vertical table borders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLines {
    /// Y offsets of horizontal borders, strictly increasing.
    pub rows: Vec<u32>,
    /// X offsets of vertical borders, strictly increasing.
    pub cols: Vec<u32>,
}

impl GridLines {
    /// Number of columns between the vertical borders.
    pub fn column_count(&self) -> usize {
        self.cols.len().saturating_sub(1)
    }

    /// Number of table rows holding measurements.
    ///
    /// The first two bands are the title and the column header; the last two
    /// are the summary and the generation timestamp.
    pub fn data_row_count(&self) -> usize {
        self.rows.len().saturating_sub(5)
    }

    /// Vertical extent `[top, bottom)` of data row `i`.
    pub fn data_row_span(&self, i: usize) -> (u32, u32) {
        (self.rows[2 + i], self.rows[3 + i])
    }

    /// Horizontal extent `[left, right)` of column `j`.
    pub fn column_span(&self, j: usize) -> (u32, u32) {
        (self.cols[j], self.cols[j + 1])
    }
}

/// Locates table borders in a decoded image.
#[derive(Debug, Clone)]
pub struct GridDetector {
    config: GridConfig,
}

impl GridDetector {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    /// Detect the grid of a grayscale table image.
    ///
    /// # Errors
    /// [`LayoutError::TooFewLines`] when fewer than two horizontal or two
    /// vertical borders are found, [`LayoutError::UnsupportedColumnCount`]
    /// when the resulting column count is not 6, 7 or 8.
    pub fn detect(&self, gray: &GrayImage) -> Result<GridLines, LayoutError> {
        let cfg = &self.config;
        let (width, height) = gray.dimensions();

        let rows = horizontal_lines(height, cfg.row_height);

        let bin = binarize::adaptive_threshold(gray, cfg.threshold_block, cfg.threshold_offset);
        let ink = binarize::invert(&bin);
        let kernel = (height / cfg.row_height).max(1);
        let vertical = binarize::open_vertical(&ink, kernel);

        let candidates = score_columns(&vertical, &rows, cfg.min_intersection_ratio);
        let found = collapse_clusters(&candidates, cfg.min_column_gap);
        debug!(
            "grid: {} horizontal, {} candidate columns, {} after collapse",
            rows.len(),
            candidates.len(),
            found.len()
        );

        if rows.len() < 2 || found.len() < 2 {
            return Err(LayoutError::TooFewLines {
                horizontal: rows.len(),
                vertical: found.len(),
            });
        }

        let cols = close_trailing_columns(found, width, cfg);
        let grid = GridLines { rows, cols };
        ColumnSchema::resolve(grid.column_count())?;
        debug!("grid columns at {:?}", grid.cols);
        Ok(grid)
    }
}

/// One border every `row_height` pixels from the top, plus the bottom row.
fn horizontal_lines(height: u32, row_height: u32) -> Vec<u32> {
    if height == 0 {
        return Vec::new();
    }
    let mut rows: Vec<u32> = (0..height).step_by(row_height.max(1) as usize).collect();
    if rows.last() != Some(&(height - 1)) {
        rows.push(height - 1);
    }
    rows
}

/// Columns whose vertical-mask pixels intersect enough horizontal borders.
fn score_columns(vertical: &GrayImage, rows: &[u32], min_ratio: f32) -> Vec<u32> {
    let needed = rows.len() as f32 * min_ratio;
    (0..vertical.width())
        .filter(|&x| {
            let hits = rows
                .iter()
                .filter(|&&y| vertical.get_pixel(x, y)[0] != 0)
                .count();
            hits as f32 > needed
        })
        .collect()
}

/// Merge runs of candidates closer than `min_gap`, keeping the first of each.
fn collapse_clusters(candidates: &[u32], min_gap: u32) -> Vec<u32> {
    let mut kept = Vec::new();
    let mut prev: Option<u32> = None;
    for &x in candidates {
        match prev {
            Some(p) if x - p <= min_gap => {}
            _ => kept.push(x),
        }
        prev = Some(x);
    }
    kept
}

/// Fill in right-hand borders the detector tends to miss.
///
/// This is a calibration heuristic tuned to one rendering, not inferred
/// structure: while the gap to the right edge is wider than
/// `wide_trailing_gap`, a border is assumed `avg_speed_width` pixels after
/// the last one. If what remains is still wider than `avg_speed_width`, the
/// image's right edge closes the table.
///
/// Synthesized borders never reach past `width - 1`.
pub fn close_trailing_columns(mut cols: Vec<u32>, width: u32, cfg: &GridConfig) -> Vec<u32> {
    let Some(&first) = cols.last() else {
        return cols;
    };
    let edge = width.saturating_sub(1);
    let mut last = first;
    while cfg.avg_speed_width > 0 && width.saturating_sub(last) > cfg.wide_trailing_gap {
        let next = last.saturating_add(cfg.avg_speed_width);
        if next >= edge {
            break;
        }
        last = next;
        cols.push(last);
    }
    if width.saturating_sub(last) > cfg.avg_speed_width && edge > last {
        cols.push(edge);
    }
    cols
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// White table with 1px grey borders at `xs` and every 30 rows.
    fn table(width: u32, height: u32, xs: &[u32]) -> GrayImage {
        let mut g = GrayImage::from_pixel(width, height, Luma([255]));
        for &x in xs {
            for y in 0..height {
                g.put_pixel(x, y, Luma([128]));
            }
        }
        for y in (0..height).step_by(30) {
            for x in 0..width {
                g.put_pixel(x, y, Luma([128]));
            }
        }
        // glyph-like blobs inside cells
        for band in 1..(height / 30) {
            for w in xs.windows(2) {
                let x0 = w[0] + 10;
                for dy in 9..21 {
                    for dx in 0..8 {
                        if x0 + dx < w[1] {
                            g.put_pixel(x0 + dx, band * 30 + dy, Luma([40]));
                        }
                    }
                }
            }
        }
        g
    }

    #[test]
    fn detects_fifty_rows_and_eight_columns() {
        let xs = [5, 205, 305, 385, 465, 545, 645, 794];
        let g = table(800, 1471, &xs);
        let grid = GridDetector::new(GridConfig::default()).detect(&g).unwrap();
        assert_eq!(grid.rows.len(), 50);
        assert_eq!(grid.cols, xs.to_vec());
        assert_eq!(grid.column_count(), 7);
        assert_eq!(grid.data_row_count(), 45);
    }

    #[test]
    fn horizontal_lines_include_bottom_row_once() {
        assert_eq!(horizontal_lines(91, 30), vec![0, 30, 60, 90]);
        assert_eq!(horizontal_lines(100, 30), vec![0, 30, 60, 90, 99]);
        assert!(horizontal_lines(0, 30).is_empty());
    }

    #[test]
    fn collapse_keeps_first_of_each_cluster() {
        assert_eq!(
            collapse_clusters(&[4, 5, 6, 100, 101, 300], 10),
            vec![4, 100, 300]
        );
        // chained neighbours stay one cluster
        assert_eq!(collapse_clusters(&[0, 8, 16, 24, 60], 10), vec![0, 60]);
        assert!(collapse_clusters(&[], 10).is_empty());
    }

    #[test]
    fn trailing_columns_synthesized_for_wide_gap() {
        let cfg = GridConfig::default();
        let cols = close_trailing_columns(vec![0, 200, 505], 800, &cfg);
        assert_eq!(cols, vec![0, 200, 505, 595, 685, 799]);
    }

    #[test]
    fn trailing_columns_untouched_when_border_found() {
        let cfg = GridConfig::default();
        let cols = close_trailing_columns(vec![0, 400, 795], 800, &cfg);
        assert_eq!(cols, vec![0, 400, 795]);
    }

    #[test]
    fn trailing_columns_stay_inside_image() {
        let cfg = GridConfig {
            wide_trailing_gap: 100,
            avg_speed_width: 300,
            ..GridConfig::default()
        };
        let cols = close_trailing_columns(vec![5, 205, 545], 800, &cfg);
        assert_eq!(cols, vec![5, 205, 545]);
        assert!(cols.iter().all(|&x| x < 800));
    }

    #[test]
    fn zero_width_trailing_column_terminates() {
        let cfg = GridConfig {
            avg_speed_width: 0,
            ..GridConfig::default()
        };
        let cols = close_trailing_columns(vec![5, 205, 545], 800, &cfg);
        assert_eq!(cols, vec![5, 205, 545, 799]);
    }

    #[test]
    fn missing_right_borders_are_filled_in() {
        // avg-speed and NAT columns lost: last detected border at 545.
        let xs = [5, 205, 305, 385, 465, 545];
        let g = table(800, 1471, &xs);
        let grid = GridDetector::new(GridConfig::default()).detect(&g).unwrap();
        assert_eq!(grid.cols, vec![5, 205, 305, 385, 465, 545, 635, 799]);
    }

    #[test]
    fn blank_image_is_a_layout_error() {
        let g = GrayImage::from_pixel(400, 300, Luma([255]));
        let err = GridDetector::new(GridConfig::default()).detect(&g).unwrap_err();
        assert!(matches!(err, LayoutError::TooFewLines { vertical: 0, .. }));
    }

    #[test]
    fn unsupported_column_count_is_rejected() {
        let xs = [5, 100, 200, 300, 400, 794];
        let g = table(800, 611, &xs);
        let err = GridDetector::new(GridConfig::default()).detect(&g).unwrap_err();
        assert_eq!(err, LayoutError::UnsupportedColumnCount { count: 5 });
    }
}
