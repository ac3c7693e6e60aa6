//! Region-targeted recognition of table cells.
//!
//! Recognition dominates the cost of a job, so the reader keeps engine
//! invocations to a minimum:
//!
//! - The group column repeats one value for the whole table. It is read once,
//!   from the first data row, and replicated.
//! - Every other column is first read as one block (one call per column) and
//!   split on line breaks. When the line count does not match the number of
//!   data rows the block result is discarded and the column is read again
//!   cell by cell.
//!
//! Crops are inset by a pixel or two so border ink does not reach the engine.

use crate::engine::OcrEngine;
use crate::error::LayoutError;
use crate::output::RawCell;
use crate::pipeline::grid::GridLines;
use crate::pipeline::schema::{ColumnSchema, ColumnTag};
use crate::recognition::{RecognitionConfig, RecognitionRegistry, Segmentation};
use image::{imageops, GrayImage};
use tracing::{debug, warn};

/// Reads the data cells of a detected table.
pub struct CellReader<'a> {
    registry: &'a RecognitionRegistry,
    inset: u32,
}

impl<'a> CellReader<'a> {
    pub fn new(registry: &'a RecognitionRegistry, inset: u32) -> Self {
        Self { registry, inset }
    }

    /// Read every data cell of `gray` laid out by `grid`.
    ///
    /// Cells come back ordered column by column. A cell the engine fails on
    /// is an empty string; only a grid without data rows is an error.
    pub fn read<E: OcrEngine + ?Sized>(
        &self,
        engine: &mut E,
        gray: &GrayImage,
        grid: &GridLines,
        schema: &ColumnSchema,
    ) -> Result<Vec<RawCell>, LayoutError> {
        let rows = grid.data_row_count();
        if rows == 0 {
            return Err(LayoutError::NoDataRows {
                lines: grid.rows.len(),
            });
        }

        let mut cells = Vec::with_capacity(rows * schema.len());
        for (col, tag) in schema.iter() {
            let texts = if tag == ColumnTag::Group {
                let value = self.read_cell(engine, gray, grid, 0, col, tag);
                vec![value; rows]
            } else {
                match self.read_column(engine, gray, grid, col, tag) {
                    Some(lines) => lines,
                    None => (0..rows)
                        .map(|row| self.read_cell(engine, gray, grid, row, col, tag))
                        .collect(),
                }
            };
            cells.extend(texts.into_iter().enumerate().map(|(row, text)| RawCell {
                row_index: row,
                col_index: col,
                text,
            }));
        }
        Ok(cells)
    }

    /// Block read of a whole column; `None` when it cannot be trusted.
    fn read_column<E: OcrEngine + ?Sized>(
        &self,
        engine: &mut E,
        gray: &GrayImage,
        grid: &GridLines,
        col: usize,
        tag: ColumnTag,
    ) -> Option<Vec<String>> {
        let rows = grid.data_row_count();
        let (x0, x1) = grid.column_span(col);
        let top = grid.data_row_span(0).0;
        let bottom = grid.data_row_span(rows - 1).1;
        let region = crop(gray, x0, x1, top, bottom, self.inset);

        let config = self
            .registry
            .for_column(tag)
            .with_segmentation(Segmentation::Block);
        let text = match engine.recognize(&region, &config) {
            Ok(text) => text,
            Err(e) => {
                warn!("column {tag}: block read failed ({e}), reading cells");
                return None;
            }
        };

        let lines: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if lines.len() != rows {
            warn!(
                "column {tag}: block read gave {} lines for {} rows, reading cells",
                lines.len(),
                rows
            );
            return None;
        }
        debug!("column {tag}: block read ok");
        Some(lines)
    }

    fn read_cell<E: OcrEngine + ?Sized>(
        &self,
        engine: &mut E,
        gray: &GrayImage,
        grid: &GridLines,
        row: usize,
        col: usize,
        tag: ColumnTag,
    ) -> String {
        let (x0, x1) = grid.column_span(col);
        let (y0, y1) = grid.data_row_span(row);
        let region = crop(gray, x0, x1, y0, y1, self.inset);
        let config: &RecognitionConfig = self.registry.for_column(tag);
        match engine.recognize(&region, config) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("cell ({row}, {tag}): recognition failed: {e}");
                String::new()
            }
        }
    }
}

/// Copy `[x0, x1) × [y0, y1)` out of `gray`, shrunk by `inset` on every side
/// when the region is large enough, clipped to the image.
pub(crate) fn crop(gray: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32, inset: u32) -> GrayImage {
    let (x0, x1) = shrink(x0, x1, inset);
    let (y0, y1) = shrink(y0, y1, inset);
    let x1 = x1.min(gray.width());
    let y1 = y1.min(gray.height());
    let w = x1.saturating_sub(x0);
    let h = y1.saturating_sub(y0);
    imageops::crop_imm(gray, x0, y0, w, h).to_image()
}

fn shrink(lo: u32, hi: u32, inset: u32) -> (u32, u32) {
    if hi > lo + 2 * inset {
        (lo + inset, hi - inset)
    } else {
        (lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecognitionError;
    use image::Luma;

    /// Answers block reads with `block_lines` lines and cell reads with the
    /// crop width; records every call.
    struct CountingEngine {
        block_lines: usize,
        fail_cells: bool,
        calls: Vec<(Segmentation, u32, u32)>,
    }

    impl CountingEngine {
        fn new(block_lines: usize) -> Self {
            Self {
                block_lines,
                fail_cells: false,
                calls: Vec::new(),
            }
        }

        fn count(&self, seg: Segmentation) -> usize {
            self.calls.iter().filter(|c| c.0 == seg).count()
        }
    }

    impl OcrEngine for CountingEngine {
        fn recognize(
            &mut self,
            image: &GrayImage,
            config: &RecognitionConfig,
        ) -> Result<String, RecognitionError> {
            self.calls
                .push((config.segmentation, image.width(), image.height()));
            match config.segmentation {
                Segmentation::Block => Ok(vec!["12.34"; self.block_lines].join("\n\n")),
                Segmentation::SingleLine if self.fail_cells => Err(RecognitionError::EngineFailed {
                    detail: "boom".into(),
                }),
                Segmentation::SingleLine => Ok(format!(" w{} \n", image.width())),
            }
        }
    }

    /// 3 data rows, 6 columns of width 50.
    fn small_grid() -> GridLines {
        GridLines {
            rows: vec![0, 30, 60, 90, 120, 150, 180, 210],
            cols: vec![0, 50, 100, 150, 200, 250, 300],
        }
    }

    fn blank() -> GrayImage {
        GrayImage::from_pixel(301, 211, Luma([255]))
    }

    #[test]
    fn block_reads_cover_columns_and_group_is_read_once() {
        let registry = RecognitionRegistry::default();
        let reader = CellReader::new(&registry, 1);
        let schema = ColumnSchema::resolve(6).unwrap();
        let mut engine = CountingEngine::new(3);

        let cells = reader
            .read(&mut engine, &blank(), &small_grid(), &schema)
            .unwrap();

        assert_eq!(cells.len(), 18);
        assert_eq!(engine.count(Segmentation::SingleLine), 1);
        assert_eq!(engine.count(Segmentation::Block), 5);
        let group: Vec<&str> = cells
            .iter()
            .filter(|c| c.col_index == 0)
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(group, vec!["w48"; 3]);
        assert!(cells
            .iter()
            .filter(|c| c.col_index > 0)
            .all(|c| c.text == "12.34"));
        // block crop spans all three data rows minus the inset
        assert!(engine
            .calls
            .iter()
            .any(|c| *c == (Segmentation::Block, 48, 88)));
    }

    #[test]
    fn line_count_mismatch_falls_back_to_cells() {
        let registry = RecognitionRegistry::default();
        let reader = CellReader::new(&registry, 1);
        let schema = ColumnSchema::resolve(6).unwrap();
        let mut engine = CountingEngine::new(2);

        let cells = reader
            .read(&mut engine, &blank(), &small_grid(), &schema)
            .unwrap();

        assert_eq!(cells.len(), 18);
        assert_eq!(engine.count(Segmentation::Block), 5);
        assert_eq!(engine.count(Segmentation::SingleLine), 1 + 5 * 3);
        let last = cells
            .iter()
            .find(|c| c.col_index == 5 && c.row_index == 2)
            .unwrap();
        assert_eq!(last.text, "w48");
    }

    #[test]
    fn failed_cells_become_empty() {
        let registry = RecognitionRegistry::default();
        let reader = CellReader::new(&registry, 1);
        let schema = ColumnSchema::resolve(6).unwrap();
        let mut engine = CountingEngine::new(0);
        engine.fail_cells = true;

        let cells = reader
            .read(&mut engine, &blank(), &small_grid(), &schema)
            .unwrap();
        assert_eq!(cells.len(), 18);
        assert!(cells.iter().all(|c| c.text.is_empty()));
    }

    #[test]
    fn grid_without_data_rows_is_rejected() {
        let registry = RecognitionRegistry::default();
        let reader = CellReader::new(&registry, 1);
        let schema = ColumnSchema::resolve(6).unwrap();
        let grid = GridLines {
            rows: vec![0, 30, 60, 90, 120],
            cols: small_grid().cols,
        };
        let err = reader
            .read(&mut CountingEngine::new(0), &blank(), &grid, &schema)
            .unwrap_err();
        assert_eq!(err, LayoutError::NoDataRows { lines: 5 });
    }

    #[test]
    fn crop_clips_and_insets() {
        let g = GrayImage::new(100, 40);
        assert_eq!(crop(&g, 10, 20, 0, 30, 1).dimensions(), (8, 28));
        assert_eq!(crop(&g, 90, 120, 30, 50, 1).dimensions(), (9, 9));
        // too narrow to inset
        assert_eq!(crop(&g, 10, 12, 0, 2, 1).dimensions(), (2, 2));
    }
}
