//! Extraction stages for one table image.
//!
//! Each submodule implements exactly one transformation step. Keeping the
//! stages separate makes each independently testable and keeps the engine
//! binding out of everything except the two readers.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──▶ metadata ──▶ (dedup gate)
//! image ─────┤
//!            └──▶ binarize ──▶ grid ──▶ schema ──▶ cells ──▶ normalize
//!                 (threshold)  (lines)  (6/7/8)   (OCR)     (typed rows)
//! ```
//!
//! 1. [`metadata`]: footer timestamp and title version, one crop each
//! 2. [`binarize`]: adaptive threshold and vertical morphology
//! 3. [`grid`]: horizontal and vertical border offsets
//! 4. [`schema`]: column count → column semantics
//! 5. [`cells`]: block-then-cell recognition per column
//! 6. [`normalize`]: raw text → numbers, speeds, text, timestamps

pub mod binarize;
pub mod cells;
pub mod grid;
pub mod metadata;
pub mod normalize;
pub mod schema;
