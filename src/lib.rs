//! # speedgrid
//!
//! Turn rendered speed-test result tables (PNG screenshots) into typed,
//! deduplicated rows.
//!
//! ## Why this crate?
//!
//! The published tables carry no machine-readable markup; the pixels are all
//! there is. This crate recovers the table grid from the image, reads every
//! column with recognition settings chosen for what that column can contain,
//! and normalizes the text into numbers and speeds. A cheap footer read
//! decides first whether an image is newer than what the store already holds,
//! so unchanged tables never pay for full extraction.
//!
//! ## Pipeline Overview
//!
//! ```text
//! (net_provider, provider, image)
//!  │
//!  ├─ 1. Intake     flatten provider tree, fetch + decode (spawn_blocking)
//!  ├─ 2. Metadata   footer timestamp, one recognition call
//!  ├─ 3. Dedup      skip unless newer than the store's latest
//!  ├─ 4. Grid       adaptive threshold, periodic rows, morphological columns
//!  ├─ 5. Cells      per-column block read, cell-by-cell fallback
//!  ├─ 6. Normalize  two-decimal numbers, unit-scaled speeds, free text
//!  └─ 7. Sink       single-writer insert into the result store
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use speedgrid::{job_stream, HttpFetcher, MemoryStore, Pipeline, PipelineConfig, ProviderNode};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::from_env()?;
//!     let fetcher = Arc::new(HttpFetcher::from_config(&config)?);
//!     let store = Arc::new(MemoryStore::new());
//!
//!     let tree = ProviderNode::Leaf {
//!         name: "FastProxy".into(),
//!         image_url: "https://example.com/result.png".into(),
//!     };
//!     let jobs = job_stream(tree.flatten("telecom"), fetcher);
//!
//!     let report = Pipeline::tesseract(config, store).run(jobs).await?;
//!     eprintln!("{} extracted, {} skipped", report.extracted, report.skipped);
//!     Ok(())
//! }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod recognition;
pub mod source;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GridConfig, PipelineConfig, PipelineConfigBuilder};
pub use coordinator::Pipeline;
pub use engine::{EngineFactory, OcrEngine, TesseractEngine, TesseractFactory};
pub use error::{JobError, LayoutError, PipelineError, RecognitionError, StoreError};
pub use job::{zero_timestamp, DedupKey, Job, Timestamp};
pub use output::{JobOutcome, PipelineReport, RawCell, ResultRow, ResultTable, SkipNotice};
pub use pipeline::grid::{GridDetector, GridLines};
pub use pipeline::schema::{ColumnSchema, ColumnTag};
pub use progress::{NoopObserver, PipelineObserver, SharedObserver};
pub use recognition::{RecognitionConfig, RecognitionRegistry, Segmentation};
pub use source::{job_stream, HttpFetcher, ImageEntry, ImageFetcher, ProviderNode};
pub use store::{MemoryStore, ResultStore};
pub use stream::OutcomeStream;
