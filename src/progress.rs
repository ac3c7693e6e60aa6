//! Observer trait for per-job pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as
//! workers move jobs through the dedup gate and extraction.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to metrics, a progress bar or a log without the
//! library knowing how the host application communicates. The trait is
//! `Send + Sync` because every worker and the sink call it concurrently.
//!
//! # Example
//!
//! ```rust
//! use speedgrid::{PipelineConfig, PipelineObserver};
//! use speedgrid::job::DedupKey;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Skips(AtomicUsize);
//!
//! impl PipelineObserver for Skips {
//!     fn on_job_skipped(&self, _key: &DedupKey) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .observer(Arc::new(Skips(AtomicUsize::new(0))) as Arc<dyn PipelineObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::job::DedupKey;
use crate::output::PipelineReport;
use std::sync::Arc;

/// Called by the coordinator as jobs progress.
///
/// All methods default to no-ops. Job events may arrive concurrently from
/// different workers; protect shared state accordingly.
pub trait PipelineObserver: Send + Sync {
    /// Called once before any job is pulled, with the worker count.
    fn on_pipeline_start(&self, workers: usize) {
        let _ = workers;
    }

    /// A worker picked up a job.
    fn on_job_start(&self, key: &DedupKey) {
        let _ = key;
    }

    /// The dedup gate dropped a job.
    fn on_job_skipped(&self, key: &DedupKey) {
        let _ = key;
    }

    /// A table was extracted.
    ///
    /// # Arguments
    /// * `rows`: number of data rows in the table
    fn on_job_extracted(&self, key: &DedupKey, rows: usize) {
        let _ = (key, rows);
    }

    /// A job failed; `error` is human-readable.
    fn on_job_failed(&self, key: &DedupKey, error: &str) {
        let _ = (key, error);
    }

    /// The sink committed a table.
    fn on_table_persisted(&self, key: &DedupKey) {
        let _ = key;
    }

    /// The sink could not commit a table.
    fn on_store_error(&self, key: &DedupKey, error: &str) {
        let _ = (key, error);
    }

    /// Called once after the sink drained.
    fn on_pipeline_complete(&self, report: &PipelineReport) {
        let _ = report;
    }
}

/// Observer that ignores every event. Used when none is configured.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// The type stored in [`crate::config::PipelineConfig`].
pub type SharedObserver = Arc<dyn PipelineObserver>;
