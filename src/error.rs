//! Error types for the speedgrid library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] is **fatal**: the run cannot proceed at all (invalid
//!   configuration, a coordinator task died). Returned as
//!   `Err(PipelineError)` from [`crate::Pipeline::run`].
//!
//! * [`JobError`] is **non-fatal**: a single image failed (fetch glitch,
//!   malformed bitmap, mis-segmented grid) but every other queued job is
//!   fine. Carried inside [`crate::output::JobOutcome::Failed`] so one bad
//!   image never aborts the worker pool.
//!
//! The stage-level errors ([`LayoutError`], [`RecognitionError`],
//! [`StoreError`]) are what the individual components return; the worker
//! wraps them into a [`JobError`] together with the provider identity.

use crate::job::DedupKey;
use thiserror::Error;

/// All fatal errors returned by the speedgrid library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// A coordinator task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single job.
///
/// Jobs are never retried: the same deterministic image would fail the same
/// way on a second attempt.
#[derive(Debug, Error)]
pub enum JobError {
    /// The image could not be downloaded.
    #[error("{key}: failed to fetch '{url}': {reason}")]
    Transport {
        key: DedupKey,
        url: String,
        reason: String,
    },

    /// The downloaded bytes are not a decodable image.
    #[error("{key}: failed to decode image from '{url}': {detail}")]
    Decode {
        key: DedupKey,
        url: String,
        detail: String,
    },

    /// Grid detection produced an unusable table layout.
    #[error("{key}: {source}")]
    Layout {
        key: DedupKey,
        #[source]
        source: LayoutError,
    },

    /// The recognition engine could not be used.
    #[error("{key}: {source}")]
    Recognition {
        key: DedupKey,
        #[source]
        source: RecognitionError,
    },

    /// The latest stored timestamp could not be looked up.
    #[error("{key}: store lookup failed: {source}")]
    Store {
        key: DedupKey,
        #[source]
        source: StoreError,
    },

    /// Extraction exceeded the configured per-job deadline.
    #[error("{key}: extraction timed out after {secs}s")]
    Timeout { key: DedupKey, secs: u64 },

    /// A blocking stage panicked.
    #[error("{key}: internal error: {detail}")]
    Internal { key: DedupKey, detail: String },
}

impl JobError {
    /// The provider pair this failure belongs to.
    pub fn key(&self) -> &DedupKey {
        match self {
            JobError::Transport { key, .. }
            | JobError::Decode { key, .. }
            | JobError::Layout { key, .. }
            | JobError::Recognition { key, .. }
            | JobError::Store { key, .. }
            | JobError::Timeout { key, .. }
            | JobError::Internal { key, .. } => key,
        }
    }
}

/// The detected grid does not describe a supported table.
///
/// Never corrected by guessing: a wrong column count means the detector
/// mis-segmented the image, and any data read from it would be misaligned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("too few table borders: {horizontal} horizontal, {vertical} vertical (need 2 of each)")]
    TooFewLines { horizontal: usize, vertical: usize },

    #[error("unsupported column count {count} (expected 6, 7 or 8)")]
    UnsupportedColumnCount { count: usize },

    #[error("table has no data rows ({lines} horizontal borders)")]
    NoDataRows { lines: usize },
}

/// Failures of the external recognition engine.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// The engine could not be initialised (binary missing, bad install).
    #[error("recognition engine unavailable: {detail}")]
    EngineUnavailable { detail: String },

    /// Scratch-file I/O around an engine call failed.
    #[error("recognition I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The engine ran but reported an error for this region.
    #[error("recognition failed: {detail}")]
    EngineFailed { detail: String },
}

/// Failures reported by a [`crate::store::ResultStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> DedupKey {
        DedupKey::new("telecom", "FastProxy")
    }

    #[test]
    fn layout_error_display_names_provider() {
        let e = JobError::Layout {
            key: key(),
            source: LayoutError::UnsupportedColumnCount { count: 9 },
        };
        let msg = e.to_string();
        assert!(msg.contains("telecom -> FastProxy"), "got: {msg}");
        assert!(msg.contains("9"), "got: {msg}");
    }

    #[test]
    fn timeout_display() {
        let e = JobError::Timeout { key: key(), secs: 30 };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn key_accessor_covers_variants() {
        let e = JobError::Transport {
            key: key(),
            url: "http://x/img.png".into(),
            reason: "HTTP 404".into(),
        };
        assert_eq!(e.key(), &key());
    }

    #[test]
    fn too_few_lines_display() {
        let e = LayoutError::TooFewLines {
            horizontal: 40,
            vertical: 1,
        };
        assert!(e.to_string().contains("1 vertical"));
    }
}
