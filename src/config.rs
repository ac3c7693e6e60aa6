//! Configuration types for table extraction.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Every knob lives in one struct so a run can
//! be logged, diffed against another run, and shared across worker tasks
//! behind an `Arc`.
//!
//! The pixel constants in [`GridConfig`] were measured on one table
//! rendering. Other renderings need them re-derived, which is why none of
//! them are hard-coded in the detector.

use crate::error::PipelineError;
use crate::progress::PipelineObserver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Threads a single recognition call may use. Tesseract runs up to four
/// OpenMP threads per process.
const DEFAULT_ENGINE_THREADS: usize = 4;

/// Geometry and threshold parameters of [`crate::pipeline::grid::GridDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Fixed height of one table row in pixels. Default: 30.
    pub row_height: u32,

    /// Neighbourhood size of the adaptive threshold (odd). Default: 11.
    pub threshold_block: u32,

    /// Constant subtracted from the neighbourhood mean. Default: 2.
    pub threshold_offset: i32,

    /// Fraction of horizontal borders a pixel column must cross to count as
    /// a vertical border. Default: 0.2.
    pub min_intersection_ratio: f32,

    /// Candidate columns at most this far apart collapse into one. Default: 10.
    pub min_column_gap: u32,

    /// Remaining width beyond the last border that triggers synthetic
    /// trailing columns. Default: 200.
    pub wide_trailing_gap: u32,

    /// Typical width of the average-speed column. Default: 90.
    pub avg_speed_width: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            row_height: 30,
            threshold_block: 11,
            threshold_offset: 2,
            min_intersection_ratio: 0.2,
            min_column_gap: 10,
            wide_trailing_gap: 200,
            avg_speed_width: 90,
        }
    }
}

/// Configuration for an extraction run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use speedgrid::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .workers(2)
///     .row_height(30)
///     .job_timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 2);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Number of concurrent extraction workers.
    ///
    /// Defaults to available CPUs divided by `engine_threads` (at least 1).
    /// Each recognition call already spreads over several threads, so one
    /// worker per CPU oversubscribes the machine and slows the run down.
    pub workers: usize,

    /// Threads each recognition engine may use. Default: 4.
    pub engine_threads: usize,

    /// Capacity of the job queue. Default: `workers`.
    ///
    /// Every queued job holds a fully decoded bitmap, so the producer is made
    /// to wait rather than buffer images without bound.
    pub queue_capacity: usize,

    /// Capacity of the outcome channel feeding the sink. Default: `2 × workers`.
    pub results_capacity: usize,

    /// Deadline for grid detection plus cell recognition of one job.
    /// Default: none.
    pub job_timeout_secs: Option<u64>,

    /// Grid detection parameters.
    pub grid: GridConfig,

    /// Pixels trimmed from every side of a crop so border lines are not
    /// handed to the engine. Default: 1.
    pub crop_inset: u32,

    /// Path or name of the `tesseract` executable. Default: `"tesseract"`.
    pub tesseract_binary: PathBuf,

    /// Tesseract language code of the local script. Default: `"chi_sim"`.
    pub local_language: String,

    /// Timeout for fetching one image, in seconds. Default: 60.
    pub fetch_timeout_secs: u64,

    /// Receives job lifecycle events.
    pub observer: Option<Arc<dyn PipelineObserver>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let workers = default_workers(DEFAULT_ENGINE_THREADS);
        Self {
            workers,
            engine_threads: DEFAULT_ENGINE_THREADS,
            queue_capacity: workers,
            results_capacity: workers * 2,
            job_timeout_secs: None,
            grid: GridConfig::default(),
            crop_inset: 1,
            tesseract_binary: PathBuf::from("tesseract"),
            local_language: "chi_sim".to_string(),
            fetch_timeout_secs: 60,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("workers", &self.workers)
            .field("engine_threads", &self.engine_threads)
            .field("queue_capacity", &self.queue_capacity)
            .field("results_capacity", &self.results_capacity)
            .field("job_timeout_secs", &self.job_timeout_secs)
            .field("grid", &self.grid)
            .field("crop_inset", &self.crop_inset)
            .field("tesseract_binary", &self.tesseract_binary)
            .field("local_language", &self.local_language)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
            workers: None,
            queue_capacity: None,
            results_capacity: None,
        }
    }

    /// Defaults overridden by `SPEEDGRID_*` environment variables.
    ///
    /// Recognised: `SPEEDGRID_WORKERS`, `SPEEDGRID_ROW_HEIGHT`,
    /// `SPEEDGRID_TESSERACT`, `SPEEDGRID_JOB_TIMEOUT_SECS`. Unparseable
    /// values are reported as [`PipelineError::InvalidConfig`].
    pub fn from_env() -> Result<Self, PipelineError> {
        let mut builder = Self::builder();
        if let Some(n) = env_parse::<usize>("SPEEDGRID_WORKERS")? {
            builder = builder.workers(n);
        }
        if let Some(h) = env_parse::<u32>("SPEEDGRID_ROW_HEIGHT")? {
            builder = builder.row_height(h);
        }
        if let Some(secs) = env_parse::<u64>("SPEEDGRID_JOB_TIMEOUT_SECS")? {
            builder = builder.job_timeout_secs(secs);
        }
        if let Ok(bin) = std::env::var("SPEEDGRID_TESSERACT") {
            if !bin.is_empty() {
                builder = builder.tesseract_binary(bin);
            }
        }
        builder.build()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, PipelineError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PipelineError::InvalidConfig(format!("{name}: cannot parse {v:?}"))),
        _ => Ok(None),
    }
}

/// CPU capacity divided by the threads one engine call consumes.
pub fn default_workers(engine_threads: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / engine_threads.max(1)).max(1)
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
    workers: Option<usize>,
    queue_capacity: Option<usize>,
    results_capacity: Option<usize>,
}

impl PipelineConfigBuilder {
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    /// Unless [`workers`](Self::workers) is set, the worker count is derived
    /// from this value.
    pub fn engine_threads(mut self, n: usize) -> Self {
        self.config.engine_threads = n.max(1);
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = Some(n);
        self
    }

    pub fn results_capacity(mut self, n: usize) -> Self {
        self.results_capacity = Some(n);
        self
    }

    pub fn job_timeout_secs(mut self, secs: u64) -> Self {
        self.config.job_timeout_secs = Some(secs);
        self
    }

    pub fn grid(mut self, grid: GridConfig) -> Self {
        self.config.grid = grid;
        self
    }

    pub fn row_height(mut self, px: u32) -> Self {
        self.config.grid.row_height = px;
        self
    }

    pub fn crop_inset(mut self, px: u32) -> Self {
        self.config.crop_inset = px;
        self
    }

    pub fn tesseract_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_binary = path.into();
        self
    }

    pub fn local_language(mut self, lang: impl Into<String>) -> Self {
        self.config.local_language = lang.into();
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let mut c = self.config;
        c.workers = self
            .workers
            .unwrap_or_else(|| default_workers(c.engine_threads));
        c.queue_capacity = self.queue_capacity.unwrap_or(c.workers);
        c.results_capacity = self.results_capacity.unwrap_or(c.workers * 2);

        if c.workers == 0 {
            return Err(PipelineError::InvalidConfig("workers must be ≥ 1".into()));
        }
        if c.queue_capacity == 0 || c.results_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "channel capacities must be ≥ 1".into(),
            ));
        }
        if c.grid.row_height < 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "row height must be ≥ 2 px, got {}",
                c.grid.row_height
            )));
        }
        if c.grid.threshold_block < 3 || c.grid.threshold_block % 2 == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold block must be odd and ≥ 3, got {}",
                c.grid.threshold_block
            )));
        }
        if !(0.0..1.0).contains(&c.grid.min_intersection_ratio) {
            return Err(PipelineError::InvalidConfig(format!(
                "intersection ratio must be in [0, 1), got {}",
                c.grid.min_intersection_ratio
            )));
        }
        if c.grid.min_column_gap == 0 {
            return Err(PipelineError::InvalidConfig(
                "min column gap must be ≥ 1 px".into(),
            ));
        }
        if c.grid.avg_speed_width == 0 || c.grid.avg_speed_width > c.grid.wide_trailing_gap {
            return Err(PipelineError::InvalidConfig(format!(
                "avg speed width must be in [1, {}] px, got {}",
                c.grid.wide_trailing_gap, c.grid.avg_speed_width
            )));
        }
        if c.local_language.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "local language must not be empty".into(),
            ));
        }
        Ok(c)
    }
}
