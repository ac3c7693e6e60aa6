//! Run-to-completion extraction over a stream of jobs.
//!
//! ## Task layout
//!
//! ```text
//!  jobs ──▶ producer ──▶ [queue: queue_capacity] ──▶ worker × N ──▶ [outcomes] ──▶ sink ──▶ store
//!              │                                                       ▲
//!              └───────────── fetch failures ──────────────────────────┘
//! ```
//!
//! - The producer blocks when the queue is full. Every queued job holds a
//!   decoded bitmap, so the queue bound is also the memory bound.
//! - Each worker owns one recognition engine for as long as it lives and runs
//!   every engine call inside `spawn_blocking`.
//! - A single sink performs every store write.
//!
//! Shutdown joins in order: the producer (intake closed), then all workers
//! (queue drained, last outcome sent), then the sink (outcomes drained). The
//! sink cannot finish early because it only stops once every worker has
//! dropped its outcome sender.
//!
//! ## Per-job states
//!
//! ```text
//! Queued ──▶ MetadataChecked ──┬──▶ Skipped
//!                              └──▶ Extracting ──┬──▶ Extracted
//!                                                └──▶ Failed
//! ```
//!
//! The footer timestamp is read before anything else; grid detection and
//! cell recognition only run for images strictly newer than what the store
//! holds.

use crate::config::PipelineConfig;
use crate::engine::{EngineFactory, TesseractFactory};
use crate::error::{JobError, LayoutError, PipelineError};
use crate::job::{DedupKey, Job};
use crate::output::{JobOutcome, PipelineReport, ResultRow, ResultTable, SkipNotice};
use crate::pipeline::cells::CellReader;
use crate::pipeline::grid::GridDetector;
use crate::pipeline::metadata::MetadataReader;
use crate::pipeline::normalize::build_rows;
use crate::pipeline::schema::ColumnSchema;
use crate::progress::{NoopObserver, SharedObserver};
use crate::recognition::RecognitionRegistry;
use crate::store::ResultStore;
use futures::future::join_all;
use futures::{Stream, StreamExt};
use image::GrayImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The extraction pipeline.
///
/// Generic over the engine factory so tests can substitute a deterministic
/// engine, and over the store so callers bring their own persistence.
pub struct Pipeline<F: EngineFactory, S: ResultStore> {
    ctx: WorkerContext<F, S>,
}

impl<S: ResultStore> Pipeline<TesseractFactory, S> {
    /// Pipeline backed by the `tesseract` executable named in `config`.
    pub fn tesseract(config: PipelineConfig, store: Arc<S>) -> Self {
        let factory = TesseractFactory::from_config(&config);
        Self::new(config, factory, store)
    }
}

impl<F: EngineFactory, S: ResultStore> Pipeline<F, S> {
    pub fn new(config: PipelineConfig, factory: F, store: Arc<S>) -> Self {
        let registry = RecognitionRegistry::new(&config.local_language);
        let observer: SharedObserver = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver) as SharedObserver);
        Self {
            ctx: WorkerContext {
                config: Arc::new(config),
                registry: Arc::new(registry),
                factory: Arc::new(factory),
                store,
                observer,
            },
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.ctx.store
    }

    /// Process every job and persist the extracted tables.
    ///
    /// Returns once the intake is exhausted and every outcome has been
    /// handled. Per-job failures are counted in the report, never returned.
    ///
    /// # Errors
    /// [`PipelineError::Internal`] when a coordinator task panicked.
    pub async fn run<J>(&self, jobs: J) -> Result<PipelineReport, PipelineError>
    where
        J: Stream<Item = Result<Job, JobError>> + Send + 'static,
    {
        let start = Instant::now();
        let ctx = &self.ctx;
        info!("Starting pipeline with {} workers", ctx.config.workers);
        ctx.observer.on_pipeline_start(ctx.config.workers);

        // ── Step 1: Producer and workers ─────────────────────────────────
        let Launched {
            producer,
            workers,
            outcomes,
        } = self.launch(jobs);

        // ── Step 2: Sink ─────────────────────────────────────────────────
        let sink_task = tokio::spawn(sink(outcomes, Arc::clone(&ctx.store), ctx.observer.clone()));

        // ── Step 3: Two-phase join ───────────────────────────────────────
        producer
            .await
            .map_err(|e| PipelineError::Internal(format!("producer task failed: {e}")))?;
        for joined in join_all(workers).await {
            joined.map_err(|e| PipelineError::Internal(format!("worker task failed: {e}")))?;
        }
        let mut report = sink_task
            .await
            .map_err(|e| PipelineError::Internal(format!("sink task failed: {e}")))?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Pipeline complete: {} received, {} extracted, {} skipped, {} failed, {} persisted in {}ms",
            report.received,
            report.extracted,
            report.skipped,
            report.failed,
            report.persisted,
            report.duration_ms
        );
        ctx.observer.on_pipeline_complete(&report);
        Ok(report)
    }

    /// Spawn the producer and the worker pool; outcomes arrive on the
    /// returned receiver.
    pub(crate) fn launch<J>(&self, jobs: J) -> Launched
    where
        J: Stream<Item = Result<Job, JobError>> + Send + 'static,
    {
        let cfg = &self.ctx.config;
        let (job_tx, job_rx) = mpsc::channel::<Job>(cfg.queue_capacity);
        let (out_tx, out_rx) = mpsc::channel::<JobOutcome>(cfg.results_capacity);

        let producer = tokio::spawn(produce(
            Box::pin(jobs),
            job_tx,
            out_tx.clone(),
            self.ctx.observer.clone(),
        ));

        let queue = Arc::new(Mutex::new(job_rx));
        let workers = (0..cfg.workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    self.ctx.clone(),
                    Arc::clone(&queue),
                    out_tx.clone(),
                ))
            })
            .collect();
        // Only the producer and the workers may keep the outcome channel open.
        drop(out_tx);

        Launched {
            producer,
            workers,
            outcomes: out_rx,
        }
    }
}

pub(crate) struct Launched {
    pub(crate) producer: JoinHandle<()>,
    pub(crate) workers: Vec<JoinHandle<()>>,
    pub(crate) outcomes: mpsc::Receiver<JobOutcome>,
}

// ── Tasks ────────────────────────────────────────────────────────────────

async fn produce(
    mut jobs: std::pin::Pin<Box<dyn Stream<Item = Result<Job, JobError>> + Send>>,
    queue: mpsc::Sender<Job>,
    outcomes: mpsc::Sender<JobOutcome>,
    observer: SharedObserver,
) {
    let mut queued = 0usize;
    while let Some(item) = jobs.next().await {
        match item {
            Ok(job) => {
                if queue.send(job).await.is_err() {
                    break;
                }
                queued += 1;
            }
            Err(e) => {
                warn!("Job failed before queueing: {e}");
                observer.on_job_failed(e.key(), &e.to_string());
                if outcomes.send(JobOutcome::Failed(e)).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("producer done, {queued} jobs queued");
}

async fn worker_loop<F: EngineFactory, S: ResultStore>(
    id: usize,
    ctx: WorkerContext<F, S>,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    outcomes: mpsc::Sender<JobOutcome>,
) {
    debug!("worker {id} started");
    let mut engine: Option<F::Engine> = None;
    loop {
        // The lock is held only while waiting for the next job.
        let job = queue.lock().await.recv().await;
        let Some(job) = job else { break };

        let key = job.key();
        ctx.observer.on_job_start(&key);
        let (outcome, kept) = process_job(&ctx, engine.take(), job).await;
        engine = kept;

        match &outcome {
            JobOutcome::Extracted(table) => {
                info!("{key}: extracted {} rows", table.rows.len());
                ctx.observer.on_job_extracted(&key, table.rows.len());
            }
            JobOutcome::Skipped(notice) => {
                info!(
                    "{key}: up to date ({} <= {}), skipping",
                    notice.timestamp, notice.latest
                );
                ctx.observer.on_job_skipped(&key);
            }
            JobOutcome::Failed(e) => {
                warn!("Job failed: {e}");
                ctx.observer.on_job_failed(&key, &e.to_string());
            }
        }
        if outcomes.send(outcome).await.is_err() {
            debug!("worker {id}: outcome receiver gone");
            break;
        }
    }
    debug!("worker {id} exiting");
}

async fn sink<S: ResultStore>(
    mut outcomes: mpsc::Receiver<JobOutcome>,
    store: Arc<S>,
    observer: SharedObserver,
) -> PipelineReport {
    let mut report = PipelineReport::default();
    while let Some(outcome) = outcomes.recv().await {
        report.record(&outcome);
        let JobOutcome::Extracted(table) = outcome else {
            continue;
        };
        let key = table.key();
        match store.insert(&table).await {
            Ok(()) => {
                report.persisted += 1;
                debug!("{key}: stored {} rows", table.rows.len());
                observer.on_table_persisted(&key);
            }
            Err(e) => {
                report.store_errors += 1;
                warn!("{key}: failed to store table: {e}");
                observer.on_store_error(&key, &e.to_string());
            }
        }
    }
    report
}

// ── One job ──────────────────────────────────────────────────────────────

/// Everything a worker needs, cheap to clone.
struct WorkerContext<F, S> {
    config: Arc<PipelineConfig>,
    registry: Arc<RecognitionRegistry>,
    factory: Arc<F>,
    store: Arc<S>,
    observer: SharedObserver,
}

impl<F, S> Clone for WorkerContext<F, S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            factory: Arc::clone(&self.factory),
            store: Arc::clone(&self.store),
            observer: Arc::clone(&self.observer),
        }
    }
}

struct Extraction {
    rows: Vec<ResultRow>,
    version: Option<String>,
}

impl<F: EngineFactory, S: ResultStore> WorkerContext<F, S> {
    fn metadata_reader(&self) -> MetadataReader<'_> {
        MetadataReader::new(
            &self.registry,
            self.config.grid.row_height,
            self.config.crop_inset,
        )
    }

    /// Grid → schema → cells → rows, plus the title's generator version.
    fn extract(&self, engine: &mut F::Engine, gray: &GrayImage) -> Result<Extraction, LayoutError> {
        let grid = GridDetector::new(self.config.grid.clone()).detect(gray)?;
        let schema = ColumnSchema::resolve(grid.column_count())?;
        let cells = CellReader::new(&self.registry, self.config.crop_inset)
            .read(engine, gray, &grid, &schema)?;
        let rows = build_rows(&cells, &schema, grid.data_row_count());
        let version = self.metadata_reader().read_version(engine, gray);
        Ok(Extraction { rows, version })
    }
}

/// Run one job through the dedup gate and, if it passes, extraction.
///
/// Returns the outcome and the engine to keep for the next job. The engine is
/// dropped when it could not be created or when extraction timed out.
async fn process_job<F: EngineFactory, S: ResultStore>(
    ctx: &WorkerContext<F, S>,
    engine: Option<F::Engine>,
    job: Job,
) -> (JobOutcome, Option<F::Engine>) {
    let Job {
        net_provider,
        provider,
        image,
    } = job;
    let key = DedupKey::new(&net_provider, &provider);
    let internal = |key: DedupKey, e: tokio::task::JoinError| JobOutcome::Failed(JobError::Internal {
        key,
        detail: e.to_string(),
    });

    // ── Step 1: Footer timestamp ─────────────────────────────────────────
    let meta_ctx = ctx.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let mut engine = match engine {
            Some(engine) => engine,
            None => match meta_ctx.factory.create() {
                Ok(engine) => engine,
                Err(e) => return (None, Err(e)),
            },
        };
        let gray = image.to_luma8();
        let read = meta_ctx.metadata_reader().read_timestamp(&mut engine, &gray);
        (Some(engine), read.map(|ts| (ts, gray)))
    })
    .await;
    let (engine, read) = match joined {
        Ok(pair) => pair,
        Err(e) => return (internal(key, e), None),
    };
    let (timestamp, gray) = match read {
        Ok(pair) => pair,
        Err(source) => return (JobOutcome::Failed(JobError::Recognition { key, source }), engine),
    };
    let Some(mut engine) = engine else {
        return (
            JobOutcome::Failed(JobError::Internal {
                key,
                detail: "no engine after metadata read".into(),
            }),
            None,
        );
    };

    // ── Step 2: Dedup gate ───────────────────────────────────────────────
    let latest = match ctx.store.latest_timestamp(&key).await {
        Ok(ts) => ts,
        Err(source) => return (JobOutcome::Failed(JobError::Store { key, source }), Some(engine)),
    };
    if timestamp <= latest {
        let notice = SkipNotice {
            key,
            timestamp,
            latest,
        };
        return (JobOutcome::Skipped(notice), Some(engine));
    }
    debug!("{key}: {timestamp} is newer than {latest}, extracting");

    // ── Step 3: Full extraction ──────────────────────────────────────────
    let extract_ctx = ctx.clone();
    let task = tokio::task::spawn_blocking(move || {
        let result = extract_ctx.extract(&mut engine, &gray);
        (engine, result)
    });
    let joined = match ctx.config.job_timeout_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), task).await {
            Ok(joined) => joined,
            // The blocking call keeps running and drops the engine when done.
            Err(_) => return (JobOutcome::Failed(JobError::Timeout { key, secs }), None),
        },
        None => task.await,
    };
    let (engine, result) = match joined {
        Ok(pair) => pair,
        Err(e) => return (internal(key, e), None),
    };

    // ── Step 4: Assemble ─────────────────────────────────────────────────
    let outcome = match result {
        Ok(Extraction { rows, version }) => JobOutcome::Extracted(ResultTable {
            net_provider,
            provider,
            timestamp,
            generator_version: version,
            rows,
        }),
        Err(source) => JobOutcome::Failed(JobError::Layout { key, source }),
    };
    (outcome, Some(engine))
}
