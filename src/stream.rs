//! Streaming API: hand outcomes to the caller as workers produce them.
//!
//! ## Why stream?
//!
//! [`crate::Pipeline::run`] persists through a [`crate::store::ResultStore`]
//! and only returns counters. Callers that want the tables themselves (to
//! write them somewhere else, or to inspect skips and failures as they
//! happen) use [`crate::Pipeline::stream`] instead. The producer and the
//! worker pool are the same; no sink runs and nothing is inserted. The store
//! is still consulted for the dedup gate.
//!
//! Outcomes arrive in completion order. The worker pool stops pulling jobs
//! once the stream is dropped.

use crate::coordinator::{Launched, Pipeline};
use crate::engine::EngineFactory;
use crate::error::JobError;
use crate::job::Job;
use crate::output::JobOutcome;
use crate::store::ResultStore;
use futures::future::join_all;
use futures::Stream;
use std::pin::Pin;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

/// A boxed stream of job outcomes.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = JobOutcome> + Send>>;

impl<F: EngineFactory, S: ResultStore> Pipeline<F, S> {
    /// Process every job, yielding each outcome instead of persisting it.
    ///
    /// Must be called within a Tokio runtime.
    pub fn stream<J>(&self, jobs: J) -> OutcomeStream
    where
        J: Stream<Item = Result<Job, JobError>> + Send + 'static,
    {
        info!("Starting streaming pipeline with {} workers", self.config().workers);
        let Launched {
            producer,
            workers,
            outcomes,
        } = self.launch(jobs);

        // Nobody awaits the tasks; surface panics in the log.
        tokio::spawn(async move {
            if let Err(e) = producer.await {
                error!("producer task failed: {e}");
            }
            for joined in join_all(workers).await {
                if let Err(e) = joined {
                    error!("worker task failed: {e}");
                }
            }
        });

        Box::pin(ReceiverStream::new(outcomes))
    }
}
