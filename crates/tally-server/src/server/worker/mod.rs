//! Worker role: a single consumer loop over the shared work queue.
//!
//! Any number of worker processes may run against the same queue; the store
//! hands each job to exactly one of them. A job whose processing fails is
//! logged and dropped.

use crate::server::{
    config::ServerConfig,
    telemetry::{increment_jobs_failed, increment_jobs_processed, increment_store_errors},
    web::SharedStore,
};
use tally_core::{CancellationToken, ConsumerStats, QueueConsumer, bytes::Bytes};

/// Reasons a job payload is rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JobError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("payload is empty")]
    Empty,
}

/// Handles one popped job.
///
/// Jobs are plain job names; processing reports which worker picked the job
/// up.
pub fn process_job(hostname: &str, payload: &Bytes) -> Result<(), JobError> {
    let job = core::str::from_utf8(payload).map_err(|_| JobError::InvalidUtf8)?;
    if job.is_empty() {
        return Err(JobError::Empty);
    }

    tracing::info!(worker = %hostname, %job, "processed: {job}");
    Ok(())
}

/// Runs the consumer loop until `cancel` fires.
///
/// Returns once any in-flight job has finished and no further pop will be
/// issued.
pub async fn worker_loop(
    config: &ServerConfig,
    store: SharedStore,
    cancel: CancellationToken,
) -> ConsumerStats {
    let consumer = QueueConsumer::new(store)
        .with_pop_timeout(config.pop_timeout)
        .with_store_error_hook(|_| increment_store_errors());

    tracing::info!(
        worker = %config.hostname,
        queue = %config.queue,
        pop_timeout = ?config.pop_timeout,
        "Worker role starting"
    );

    let stats = consumer
        .run(
            &config.queue,
            |payload| {
                let result = process_job(&config.hostname, &payload);
                match result {
                    Ok(()) => increment_jobs_processed(),
                    Err(_) => increment_jobs_failed(),
                }
                result
            },
            cancel,
        )
        .await;

    tracing::info!(
        worker = %config.hostname,
        processed = stats.processed,
        failed = stats.failed,
        store_errors = stats.store_errors,
        "Worker role stopped"
    );
    stats
}
