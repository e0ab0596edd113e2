//! Worker loop
//!
//! One worker process walks one [`WorkerRange`] with its own page session and
//! its own sink. This module holds the range arithmetic, the per-identifier
//! loop and the process-level wrapper that handles interrupts and error exits.

mod range;
mod runner;

pub use range::{partition, Direction, Partition, WorkerRange};
pub use runner::{Worker, WorkerStats};

use crate::config::Config;
use crate::page::HttpPageClient;
use crate::shutdown::shutdown_signal;
use crate::storage::SqliteSink;
use crate::HarvestError;
use chrono::Utc;
use std::future::Future;
use std::path::PathBuf;
use tracing::Instrument;

/// How a worker process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The whole range was walked
    Completed(WorkerStats),
    /// A signal stopped the worker after its checkpoint was flushed
    Interrupted(WorkerStats),
}

/// Runs a worker until its range is done, it fails, or the process is signalled
///
/// The checkpoint is flushed on interrupt and on error; errors additionally
/// leave a report in `errors/worker_{id}_error.txt`.
pub async fn run_worker_process(config: Config, range: WorkerRange) -> crate::Result<WorkerExit> {
    let span = tracing::info_span!("worker", id = range.worker_id);
    run_until(config, range, shutdown_signal())
        .instrument(span)
        .await
}

/// Like [`run_worker_process`], with `shutdown` standing in for the signal
async fn run_until<F>(
    config: Config,
    range: WorkerRange,
    shutdown: F,
) -> crate::Result<WorkerExit>
where
    F: Future<Output = ()>,
{
    let worker_id = range.worker_id;
    let sink = SqliteSink::new(&range.sink_location)?;
    let page = create_session(&config, worker_id).await?;
    let mut worker = Worker::new(range, page, sink, &config)?;

    let finished = {
        let run = worker.run();
        tokio::pin!(run);
        tokio::select! {
            result = &mut run => Some(result),
            _ = shutdown => None,
        }
    };

    match finished {
        Some(Ok(stats)) => Ok(WorkerExit::Completed(stats)),
        Some(Err(e)) => {
            tracing::error!("Worker {} stopped at {}: {}", worker_id, worker.cursor(), e);
            if let Err(flush) = worker.flush_checkpoint() {
                tracing::error!("Emergency checkpoint failed: {}", flush);
            }
            match write_error_report(&config, worker_id, worker.cursor(), &e) {
                Ok(path) => tracing::info!("Error report written to {}", path.display()),
                Err(report) => tracing::error!("Could not write error report: {}", report),
            }
            Err(e)
        }
        None => {
            tracing::warn!("Worker {} interrupted at {}", worker_id, worker.cursor());
            worker.flush_checkpoint()?;
            Ok(WorkerExit::Interrupted(worker.stats().clone()))
        }
    }
}

/// Builds the HTTP session, retrying a bounded number of times
async fn create_session(config: &Config, worker_id: u32) -> crate::Result<HttpPageClient> {
    let attempts = config.pipeline.session_create_attempts.max(1);

    for attempt in 1..=attempts {
        match HttpPageClient::new(&config.page) {
            Ok(page) => return Ok(page),
            Err(e) => {
                tracing::error!(
                    "Session creation failed (attempt {}/{}): {}",
                    attempt,
                    attempts,
                    e
                );
                if attempt < attempts {
                    tokio::time::sleep(config.pipeline.session_create_delay()).await;
                }
            }
        }
    }

    Err(HarvestError::SessionUnavailable {
        worker_id,
        attempts,
    })
}

fn write_error_report(
    config: &Config,
    worker_id: u32,
    identifier: i64,
    error: &HarvestError,
) -> std::io::Result<PathBuf> {
    let dir = config.output.error_dir();
    std::fs::create_dir_all(&dir)?;

    let path = dir.join(format!("worker_{}_error.txt", worker_id));
    let report = format!(
        "worker: {}\nidentifier: {}\ntime: {}\nerror: {}\n",
        worker_id,
        identifier,
        Utc::now().to_rfc3339(),
        error
    );
    std::fs::write(&path, report)?;
    Ok(path)
}
