use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{Config, PipelineConfig};
use crate::connectivity::ConnectivityMonitor;
use crate::extract::{Extractor, Outcome, SkipReason};
use crate::page::PageClient;
use crate::storage::{FallbackWriter, InsertOutcome, Record, Sink};
use crate::worker::range::WorkerRange;
use crate::HarvestError;

/// Counters for one worker lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Identifiers the state machine was run for
    pub processed: u64,
    /// Identifiers already in the sink before they were attempted
    pub already_present: u64,
    pub persisted: u64,
    pub duplicates: u64,
    pub private: u64,
    pub low_points: u64,
    /// Identifiers abandoned without a definite answer
    pub given_up: u64,
    /// Records written to side files because the sink refused them
    pub fallbacks: u64,
    pub session_resets: u64,
    pub session_recycles: u64,
    pub escalations: u64,
}

/// Drives one [`WorkerRange`] end-to-end
///
/// Owns the page session and the sink exclusively. Identifiers are attempted
/// strictly in range order; a session reset re-attempts the same identifier.
pub struct Worker<P, S> {
    range: WorkerRange,
    page: P,
    sink: S,
    extractor: Extractor,
    monitor: ConnectivityMonitor,
    checkpoints: CheckpointStore,
    fallback: FallbackWriter,
    pipeline: PipelineConfig,
    cursor: i64,
    stats: WorkerStats,
}

impl<P: PageClient, S: Sink> Worker<P, S> {
    pub fn new(range: WorkerRange, page: P, sink: S, config: &Config) -> crate::Result<Self> {
        let monitor = ConnectivityMonitor::from_config(&config.connectivity);
        Ok(Self {
            cursor: range.start_identifier,
            extractor: Extractor::new(config, monitor.clone())?,
            monitor,
            checkpoints: CheckpointStore::new(config.output.checkpoint_dir()),
            fallback: FallbackWriter::new(config.output.backup_dir()),
            pipeline: config.pipeline.clone(),
            stats: WorkerStats::default(),
            range,
            page,
            sink,
        })
    }

    /// Identifier currently being attempted, or the next one to attempt
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn range(&self) -> &WorkerRange {
        &self.range
    }

    /// Walks the rest of the range
    ///
    /// Returns once every identifier was attempted, after writing a completed
    /// checkpoint. Errors are reserved for conditions the loop cannot work
    /// around: connectivity that never returns, a session that cannot be
    /// rebuilt, or a completed checkpoint that cannot be written.
    pub async fn run(&mut self) -> crate::Result<WorkerStats> {
        let worker_id = self.range.worker_id;
        let step = self.range.direction.step();
        let total = self.range.len();
        let mut consecutive_failures = 0u32;
        let mut since_recycle = 0u32;

        tracing::info!(
            "Worker {} walking {} identifiers from {} to {} ({})",
            worker_id,
            total,
            self.range.start_identifier,
            self.range.final_identifier(),
            self.range.direction.as_str()
        );

        while !self
            .range
            .direction
            .has_reached(self.cursor, self.range.end_identifier)
        {
            let identifier = self.cursor;

            if since_recycle >= self.pipeline.session_recycle_interval {
                tracing::info!("Recycling session after {} identifiers", since_recycle);
                self.recreate_session().await?;
                self.stats.session_recycles += 1;
                since_recycle = 0;
            }

            if consecutive_failures >= self.pipeline.max_consecutive_failures {
                tracing::warn!(
                    "{} consecutive identifiers without an answer, recreating session",
                    consecutive_failures
                );
                self.recreate_session().await?;
                self.stats.escalations += 1;
                consecutive_failures = 0;
            }

            if !self.monitor.probe().await {
                tracing::warn!(identifier, "Connectivity lost, waiting for recovery");
                if !self.monitor.wait_for_recovery().await {
                    return Err(HarvestError::ConnectivityExhausted {
                        worker_id,
                        identifier,
                    });
                }
                self.recreate_session().await?;
            }

            match self.sink.contains(identifier) {
                Ok(true) => {
                    tracing::debug!(identifier, "Already stored, skipping");
                    self.stats.already_present += 1;
                    self.cursor = identifier + step;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(identifier, "Sink lookup failed, extracting anyway: {}", e);
                }
            }

            let productive = match self.extract_with_resets(identifier).await? {
                Some(Outcome::Record(record)) => self.persist(record),
                Some(Outcome::Skipped(reason)) => self.record_skip(identifier, reason),
                Some(Outcome::ResetRequired) | None => false,
            };

            if productive {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
                self.stats.given_up += 1;
            }

            self.stats.processed += 1;
            since_recycle += 1;
            self.cursor = identifier + step;

            if self.stats.processed % u64::from(self.pipeline.checkpoint_interval.max(1)) == 0 {
                self.log_progress(total);
                if let Err(e) = self
                    .checkpoints
                    .save(&Checkpoint::new(worker_id, identifier))
                {
                    tracing::error!("Failed to write checkpoint: {}", e);
                }
            }

            let delay = self.pipeline.request_delay(worker_id);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        self.checkpoints.save(&Checkpoint::completed(
            worker_id,
            self.range.final_identifier(),
        ))?;

        tracing::info!(
            "Worker {} finished: {} processed, {} persisted, {} already stored, {} given up",
            worker_id,
            self.stats.processed,
            self.stats.persisted,
            self.stats.already_present,
            self.stats.given_up
        );

        Ok(self.stats.clone())
    }

    /// Writes the cursor as the resume point
    pub fn flush_checkpoint(&self) -> crate::Result<()> {
        self.checkpoints
            .save(&Checkpoint::new(self.range.worker_id, self.cursor))?;
        tracing::info!("Checkpoint flushed at identifier {}", self.cursor);
        Ok(())
    }

    /// Runs the state machine, recreating the session on `ResetRequired`
    ///
    /// `None` means the identifier was abandoned: too many resets or an
    /// unexpected error.
    async fn extract_with_resets(&mut self, identifier: i64) -> crate::Result<Option<Outcome>> {
        let mut resets = 0u32;

        loop {
            match self.extractor.extract(&mut self.page, identifier).await {
                Ok(Outcome::ResetRequired) => {
                    resets += 1;
                    self.stats.session_resets += 1;

                    if resets > self.pipeline.max_resets_per_identifier {
                        tracing::error!(
                            identifier,
                            "Giving up after {} session resets",
                            resets - 1
                        );
                        return Ok(None);
                    }

                    tracing::warn!(identifier, "Session reset required (reset {})", resets);
                    self.recreate_session().await?;
                }
                Ok(outcome) => return Ok(Some(outcome)),
                Err(e) => {
                    tracing::error!(identifier, "Unexpected error, giving up: {}", e);
                    return Ok(None);
                }
            }
        }
    }

    fn persist(&mut self, record: Record) -> bool {
        let identifier = record.identifier;

        match self.sink.insert_or_ignore(&record) {
            Ok(InsertOutcome::Inserted) => {
                tracing::info!(
                    identifier,
                    "Stored '{}' ({}, {} points)",
                    record.name,
                    record.faction,
                    record.points
                );
                self.stats.persisted += 1;
                true
            }
            Ok(InsertOutcome::Ignored) => {
                tracing::debug!(identifier, "Already stored by an earlier attempt");
                self.stats.duplicates += 1;
                true
            }
            Err(e) => {
                tracing::error!(identifier, "Sink rejected record: {}", e);
                match self.fallback.write(&record) {
                    Ok(path) => {
                        tracing::warn!(identifier, "Record saved to {}", path.display());
                        self.stats.fallbacks += 1;
                    }
                    Err(e) => {
                        tracing::error!(identifier, "Record lost, side file failed: {}", e);
                    }
                }
                false
            }
        }
    }

    fn record_skip(&mut self, identifier: i64, reason: SkipReason) -> bool {
        match reason {
            SkipReason::Private => self.stats.private += 1,
            SkipReason::LowPoints { .. } => self.stats.low_points += 1,
            SkipReason::RetriesExhausted | SkipReason::EmptyText => {
                tracing::warn!(identifier, "No record extracted ({})", reason.as_str());
            }
        }
        reason.is_productive()
    }

    /// Tears the session down and rebuilds it, with bounded retries
    async fn recreate_session(&mut self) -> crate::Result<()> {
        let attempts = self.pipeline.session_create_attempts.max(1);

        for attempt in 1..=attempts {
            match self.page.recreate() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::error!(
                        "Session recreation failed (attempt {}/{}): {}",
                        attempt,
                        attempts,
                        e
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.pipeline.session_create_delay()).await;
                    }
                }
            }
        }

        Err(HarvestError::SessionUnavailable {
            worker_id: self.range.worker_id,
            attempts,
        })
    }

    fn log_progress(&self, total: u64) {
        let walked = self.range.start_identifier.abs_diff(self.cursor);
        let percent = if total > 0 {
            walked as f64 / total as f64 * 100.0
        } else {
            100.0
        };
        let answered = self.stats.persisted + self.stats.private + self.stats.low_points;

        tracing::info!(
            "Progress: {:.1}% ({}/{} identifiers), {}/{} answered, {} persisted",
            percent,
            walked,
            total,
            answered,
            self.stats.processed,
            self.stats.persisted
        );
    }
}
