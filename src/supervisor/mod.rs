//! Worker supervision
//!
//! The supervisor partitions the identifier space, launches one worker per
//! partition from its resolved resume point, optionally restarts workers that
//! die before finishing, and stops everything on shutdown. When configured it
//! merges the worker sinks once the run ends.

mod launcher;
mod resume;

pub use launcher::{ProcessHandle, ProcessLauncher, WorkerHandle, WorkerLauncher};
pub use resume::{resolve_resume, ResumePoint};

use crate::checkpoint::CheckpointStore;
use crate::config::{Config, OutputConfig, SupervisorConfig};
use crate::storage::{merge_sinks, MergeReport, DEFAULT_MERGE_CHUNK};
use crate::worker::{partition, Partition};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::time::{sleep, Instant};

/// Errors raised while managing worker processes
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to launch worker {worker_id}: {source}")]
    Launch {
        worker_id: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Summary of a supervised run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Worker launches, restarts included
    pub launched: u32,
    pub restarts: u32,
    /// Workers whose partition is fully walked
    pub completed: Vec<u32>,
    /// Workers that stopped with part of their partition left
    pub unfinished: Vec<u32>,
    pub interrupted: bool,
    pub merge: Option<MergeReport>,
}

struct Slot<H> {
    partition: Partition,
    handle: Option<H>,
    restarts: u32,
    settled: bool,
}

impl<H> Slot<H> {
    fn new(partition: Partition) -> Self {
        Self {
            partition,
            handle: None,
            restarts: 0,
            settled: false,
        }
    }
}

/// Partitions of the configured run and where each would resume
///
/// Nothing is launched; used to preview a run.
pub fn plan_run(config: &Config) -> crate::Result<Vec<(Partition, ResumePoint)>> {
    let pipeline = &config.pipeline;
    let checkpoints = CheckpointStore::new(config.output.checkpoint_dir());

    let plan = partition(
        pipeline.start,
        pipeline.end,
        pipeline.workers,
        pipeline.direction,
    )?
    .into_iter()
    .map(|p| {
        let point = resolve_resume(&p, &checkpoints, &config.output.sink_path(p.worker_id));
        (p, point)
    })
    .collect();

    Ok(plan)
}

/// Launches and watches the workers of one run
pub struct Supervisor<L: WorkerLauncher> {
    launcher: L,
    partitions: Vec<Partition>,
    checkpoints: CheckpointStore,
    output: OutputConfig,
    settings: SupervisorConfig,
}

impl<L: WorkerLauncher> Supervisor<L> {
    /// Partitions the configured range; fails on an empty or unsplittable range
    pub fn new(config: &Config, launcher: L) -> crate::Result<Self> {
        let pipeline = &config.pipeline;
        let partitions = partition(
            pipeline.start,
            pipeline.end,
            pipeline.workers,
            pipeline.direction,
        )?;

        Ok(Self {
            launcher,
            partitions,
            checkpoints: CheckpointStore::new(config.output.checkpoint_dir()),
            output: config.output.clone(),
            settings: config.supervisor.clone(),
        })
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    fn resolve(&self, partition: &Partition) -> ResumePoint {
        let sink_path = self.output.sink_path(partition.worker_id);
        resolve_resume(partition, &self.checkpoints, &sink_path)
    }

    /// Runs every worker until all are settled or `shutdown` resolves
    ///
    /// Workers are launched `stagger` apart. With monitoring enabled, exited
    /// workers whose partition is not complete are relaunched from their
    /// resume point up to `max-restarts` times; otherwise the supervisor only
    /// waits for them. On shutdown every live worker gets the grace period to
    /// exit before it is killed. The merge step runs afterwards in both cases.
    pub async fn run_until<F>(&mut self, shutdown: F) -> crate::Result<SupervisorReport>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut report = SupervisorReport::default();
        let mut slots: Vec<Slot<L::Handle>> = Vec::with_capacity(self.partitions.len());

        tracing::info!(
            "Supervising {} workers (monitor: {}, max restarts: {})",
            self.partitions.len(),
            self.settings.monitor,
            self.settings.max_restarts
        );

        let partitions = self.partitions.clone();
        for (index, partition) in partitions.into_iter().enumerate() {
            if index > 0 && !self.settings.stagger().is_zero() {
                tokio::select! {
                    _ = sleep(self.settings.stagger()) => {}
                    _ = shutdown.as_mut() => {
                        report.interrupted = true;
                        break;
                    }
                }
            }

            let mut slot = Slot::new(partition);
            let point = self.resolve(&partition);
            self.start(&mut slot, point, &mut report);
            slots.push(slot);
        }

        if !report.interrupted {
            report.interrupted = if self.settings.monitor {
                self.monitor(&mut slots, shutdown.as_mut(), &mut report).await
            } else {
                self.join(&mut slots, shutdown.as_mut(), &mut report).await
            };
        }

        if report.interrupted {
            tracing::warn!("Shutdown requested, stopping workers");
        }
        self.stop_all(&mut slots).await;

        if self.settings.merge_on_completion {
            report.merge = Some(self.merge()?);
        }

        tracing::info!(
            "Run finished: {} completed, {} unfinished, {} restarts",
            report.completed.len(),
            report.unfinished.len(),
            report.restarts
        );
        Ok(report)
    }

    /// Merges every worker sink into the configured destination
    pub fn merge(&self) -> crate::Result<MergeReport> {
        let sources = self.output.sink_paths(self.partitions.len() as u32);
        tracing::info!(
            "Merging {} sinks into {}",
            sources.len(),
            self.output.merged_path.display()
        );

        let merged = merge_sinks(&sources, &self.output.merged_path, DEFAULT_MERGE_CHUNK)?;
        tracing::info!(
            "Merge complete: {} records inserted, {} duplicates ignored, {} sources skipped",
            merged.records_inserted,
            merged.duplicates_ignored,
            merged.skipped.len()
        );
        Ok(merged)
    }

    /// Launches a slot's worker from `point`, or settles it when complete
    fn start(
        &mut self,
        slot: &mut Slot<L::Handle>,
        point: ResumePoint,
        report: &mut SupervisorReport,
    ) {
        let worker_id = slot.partition.worker_id;

        let Some(start) = point.start() else {
            tracing::info!("Worker {} already completed its range", worker_id);
            slot.settled = true;
            report.completed.push(worker_id);
            return;
        };

        tracing::info!("Worker {} resumes from {}", worker_id, point.describe());
        let range = slot
            .partition
            .resume_at(start, self.output.sink_path(worker_id));

        match self.launcher.launch(&range) {
            Ok(handle) => {
                slot.handle = Some(handle);
                report.launched += 1;
            }
            Err(e) => tracing::error!("{}", e),
        }
    }

    /// Handles a worker that is no longer running; true while the slot is live
    fn after_exit(&mut self, slot: &mut Slot<L::Handle>, report: &mut SupervisorReport) -> bool {
        let worker_id = slot.partition.worker_id;
        let point = self.resolve(&slot.partition);

        if point == ResumePoint::Completed {
            tracing::info!("Worker {} completed its range", worker_id);
            slot.settled = true;
            report.completed.push(worker_id);
            return false;
        }

        if slot.restarts >= self.settings.max_restarts {
            tracing::error!(
                "Worker {} exhausted {} restarts; identifiers from {} through {} remain unprocessed",
                worker_id,
                self.settings.max_restarts,
                point.start().unwrap_or(slot.partition.start),
                slot.partition.final_identifier()
            );
            slot.settled = true;
            report.unfinished.push(worker_id);
            return false;
        }

        slot.restarts += 1;
        report.restarts += 1;
        tracing::warn!(
            "Restarting worker {} ({}/{})",
            worker_id,
            slot.restarts,
            self.settings.max_restarts
        );
        self.start(slot, point, report);
        !slot.settled
    }

    /// Polls workers and relaunches the ones that died; true if interrupted
    async fn monitor<F>(
        &mut self,
        slots: &mut [Slot<L::Handle>],
        mut shutdown: Pin<&mut F>,
        report: &mut SupervisorReport,
    ) -> bool
    where
        F: Future<Output = ()>,
    {
        loop {
            let mut live = 0;

            for slot in slots.iter_mut() {
                if slot.settled {
                    continue;
                }

                if let Some(handle) = slot.handle.as_mut() {
                    match handle.try_exit() {
                        Ok(None) => {
                            live += 1;
                            continue;
                        }
                        Ok(Some(clean)) => {
                            tracing::info!(
                                "Worker {} exited ({})",
                                handle.worker_id(),
                                if clean { "clean" } else { "failure" }
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                "Lost track of worker {}: {}",
                                handle.worker_id(),
                                e
                            );
                        }
                    }
                    slot.handle = None;
                }

                if self.after_exit(slot, report) {
                    live += 1;
                    if !self.settings.restart_delay().is_zero() {
                        tokio::select! {
                            _ = sleep(self.settings.restart_delay()) => {}
                            _ = shutdown.as_mut() => return true,
                        }
                    }
                }
            }

            if live == 0 {
                tracing::info!("No workers left running");
                return false;
            }

            tokio::select! {
                _ = sleep(self.settings.poll_interval()) => {}
                _ = shutdown.as_mut() => return true,
            }
        }
    }

    /// Waits for every worker without restarting; true if interrupted
    async fn join<F>(
        &mut self,
        slots: &mut [Slot<L::Handle>],
        mut shutdown: Pin<&mut F>,
        report: &mut SupervisorReport,
    ) -> bool
    where
        F: Future<Output = ()>,
    {
        for slot in slots.iter_mut() {
            if slot.settled {
                continue;
            }
            let worker_id = slot.partition.worker_id;

            if let Some(handle) = slot.handle.as_mut() {
                let exited = tokio::select! {
                    result = handle.wait() => result,
                    _ = shutdown.as_mut() => return true,
                };
                match exited {
                    Ok(clean) => tracing::info!(
                        "Worker {} exited ({})",
                        worker_id,
                        if clean { "clean" } else { "failure" }
                    ),
                    Err(e) => tracing::error!("Lost track of worker {}: {}", worker_id, e),
                }
                slot.handle = None;
            }

            slot.settled = true;
            if self.resolve(&slot.partition) == ResumePoint::Completed {
                report.completed.push(worker_id);
            } else {
                tracing::warn!(
                    "Worker {} stopped before finishing its range; rerun to resume it",
                    worker_id
                );
                report.unfinished.push(worker_id);
            }
        }
        false
    }

    /// Stops live workers, all within one shared grace period
    async fn stop_all(&mut self, slots: &mut [Slot<L::Handle>]) {
        let deadline = Instant::now() + self.settings.shutdown_grace();

        for slot in slots.iter_mut() {
            if let Some(mut handle) = slot.handle.take() {
                let grace = deadline.saturating_duration_since(Instant::now());
                if let Err(e) = handle.shutdown(grace).await {
                    tracing::error!("Failed to stop worker {}: {}", handle.worker_id(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::storage::{test_record, Sink, SqliteSink};
    use crate::worker::WorkerRange;
    use std::cell::Cell;
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy)]
    enum Script {
        /// Walks the whole range
        Complete,
        /// Dies with its checkpoint at the identifier
        CrashAt(i64),
        /// Runs until stopped
        Hang,
    }

    struct FakeLauncher {
        checkpoints: CheckpointStore,
        scripts: HashMap<u32, VecDeque<Script>>,
        launches: Vec<(u32, i64, i64)>,
        stopped: Rc<Cell<u32>>,
    }

    impl FakeLauncher {
        fn new(config: &Config) -> Self {
            Self {
                checkpoints: CheckpointStore::new(config.output.checkpoint_dir()),
                scripts: HashMap::new(),
                launches: Vec::new(),
                stopped: Rc::new(Cell::new(0)),
            }
        }

        fn script(mut self, worker_id: u32, runs: &[Script]) -> Self {
            self.scripts
                .entry(worker_id)
                .or_default()
                .extend(runs.iter().copied());
            self
        }
    }

    impl WorkerLauncher for FakeLauncher {
        type Handle = FakeHandle;

        fn launch(&mut self, range: &WorkerRange) -> Result<FakeHandle, SupervisorError> {
            let worker_id = range.worker_id;
            self.launches
                .push((worker_id, range.start_identifier, range.end_identifier));

            let script = self
                .scripts
                .get_mut(&worker_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Script::Complete);

            let exit = match script {
                Script::Complete => {
                    self.checkpoints
                        .save(&Checkpoint::completed(worker_id, range.final_identifier()))
                        .unwrap();
                    Some(true)
                }
                Script::CrashAt(identifier) => {
                    self.checkpoints
                        .save(&Checkpoint::new(worker_id, identifier))
                        .unwrap();
                    Some(false)
                }
                Script::Hang => None,
            };

            Ok(FakeHandle {
                worker_id,
                exit,
                stopped: Rc::clone(&self.stopped),
            })
        }
    }

    struct FakeHandle {
        worker_id: u32,
        exit: Option<bool>,
        stopped: Rc<Cell<u32>>,
    }

    impl WorkerHandle for FakeHandle {
        fn worker_id(&self) -> u32 {
            self.worker_id
        }

        fn try_exit(&mut self) -> Result<Option<bool>, SupervisorError> {
            Ok(self.exit)
        }

        async fn wait(&mut self) -> Result<bool, SupervisorError> {
            match self.exit {
                Some(clean) => Ok(clean),
                None => std::future::pending().await,
            }
        }

        async fn shutdown(&mut self, _grace: Duration) -> Result<(), SupervisorError> {
            if self.exit.is_none() {
                self.stopped.set(self.stopped.get() + 1);
                self.exit = Some(false);
            }
            Ok(())
        }
    }

    fn test_config(dir: &std::path::Path, monitor: bool) -> Config {
        let mut config: Config = toml::from_str(
            r#"
[source]
base-url = "https://fleets.example.com"

[pipeline]
workers = 2
start = 100
end = 90

[supervisor]
max-restarts = 3
poll-interval-secs = 0
restart-delay-secs = 0
stagger-ms = 0
shutdown-grace-secs = 0
"#,
        )
        .unwrap();
        config.supervisor.monitor = monitor;
        config.output.data_dir = dir.join("databases");
        config.output.merged_path = dir.join("merged.db");
        config
    }

    #[tokio::test]
    async fn test_crashed_worker_restarts_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), true);
        let launcher = FakeLauncher::new(&config).script(2, &[Script::CrashAt(95)]);

        let mut supervisor = Supervisor::new(&config, launcher).unwrap();
        let report = supervisor
            .run_until(std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(
            supervisor.launcher().launches,
            vec![(1, 100, 95), (2, 95, 90), (2, 95, 90)]
        );
        assert_eq!(report.restarts, 1);
        assert_eq!(report.launched, 3);
        assert_eq!(report.completed, vec![1, 2]);
        assert!(report.unfinished.is_empty());
        assert!(!report.interrupted);
    }

    #[tokio::test]
    async fn test_restarts_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), true);
        config.supervisor.max_restarts = 2;
        let launcher = FakeLauncher::new(&config).script(2, &[Script::CrashAt(93); 4]);

        let mut supervisor = Supervisor::new(&config, launcher).unwrap();
        let report = supervisor
            .run_until(std::future::pending::<()>())
            .await
            .unwrap();

        let worker_two: Vec<_> = supervisor
            .launcher()
            .launches
            .iter()
            .filter(|(id, _, _)| *id == 2)
            .copied()
            .collect();
        assert_eq!(worker_two, vec![(2, 95, 90), (2, 93, 90), (2, 93, 90)]);
        assert_eq!(report.restarts, 2);
        assert_eq!(report.completed, vec![1]);
        assert_eq!(report.unfinished, vec![2]);
    }

    #[tokio::test]
    async fn test_completed_partitions_are_not_relaunched() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), false);
        CheckpointStore::new(config.output.checkpoint_dir())
            .save(&Checkpoint::completed(1, 96))
            .unwrap();

        let mut supervisor = Supervisor::new(&config, FakeLauncher::new(&config)).unwrap();
        let report = supervisor
            .run_until(std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(supervisor.launcher().launches, vec![(2, 95, 90)]);
        assert_eq!(report.completed, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_without_monitoring_dead_workers_stay_down() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), false);
        let launcher = FakeLauncher::new(&config).script(1, &[Script::CrashAt(98)]);

        let mut supervisor = Supervisor::new(&config, launcher).unwrap();
        let report = supervisor
            .run_until(std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(supervisor.launcher().launches.len(), 2);
        assert_eq!(report.unfinished, vec![1]);
        assert_eq!(report.completed, vec![2]);
        assert_eq!(report.restarts, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_live_workers() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), false);
        let launcher = FakeLauncher::new(&config).script(1, &[Script::Hang]);
        let stopped = Rc::clone(&launcher.stopped);

        let mut supervisor = Supervisor::new(&config, launcher).unwrap();
        let report = supervisor.run_until(std::future::ready(())).await.unwrap();

        assert!(report.interrupted);
        assert_eq!(stopped.get(), 1);
    }

    #[tokio::test]
    async fn test_merge_runs_after_workers_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), false);
        config.supervisor.merge_on_completion = true;

        for (worker_id, identifiers) in [(1, vec![99, 97]), (2, vec![94, 92, 91])] {
            let mut sink = SqliteSink::new(&config.output.sink_path(worker_id)).unwrap();
            for identifier in identifiers {
                sink.insert_or_ignore(&test_record(identifier, "Rebel", 500))
                    .unwrap();
            }
        }

        let mut supervisor = Supervisor::new(&config, FakeLauncher::new(&config)).unwrap();
        let report = supervisor
            .run_until(std::future::pending::<()>())
            .await
            .unwrap();

        let merge = report.merge.unwrap();
        assert_eq!(merge.sources_merged, 2);
        assert_eq!(merge.records_inserted, 5);

        let merged = SqliteSink::open_existing(&config.output.merged_path).unwrap();
        assert_eq!(merged.count().unwrap(), 5);
    }

    #[test]
    fn test_plan_reports_resume_points() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), false);
        CheckpointStore::new(config.output.checkpoint_dir())
            .save(&Checkpoint::new(2, 93))
            .unwrap();

        let plan = plan_run(&config).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].1, ResumePoint::PartitionStart(100));
        assert_eq!(plan[1].1, ResumePoint::Checkpoint(93));
    }
}
