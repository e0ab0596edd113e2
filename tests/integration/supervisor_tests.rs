//! Supervised runs that launch real worker processes

use crate::common::{create_test_config, mount_full_range, requested_identifiers};
use fleet_harvest::config::write_config;
use fleet_harvest::storage::{Sink, SqliteSink};
use fleet_harvest::supervisor::{ProcessLauncher, Supervisor};
use std::path::PathBuf;
use wiremock::MockServer;

fn launcher(run_config: PathBuf) -> ProcessLauncher {
    ProcessLauncher::new(PathBuf::from(env!("CARGO_BIN_EXE_fleet-harvest")), run_config)
        .with_global_args(vec!["-q".to_string()])
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_run_with_merge() {
    let server = MockServer::start().await;
    mount_full_range(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&server, dir.path());
    config.supervisor.merge_on_completion = true;

    let run_config = config.output.run_config_path();
    write_config(&config, &run_config).unwrap();

    let mut supervisor = Supervisor::new(&config, launcher(run_config.clone())).unwrap();
    let report = supervisor
        .run_until(std::future::pending::<()>())
        .await
        .expect("Supervised run failed");

    assert_eq!(report.launched, 2);
    assert_eq!(report.completed, vec![1, 2]);
    assert!(report.unfinished.is_empty());

    let merge = report.merge.expect("Merge should have run");
    assert_eq!(merge.records_inserted, 10);

    let merged = SqliteSink::open_existing(&config.output.merged_path).unwrap();
    assert_eq!(merged.count().unwrap(), 10);

    let mut requested = requested_identifiers(&server).await;
    requested.sort_unstable();
    assert_eq!(requested, (91..=100).collect::<Vec<_>>());

    // Both partitions are complete, so a second run launches nothing
    let mut supervisor = Supervisor::new(&config, launcher(run_config)).unwrap();
    let report = supervisor
        .run_until(std::future::pending::<()>())
        .await
        .unwrap();
    assert_eq!(report.launched, 0);
    assert_eq!(report.completed, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_launch_failure_is_reported() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());

    let missing = ProcessLauncher::new(
        dir.path().join("no-such-binary"),
        config.output.run_config_path(),
    );
    let mut supervisor = Supervisor::new(&config, missing).unwrap();
    let report = supervisor
        .run_until(std::future::pending::<()>())
        .await
        .unwrap();

    assert_eq!(report.launched, 0);
    assert_eq!(report.unfinished, vec![1, 2]);
}
