//! Worker runs against a mock remote source

use crate::common::{
    create_test_config, mount_fleet, mount_full_range, mount_home, mount_private,
    requested_identifiers,
};
use fleet_harvest::checkpoint::{Checkpoint, CheckpointStore};
use fleet_harvest::page::HttpPageClient;
use fleet_harvest::storage::{Sink, SqliteSink};
use fleet_harvest::supervisor::{plan_run, ResumePoint};
use fleet_harvest::worker::{run_worker_process, Worker, WorkerExit, WorkerRange};
use fleet_harvest::{Direction, Origin};
use wiremock::MockServer;

fn first_partition(sink: &std::path::Path) -> WorkerRange {
    WorkerRange {
        worker_id: 1,
        start_identifier: 100,
        end_identifier: 95,
        direction: Direction::Descending,
        sink_location: sink.to_path_buf(),
    }
}

async fn mount_mixed_partition(server: &MockServer) {
    mount_home(server).await;
    mount_fleet(server, 100, "Empire", 500).await;
    mount_fleet(server, 99, "Empire", 400).await;
    mount_private(server, 98).await;
    mount_fleet(server, 97, "Rebel", 374).await;
    mount_fleet(server, 96, "Rebel", 375).await;
}

#[tokio::test]
async fn test_worker_persists_public_records_above_threshold() {
    let server = MockServer::start().await;
    mount_mixed_partition(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());
    let sink_path = config.output.sink_path(1);

    let page = HttpPageClient::new(&config.page).expect("Failed to build session");
    let sink = SqliteSink::new(&sink_path).expect("Failed to open sink");
    let mut worker = Worker::new(first_partition(&sink_path), page, sink, &config).unwrap();

    let stats = worker.run().await.expect("Worker failed");

    assert_eq!(stats.processed, 5);
    assert_eq!(stats.persisted, 3);
    assert_eq!(stats.private, 1);
    assert_eq!(stats.low_points, 1);
    assert_eq!(requested_identifiers(&server).await, vec![100, 99, 98, 97, 96]);

    let sink = SqliteSink::open_existing(&sink_path).unwrap();
    assert_eq!(sink.count().unwrap(), 3);
    assert!(!sink.contains(98).unwrap());
    assert!(!sink.contains(97).unwrap());

    let record = sink.get(96).unwrap().expect("96 should be stored");
    assert_eq!(record.faction, "Rebel");
    assert_eq!(record.commander, "Grand Admiral Thrawn");
    assert_eq!(record.points, 375);
    assert_eq!(record.origin, Origin::Shared);
    assert!(record.raw_payload.contains("Total Points: 375"));

    let checkpoint = CheckpointStore::new(config.output.checkpoint_dir())
        .load(1)
        .unwrap()
        .expect("Checkpoint should exist");
    assert!(checkpoint.completed);
    assert_eq!(checkpoint.last_identifier, 96);
}

#[tokio::test]
async fn test_rerun_does_not_refetch_stored_records() {
    let server = MockServer::start().await;
    mount_mixed_partition(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());
    let sink_path = config.output.sink_path(1);

    for _ in 0..2 {
        let page = HttpPageClient::new(&config.page).unwrap();
        let sink = SqliteSink::new(&sink_path).unwrap();
        let mut worker = Worker::new(first_partition(&sink_path), page, sink, &config).unwrap();
        worker.run().await.expect("Worker failed");
    }

    let requests = requested_identifiers(&server).await;
    assert_eq!(requests.iter().filter(|id| **id == 100).count(), 1);
    assert_eq!(requests.iter().filter(|id| **id == 96).count(), 1);
    // Private and low-point records are never stored, so they are asked for again
    assert_eq!(requests.iter().filter(|id| **id == 98).count(), 2);

    let sink = SqliteSink::open_existing(&sink_path).unwrap();
    assert_eq!(sink.count().unwrap(), 3);
}

#[tokio::test]
async fn test_restarted_worker_resumes_after_stored_identifier() {
    let server = MockServer::start().await;
    mount_full_range(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());

    // Worker 2 died right after storing 95
    let sink_path = config.output.sink_path(2);
    {
        let page = HttpPageClient::new(&config.page).unwrap();
        let sink = SqliteSink::new(&sink_path).unwrap();
        let range = WorkerRange {
            worker_id: 2,
            start_identifier: 95,
            end_identifier: 94,
            direction: Direction::Descending,
            sink_location: sink_path.clone(),
        };
        let mut worker = Worker::new(range, page, sink, &config).unwrap();
        worker.run().await.unwrap();
    }
    CheckpointStore::new(config.output.checkpoint_dir())
        .save(&Checkpoint::new(2, 95))
        .unwrap();
    server.reset().await;
    mount_full_range(&server).await;

    let plan = plan_run(&config).unwrap();
    assert_eq!(plan[1].1, ResumePoint::Checkpoint(95));

    let range = plan[1].0.resume_at(95, sink_path.clone());
    let exit = run_worker_process(config.clone(), range)
        .await
        .expect("Worker failed");

    match exit {
        WorkerExit::Completed(stats) => {
            assert_eq!(stats.already_present, 1);
            assert_eq!(stats.persisted, 4);
        }
        other => panic!("Unexpected exit: {:?}", other),
    }
    assert_eq!(requested_identifiers(&server).await, vec![94, 93, 92, 91]);

    let sink = SqliteSink::open_existing(&sink_path).unwrap();
    assert_eq!(sink.count().unwrap(), 5);
    assert_eq!(plan_run(&config).unwrap()[1].1, ResumePoint::Completed);
}

#[tokio::test]
async fn test_missing_export_view_gives_up_identifier() {
    let server = MockServer::start().await;
    mount_home(&server).await;
    mount_fleet(&server, 100, "Empire", 500).await;
    // 99 to 96 answer 404, which is a transient failure with the network up

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());
    let sink_path = config.output.sink_path(1);

    let page = HttpPageClient::new(&config.page).unwrap();
    let sink = SqliteSink::new(&sink_path).unwrap();
    let mut worker = Worker::new(first_partition(&sink_path), page, sink, &config).unwrap();
    let stats = worker.run().await.expect("Worker failed");

    assert_eq!(stats.processed, 5);
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.given_up, 4);

    // Each missing identifier is attempted max-step-retries times
    let requests = requested_identifiers(&server).await;
    let retries = config.pipeline.max_step_retries as usize;
    assert_eq!(requests.iter().filter(|id| **id == 99).count(), retries);
}
