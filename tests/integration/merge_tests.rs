//! Merging sinks written by real worker runs

use crate::common::{create_test_config, mount_full_range};
use fleet_harvest::page::HttpPageClient;
use fleet_harvest::storage::{merge_sinks, Sink, SqliteSink, DEFAULT_MERGE_CHUNK};
use fleet_harvest::worker::{partition, Worker};
use fleet_harvest::Direction;
use wiremock::MockServer;

#[tokio::test]
async fn test_merge_of_worker_sinks_is_deduplicated() {
    let server = MockServer::start().await;
    mount_full_range(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());

    for part in partition(100, 90, 2, Direction::Descending).unwrap() {
        let sink_path = config.output.sink_path(part.worker_id);
        let range = part.resume_at(part.start, sink_path.clone());
        let page = HttpPageClient::new(&config.page).unwrap();
        let sink = SqliteSink::new(&sink_path).unwrap();
        Worker::new(range, page, sink, &config)
            .unwrap()
            .run()
            .await
            .expect("Worker failed");
    }

    // A stray copy of worker 1's output overlaps it completely
    let stray = dir.path().join("stray.db");
    std::fs::copy(config.output.sink_path(1), &stray).unwrap();

    let mut sources = config.output.sink_paths(2);
    sources.push(stray);
    sources.push(dir.path().join("never-written.db"));

    let report = merge_sinks(&sources, &config.output.merged_path, DEFAULT_MERGE_CHUNK)
        .expect("Merge failed");

    assert_eq!(report.sources_merged, 3);
    assert_eq!(report.records_read, 15);
    assert_eq!(report.records_inserted, 10);
    assert_eq!(report.duplicates_ignored, 5);
    assert_eq!(report.skipped.len(), 1);

    let merged = SqliteSink::open_existing(&config.output.merged_path).unwrap();
    assert_eq!(merged.count().unwrap(), 10);
    assert_eq!(merged.min_identifier().unwrap(), Some(91));
    assert_eq!(merged.max_identifier().unwrap(), Some(100));
}

#[tokio::test]
async fn test_merge_twice_changes_nothing() {
    let server = MockServer::start().await;
    mount_full_range(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, dir.path());
    let part = partition(100, 90, 2, Direction::Descending).unwrap()[0];
    let sink_path = config.output.sink_path(1);

    let page = HttpPageClient::new(&config.page).unwrap();
    let sink = SqliteSink::new(&sink_path).unwrap();
    Worker::new(part.resume_at(part.start, sink_path.clone()), page, sink, &config)
        .unwrap()
        .run()
        .await
        .unwrap();

    let first = merge_sinks(&[sink_path.clone()], &config.output.merged_path, 2).unwrap();
    let second = merge_sinks(&[sink_path], &config.output.merged_path, 2).unwrap();

    assert_eq!(first.records_inserted, 5);
    assert_eq!(second.records_inserted, 0);
    assert_eq!(second.duplicates_ignored, 5);

    let merged = SqliteSink::open_existing(&config.output.merged_path).unwrap();
    assert_eq!(merged.count().unwrap(), 5);
}
