//! Merging per-worker sinks into one destination

use crate::storage::sqlite::SqliteSink;
use crate::storage::traits::SinkResult;
use std::path::{Path, PathBuf};

/// Records copied per read/insert round
pub const DEFAULT_MERGE_CHUNK: usize = 1000;

/// Summary of a merge run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Sources read to the end
    pub sources_merged: usize,
    pub records_read: u64,
    pub records_inserted: u64,
    /// Records whose identifier was already in the destination
    pub duplicates_ignored: u64,
    /// Sources left out, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// Merges every source sink into `destination`
///
/// Sources are read sequentially in identifier order, `chunk_size` records at a
/// time, and inserted with ignore-on-conflict, so the first source to supply an
/// identifier wins. Missing, corrupt or schema-less sources are skipped and
/// listed in the report; only a destination failure aborts the merge.
///
/// # Arguments
///
/// * `sources` - Per-worker sink files
/// * `destination` - Merged sink, created if needed
/// * `chunk_size` - Records per round
pub fn merge_sinks(
    sources: &[PathBuf],
    destination: &Path,
    chunk_size: usize,
) -> SinkResult<MergeReport> {
    let chunk_size = chunk_size.max(1);
    let mut dest = SqliteSink::new(destination)?;
    let mut report = MergeReport::default();

    for source in sources {
        if source.as_path() == destination {
            skip(&mut report, source, "source is the merge destination".to_string());
            continue;
        }

        let reader = match SqliteSink::open_existing(source) {
            Ok(reader) => reader,
            Err(e) => {
                skip(&mut report, source, e.to_string());
                continue;
            }
        };

        let mut cursor = None;
        let mut read = 0u64;
        let mut inserted = 0u64;
        let mut failed = None;

        loop {
            let chunk = match reader.records_after(cursor, chunk_size) {
                Ok(chunk) => chunk,
                Err(e) => {
                    failed = Some(e.to_string());
                    break;
                }
            };
            let Some(last) = chunk.last() else {
                break;
            };
            cursor = Some(last.identifier);

            read += chunk.len() as u64;
            inserted += dest.insert_batch(&chunk)?;
        }

        report.records_read += read;
        report.records_inserted += inserted;
        report.duplicates_ignored += read - inserted;

        match failed {
            Some(reason) => skip(&mut report, source, reason),
            None => {
                report.sources_merged += 1;
                tracing::info!(
                    "Merged {}: {} records read, {} new",
                    source.display(),
                    read,
                    inserted
                );
            }
        }
    }

    tracing::info!(
        "Merge complete: {} sources, {} records inserted, {} duplicates ignored, {} skipped",
        report.sources_merged,
        report.records_inserted,
        report.duplicates_ignored,
        report.skipped.len()
    );

    Ok(report)
}

fn skip(report: &mut MergeReport, source: &Path, reason: String) {
    tracing::warn!("Skipping {} during merge: {}", source.display(), reason);
    report.skipped.push((source.to_path_buf(), reason));
}
