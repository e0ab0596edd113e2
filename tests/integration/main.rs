//! Integration tests for Fleet-Harvest
//!
//! These tests use wiremock to stand in for the remote source and drive
//! workers, merges and the supervisor end-to-end.

mod common;
mod merge_tests;
mod supervisor_tests;
mod worker_tests;
