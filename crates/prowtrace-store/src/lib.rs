//! Artifact retrieval for archived CI jobs.
//!
//! A job's artifacts live under one base location: a bucket prefix in
//! object storage or a local directory. Documents are fetched one at a time
//! and decoded as JSON.

pub mod error;
pub mod fetch;
pub mod provider;

pub use error::{Result, StoreError};
pub use fetch::{
    CLONE_RECORDS_PATH, FINISHED_PATH, PODINFO_PATH, PROWJOB_PATH, STARTED_PATH, fetch,
    fetch_artifacts,
};
pub use provider::{ArtifactStore, FilesystemStore, GcsStore};
