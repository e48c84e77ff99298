//! Typed fetches of the documents a reconstruction needs.

use crate::provider::ArtifactStore;
use crate::{Result, StoreError};
use prowtrace_core::artifacts::ArtifactSet;
use serde::de::DeserializeOwned;
use tracing::info;

pub const PROWJOB_PATH: &str = "prowjob.json";
pub const STARTED_PATH: &str = "started.json";
pub const FINISHED_PATH: &str = "finished.json";
pub const PODINFO_PATH: &str = "podinfo.json";
pub const CLONE_RECORDS_PATH: &str = "clone-records.json";

/// Fetch `path` and decode it as `T`.
pub async fn fetch<T, S>(store: &S, path: &str) -> Result<T>
where
    T: DeserializeOwned,
    S: ArtifactStore + ?Sized,
{
    let bytes = store.read(path).await?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
        path: path.to_string(),
        source,
    })
}

/// Fetch every document, in order. The first failure aborts the whole set.
pub async fn fetch_artifacts<S: ArtifactStore + ?Sized>(store: &S) -> Result<ArtifactSet> {
    info!(location = %store.location(), "fetching job artifacts");

    let prow_job = fetch(store, PROWJOB_PATH).await?;
    let started = fetch(store, STARTED_PATH).await?;
    let finished = fetch(store, FINISHED_PATH).await?;
    let pod_report = fetch(store, PODINFO_PATH).await?;
    let clone_records = fetch(store, CLONE_RECORDS_PATH).await?;

    Ok(ArtifactSet {
        prow_job,
        started,
        finished,
        pod_report,
        clone_records,
    })
}
