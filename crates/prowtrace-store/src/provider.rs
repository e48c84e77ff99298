//! Artifact storage backends.

use crate::{Result, StoreError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use tracing::debug;

/// Read-only access to one job's artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Raw bytes of the document at `path`, relative to the job's base location.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Human-readable base location, for logs.
    fn location(&self) -> String;
}

/// Google Cloud Storage over its public HTTP endpoint.
///
/// Job paths look like `<bucket>/<prefix...>`, e.g.
/// `istio-prow/pr-logs/pull/istio_istio/45746/integ-pilot_istio/1674927910177214464`.
pub struct GcsStore {
    client: Client,
    endpoint: String,
    bucket: String,
    base: String,
}

impl GcsStore {
    pub fn new(endpoint: &str, job_path: &str) -> Result<Self> {
        let trimmed = job_path.trim_matches('/');
        let (bucket, base) = trimmed
            .split_once('/')
            .filter(|(bucket, base)| !bucket.is_empty() && !base.is_empty())
            .ok_or_else(|| StoreError::InvalidJobPath(job_path.to_string()))?;

        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.endpoint,
            self.bucket,
            self.base,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ArtifactStore for GcsStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.object_url(path);
        debug!(%url, "fetching artifact");

        let res = self.client.get(&url).send().await?;
        match res.status() {
            StatusCode::OK => Ok(res.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(format!("gs://{}/{}/{}", self.bucket, self.base, path))),
            status => Err(StoreError::Transport(format!("{url}: {status}"))),
        }
    }

    fn location(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.base)
    }
}

/// Artifacts already downloaded into a local directory.
pub struct FilesystemStore {
    root_dir: PathBuf,
}

impl FilesystemStore {
    pub fn new(root_dir: PathBuf) -> Self {
        Self { root_dir }
    }
}

#[async_trait]
impl ArtifactStore for FilesystemStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.root_dir.join(path);
        debug!(path = %file.display(), "reading artifact");

        tokio::fs::read(&file).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(file.display().to_string()),
            _ => StoreError::Io(e),
        })
    }

    fn location(&self) -> String {
        self.root_dir.display().to_string()
    }
}
