// [libs/infra/agent-client/src/file_sync.rs]
/*!
 * Lazy content-addressed file sync. Agents only pull what a task
 * assignment actually references, verify the digest once downloaded, and
 * retry transient failures with exponential backoff plus jitter so a
 * thundering herd of agents doesn't hammer the coordinator in lockstep.
 *
 * Concurrency is bounded by a semaphore sized `max_concurrent_downloads`
 * (default 3) so one chunk assignment referencing several wordlists and
 * rule files doesn't saturate the agent's uplink.
 */

use crate::client::AgentHttpClient;
use crate::errors::ClientError;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub category: String,
    pub name: String,
    pub destination: PathBuf,
}

pub struct FileSyncClient {
    http: Arc<AgentHttpClient>,
    semaphore: Arc<Semaphore>,
    max_retries: u32,
}

impl FileSyncClient {
    pub fn new(http: Arc<AgentHttpClient>, max_concurrent_downloads: usize, max_retries: u32) -> Self {
        Self { http, semaphore: Arc::new(Semaphore::new(max_concurrent_downloads.max(1))), max_retries }
    }

    /// Syncs every requested file concurrently (bounded by the semaphore),
    /// skipping files already present on disk. Returns once every request
    /// has either succeeded or exhausted its retries.
    pub async fn sync_all(&self, requests: Vec<SyncRequest>) -> Result<(), ClientError> {
        let tasks = requests.into_iter().map(|request| {
            let http = self.http.clone();
            let semaphore = self.semaphore.clone();
            let max_retries = self.max_retries;
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                sync_one(&http, &request, max_retries).await
            }
        });

        let results = futures::future::join_all(tasks).await;
        for result in results {
            result?;
        }
        Ok(())
    }
}

async fn sync_one(http: &AgentHttpClient, request: &SyncRequest, max_retries: u32) -> Result<(), ClientError> {
    if request.destination.exists() {
        debug!(path = %request.destination.display(), "file already present, skipping sync");
        return Ok(());
    }

    let mut attempt = 0u32;
    loop {
        match try_download_and_verify(http, request).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < max_retries => {
                attempt += 1;
                let backoff = backoff_with_jitter(attempt);
                warn!(
                    category = %request.category,
                    name = %request.name,
                    attempt,
                    %err,
                    "file sync failed, retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(_) => return Err(ClientError::SyncExhausted(request.name.clone())),
        }
    }
}

async fn try_download_and_verify(http: &AgentHttpClient, request: &SyncRequest) -> Result<(), ClientError> {
    let (bytes, expected_digest) = http.fetch_file(&request.category, &request.name).await?;

    if let Some(expected) = expected_digest {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let actual = hex::encode(hasher.finalize());
        if actual != expected {
            return Err(ClientError::DigestMismatch { expected, actual });
        }
    }

    if let Some(parent) = request.destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&request.destination, &bytes).await?;
    info!(path = %request.destination.display(), bytes = bytes.len(), "file synced");
    Ok(())
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base_ms = 200u64.saturating_mul(1u64 << attempt.min(6));
    let jitter_ms = rand::thread_rng().gen_range(0..=base_ms / 2);
    Duration::from_millis(base_ms + jitter_ms)
}

pub fn is_synced(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempt_number() {
        let first = backoff_with_jitter(1).as_millis();
        let third = backoff_with_jitter(3).as_millis();
        assert!(third >= first);
    }

    #[test]
    fn is_synced_reports_existing_paths() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert!(is_synced(tmp.path()));
    }
}
