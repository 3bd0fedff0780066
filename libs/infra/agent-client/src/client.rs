// [libs/infra/agent-client/src/client.rs]
/*!
 * Thin REST wrapper over the coordinator's file-sync surface. The
 * bidirectional task channel itself lives in `ws_channel`; this client
 * only covers the plain-HTTP endpoints: pulling a content-addressed file
 * and fetching its digest header so `file_sync` can verify it.
 */

use crate::errors::ClientError;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::instrument;

pub const CONTENT_DIGEST_HEADER: &str = "x-content-digest";

pub struct AgentHttpClient {
    http: Client,
    coordinator_base_url: String,
}

impl AgentHttpClient {
    pub fn new(coordinator_base_url: String, bearer_token: &str) -> Result<Self, ClientError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {bearer_token}"))
            .map_err(|_| ClientError::Unauthorized)?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .user_agent("prospector-agent/0.1")
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self { http, coordinator_base_url: coordinator_base_url.trim_end_matches('/').to_string() })
    }

    /// Fetches a content-addressed file's raw bytes and its advertised
    /// digest. `category` is one of wordlist, rule, binary, hashlist, or
    /// `rule-chunks/{job_id}`.
    #[instrument(skip(self))]
    pub async fn fetch_file(&self, category: &str, name: &str) -> Result<(Vec<u8>, Option<String>), ClientError> {
        let url = format!("{}/files/{}/{}", self.coordinator_base_url, category, name);
        let response = self.http.get(&url).send().await?;

        if response.status() != StatusCode::OK {
            return Err(ClientError::ServerRejection(format!("HTTP_{}", response.status())));
        }

        let digest = response
            .headers()
            .get(CONTENT_DIGEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), digest))
    }

    pub fn base_url(&self) -> &str {
        &self.coordinator_base_url
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }
}
