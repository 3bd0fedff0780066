// [apps/coordinator/src/handlers/files.rs]
//! Serves the content-addressed files agents sync before running a task:
//! wordlists, rule files and cracking-engine binaries, all read from
//! `files_root/{category}/{name}`.

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use sha2::{Digest, Sha256};
use tracing::{instrument, warn};

use crate::state::AppState;

pub const CONTENT_DIGEST_HEADER: &str = "x-content-digest";

/// Category names are restricted to a fixed allow-list and the file name
/// may not contain path separators, so a malicious agent cannot traverse
/// outside `files_root`. `rule-chunks` is the one category with a nested
/// `{job_id}/{chunk_name}` layout, so it alone permits a single `/`.
const ALLOWED_CATEGORIES: &[&str] = &["wordlists", "rules", "rule-chunks", "binaries", "masks", "hashlists"];

#[instrument(skip(state), fields(category = %category, name = %name))]
pub async fn fetch_file(State(state): State<AppState>, Path((category, name)): Path<(String, String)>) -> impl IntoResponse {
    if !ALLOWED_CATEGORIES.contains(&category.as_str()) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let nested_allowed = category == "rule-chunks" && name.matches('/').count() == 1 && !name.starts_with('/');
    if name.contains("..") || (name.contains('/') && !nested_allowed) {
        warn!(category, name, "rejected file-sync request with suspicious name");
        return StatusCode::BAD_REQUEST.into_response();
    }

    let path = state.files_root.join(&category).join(&name);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(category, name, error = %e, "file-sync request for missing or unreadable file");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let digest = hex::encode(Sha256::digest(&bytes));
    let mut response = bytes.into_response();
    if let Ok(header_value) = HeaderValue::from_str(&digest) {
        response.headers_mut().insert(CONTENT_DIGEST_HEADER, header_value);
    }
    response
}
