// [libs/infra/agent-client/src/lib.rs]
/*!
 * Everything the agent binary needs to talk to the coordinator: a REST
 * client for content-addressed file pulls, a semaphore-bounded sync
 * engine that verifies digests and retries with backoff, and the
 * websocket channel carrying task assignments and status traffic.
 */

pub mod client;
pub mod errors;
pub mod file_sync;
pub mod ws_channel;

pub use client::{AgentHttpClient, CONTENT_DIGEST_HEADER};
pub use errors::ClientError;
pub use file_sync::{FileSyncClient, SyncRequest};
pub use ws_channel::{connect, recv_envelope, send_envelope, AgentSocket};
