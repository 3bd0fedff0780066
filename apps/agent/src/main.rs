// [apps/agent/src/main.rs]
//! Agent binary entry point: parses its CLI/environment directives, builds
//! the HTTP and file-sync clients plus the durable outbox, and hands
//! control to `AgentExecutor`'s reconnect loop until a termination signal
//! arrives.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use prospector_agent_lib::AgentExecutor;
use prospector_infra_agent_client::{AgentHttpClient, FileSyncClient};
use prospector_infra_transport::DurableOutbox;
use prospector_shared_telemetry::init_tracing;
use tracing::{info, warn};

const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;
const DEFAULT_FILE_SYNC_MAX_RETRIES: u32 = 5;

/// Command-line/environment directives for one agent process. An agent
/// speaks for exactly one registered agent row, identified by `agent_id`.
#[derive(Parser, Debug)]
#[command(author, version, about = "Prospector fleet agent: syncs inputs, runs the cracking engine as a subprocess, reports progress and cracks")]
struct AgentDirectives {
    /// Coordinator base URL for the plain-HTTP file-sync surface, e.g. http://coordinator:3000
    #[arg(long, env = "COORDINATOR_URL")]
    coordinator_url: String,

    /// Coordinator base URL for the websocket channel, e.g. ws://coordinator:3000/agent/channel
    #[arg(long, env = "COORDINATOR_WS_URL")]
    coordinator_ws_url: String,

    /// Shared bearer token presented on both the HTTP and websocket surfaces.
    #[arg(long, env = "AGENT_BEARER_TOKEN")]
    bearer_token: String,

    /// This agent's registered identity in the coordinator's agent table.
    #[arg(long, env = "AGENT_ID")]
    agent_id: i64,

    /// Local directory synced inputs, the durable outbox and the pid file are cached under.
    #[arg(long, env = "AGENT_CACHE_DIR", default_value = "./agent-cache")]
    cache_dir: PathBuf,

    /// Name of the cracking-engine binary fetched from the `binaries` file-sync category.
    #[arg(long, env = "CRACKING_BINARY_NAME", default_value = "hashcat")]
    cracking_binary_name: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing("prospector_agent");

    let directives = AgentDirectives::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async {
        info!(agent_id = directives.agent_id, "agent ignition sequence starting");

        tokio::fs::create_dir_all(&directives.cache_dir).await.expect("FATAL: could not claim the agent cache directory");
        let outbox_dir = directives.cache_dir.join("outbox");

        let http = Arc::new(
            AgentHttpClient::new(directives.coordinator_url.clone(), &directives.bearer_token)
                .expect("FATAL: could not build the coordinator HTTP client"),
        );
        let file_sync = Arc::new(FileSyncClient::new(Arc::clone(&http), DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_FILE_SYNC_MAX_RETRIES));
        let outbox = Arc::new(DurableOutbox::open(&outbox_dir).expect("FATAL: could not open the durable outbox"));

        let terminated = Arc::new(AtomicBool::new(false));
        let signal_flag = Arc::clone(&terminated);
        if let Err(err) = ctrlc::set_handler(move || {
            warn!("termination requested, draining in-flight work before shutdown");
            signal_flag.store(true, Ordering::SeqCst);
        }) {
            warn!(%err, "failed to install the ctrl-c handler, relying on process kill for shutdown");
        }

        let executor = AgentExecutor::new(
            directives.agent_id,
            directives.coordinator_ws_url,
            directives.bearer_token,
            directives.cache_dir,
            directives.cracking_binary_name,
            http,
            file_sync,
            outbox,
            terminated,
        );

        executor.run().await;

        info!("agent shutdown sequence concluded");
    });

    Ok(())
}
