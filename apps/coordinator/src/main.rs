// [apps/coordinator/src/main.rs]
//! Coordinator binary entry point: loads configuration from the
//! environment, ignites the kernel, and launches the background daemons
//! and HTTP/WebSocket server.

use std::path::PathBuf;

use dotenvy::dotenv;
use prospector_coordinator::kernel::CoordinatorKernel;
use prospector_shared_telemetry::init_tracing;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing("prospector_coordinator");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async {
        info!("coordinator ignition sequence starting");

        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let database_auth_token = std::env::var("TURSO_AUTH_TOKEN").ok();
        let files_root = std::env::var("FILES_ROOT").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./files"));
        let agent_bearer_token = std::env::var("AGENT_BEARER_TOKEN").expect("AGENT_BEARER_TOKEN must be set");
        let cracking_binary_name = std::env::var("CRACKING_BINARY_NAME").unwrap_or_else(|_| "hashcat".to_string());
        let listening_port: u16 = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().unwrap_or(3000);

        let kernel = CoordinatorKernel::ignite(
            &database_url,
            database_auth_token,
            files_root,
            agent_bearer_token,
            cracking_binary_name,
            listening_port,
        )
        .await;

        kernel.launch_sovereign_operations().await;
    });

    Ok(())
}
