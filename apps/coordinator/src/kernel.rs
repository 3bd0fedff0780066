// [apps/coordinator/src/kernel.rs]
//! Composition root: connects the database, builds `AppState`, spawns the
//! background daemons, and binds the HTTP/WebSocket server.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use prospector_domain_models::SchedulerSettings;
use prospector_infra_db::DbClient;
use tracing::{error, info, instrument};

use crate::bootstrap::Bootstrap;
use crate::routes::create_router;
use crate::services::{dispatcher, reaper};
use crate::state::AppState;

pub struct CoordinatorKernel {
    pub server_network_port: u16,
    pub application_state: AppState,
}

impl CoordinatorKernel {
    #[instrument(skip(database_auth_token, agent_bearer_token))]
    pub async fn ignite(
        database_url: &str,
        database_auth_token: Option<String>,
        files_root: PathBuf,
        agent_bearer_token: String,
        cracking_binary_name: String,
        listening_port: u16,
    ) -> Self {
        let database_client = DbClient::connect(database_url, database_auth_token)
            .await
            .expect("FATAL: could not establish the database connection, aborting ignition");

        let application_state =
            AppState::new(database_client, files_root, agent_bearer_token, cracking_binary_name, SchedulerSettings::default());

        Self { server_network_port: listening_port, application_state }
    }

    pub async fn launch_sovereign_operations(self) {
        let shared_state = self.application_state.clone();

        // Runs the settings/file-root integrity check in the background and
        // flips the coordinator operational once it passes.
        Bootstrap::spawn_diagnostics(shared_state.clone());

        dispatcher::spawn_dispatcher(shared_state.clone());
        reaper::spawn_reaper(shared_state.clone());

        let router = create_router(shared_state);

        let bind_address = SocketAddr::new("0.0.0.0".parse::<IpAddr>().unwrap(), self.server_network_port);
        info!(%bind_address, "coordinator listening");

        let listener = tokio::net::TcpListener::bind(bind_address)
            .await
            .expect("FATAL: failed to bind the coordinator's network port");

        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "coordinator server loop exited with an error");
            std::process::exit(1);
        }
    }
}
