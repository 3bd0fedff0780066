// [apps/coordinator/src/bootstrap.rs]
//! Boot-time integrity check: hydrates runtime settings from persistence
//! and confirms the on-disk file-sync root looks sane before the
//! coordinator starts accepting dispatch-affecting traffic. Runs in the
//! background so the HTTP server can answer `/health` immediately, even
//! while this is still in flight (`health_guard` rejects dispatch-adjacent
//! routes with a 503 until it flips the mode to `Operational`).

use tracing::{error, info, instrument, warn};

use crate::state::{AppState, SystemMode};

pub struct Bootstrap;

impl Bootstrap {
    #[instrument(skip(state))]
    pub fn spawn_diagnostics(state: AppState) {
        tokio::spawn(async move {
            info!("boot-time integrity check starting");
            match Self::run_integrity_check(&state).await {
                Ok(()) => {
                    info!("boot-time integrity check passed, coordinator is operational");
                    state.set_mode(SystemMode::Operational);
                }
                Err(e) => {
                    let reason = format!("bootstrap check failed: {e}");
                    error!(%reason, "coordinator entering maintenance mode");
                    state.set_mode(SystemMode::Maintenance(reason));
                }
            }
        });
    }

    async fn run_integrity_check(state: &AppState) -> anyhow::Result<()> {
        let settings = state.settings_repository.load().await?;
        state.replace_settings(settings);

        if !state.files_root.is_dir() {
            tokio::fs::create_dir_all(state.files_root.as_path()).await?;
            info!(files_root = %state.files_root.display(), "created missing file-sync root");
        }

        let binary_path = state.files_root.join("binaries").join(state.cracking_binary_name.as_str());
        if !binary_path.is_file() {
            warn!(path = %binary_path.display(), "configured cracking binary is not present yet; it must be synced before any job can run");
        }

        Ok(())
    }
}
