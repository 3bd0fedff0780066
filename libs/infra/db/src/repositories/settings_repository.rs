// [libs/infra/db/src/repositories/settings_repository.rs]
/*!
 * Scheduler settings persistence. Stored as a single JSON blob under one
 * key in the key-value table; a missing row (fresh database) falls back
 * to `SchedulerSettings::default()` rather than failing.
 */

use crate::errors::DbError;
use crate::DbClient;
use libsql::params;
use prospector_domain_models::settings::SchedulerSettings;
use tracing::{info, instrument};

const SETTINGS_KEY: &str = "scheduler_settings";

pub struct SettingsRepository {
    client: DbClient,
}

impl SettingsRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }

    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<SchedulerSettings, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query("SELECT value_text FROM system_settings WHERE key = ?1", params![SETTINGS_KEY])
            .await?;

        match rows.next().await? {
            Some(row) => {
                let raw: String = row.get(0)?;
                serde_json::from_str(&raw).map_err(|e| DbError::MappingError(e.to_string()))
            }
            None => {
                info!("no persisted settings row, hydrating defaults");
                Ok(SchedulerSettings::default())
            }
        }
    }

    #[instrument(skip(self, settings))]
    pub async fn save(&self, settings: &SchedulerSettings) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let serialized = serde_json::to_string(settings).map_err(|e| DbError::MappingError(e.to_string()))?;
        connection
            .execute(
                "INSERT INTO system_settings (key, value_text, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
                 ON CONFLICT(key) DO UPDATE SET value_text = excluded.value_text, updated_at = CURRENT_TIMESTAMP",
                params![SETTINGS_KEY, serialized],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_row_hydrates_defaults() {
        let client = DbClient::connect(":memory:", None).await.unwrap();
        let repo = SettingsRepository::new(client);

        let settings = repo.load().await.unwrap();
        assert_eq!(settings, SchedulerSettings::default());
    }

    #[tokio::test]
    async fn saved_overrides_round_trip() {
        let client = DbClient::connect(":memory:", None).await.unwrap();
        let repo = SettingsRepository::new(client);

        let mut overrides = SchedulerSettings::default();
        overrides.rule_split_enabled = false;
        overrides.max_job_priority = 50;
        repo.save(&overrides).await.unwrap();

        let reloaded = repo.load().await.unwrap();
        assert_eq!(reloaded, overrides);
    }
}
