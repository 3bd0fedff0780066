// [libs/infra/db/src/repositories/metrics_repository.rs]
/*!
 * Append-only per-device telemetry stream. Never updated in place; a
 * retention sweep (if one is ever added) would delete by `recorded_at`
 * rather than aggregate rows down.
 */

use crate::errors::DbError;
use crate::DbClient;
use libsql::params;
use prospector_domain_models::message::DeviceMetrics;
use uuid::Uuid;

pub struct MetricsRepository {
    client: DbClient,
}

impl MetricsRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }

    pub async fn record(&self, agent_id: i64, task_id: Option<Uuid>, metrics: &[DeviceMetrics]) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        for metric in metrics {
            connection
                .execute(
                    "INSERT INTO device_metrics (
                        agent_id, task_id, device_id, hashrate, temperature_celsius, utilization_percent, fan_speed_percent
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        agent_id,
                        task_id.map(|id| id.to_string()),
                        metric.device_id as i64,
                        metric.hashrate as i64,
                        metric.temperature_celsius.map(|v| v as f64),
                        metric.utilization_percent.map(|v| v as f64),
                        metric.fan_speed_percent.map(|v| v as f64),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    pub async fn recent_for_agent(&self, agent_id: i64, limit: i64) -> Result<Vec<(i64, u32, i64)>, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query(
                "SELECT device_id, hashrate, CAST(strftime('%s', recorded_at) AS INTEGER)
                 FROM device_metrics WHERE agent_id = ?1 ORDER BY recorded_at DESC LIMIT ?2",
                params![agent_id, limit],
            )
            .await?;
        let mut samples = Vec::new();
        while let Some(row) = rows.next().await? {
            let device_id: i64 = row.get(0)?;
            let hashrate: i64 = row.get(1)?;
            let recorded_at: i64 = row.get(2)?;
            samples.push((device_id, hashrate as u32, recorded_at));
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recorded_metrics_are_retrievable() {
        let client = DbClient::connect(":memory:", None).await.unwrap();
        let repo = MetricsRepository::new(client);

        let metrics = vec![DeviceMetrics {
            device_id: 0,
            hashrate: 1_200_000,
            temperature_celsius: Some(62.0),
            utilization_percent: Some(98.0),
            fan_speed_percent: Some(70.0),
        }];
        repo.record(1, None, &metrics).await.unwrap();

        let samples = repo.recent_for_agent(1, 10).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].1, 1_200_000);
    }
}
