// [libs/infra/db/src/schema.rs]
/*!
 * Schema bootstrap and evolution. Tables are created with `CREATE TABLE IF
 * NOT EXISTS`; new columns are added through idempotent `ALTER TABLE`
 * statements that tolerate "duplicate column name" errors, so the same
 * binary can run against a fresh database or one carried over from an
 * earlier version without a separate migration runner.
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

const BASE_TABLES: &[(&str, &str)] = &[
    ("TABLE_JOBS", r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            hashlist_id TEXT NOT NULL,
            hash_algorithm_id INTEGER NOT NULL,
            priority INTEGER DEFAULT 0,
            attack_mode TEXT NOT NULL,
            wordlist_refs TEXT NOT NULL DEFAULT '[]',
            rule_file_refs TEXT NOT NULL DEFAULT '[]',
            mask TEXT,
            base_keyspace INTEGER NOT NULL DEFAULT 0,
            total_keyspace INTEGER NOT NULL DEFAULT 0,
            effective_keyspace INTEGER NOT NULL DEFAULT 0,
            dispatched_keyspace INTEGER NOT NULL DEFAULT 0,
            is_accurate_keyspace INTEGER NOT NULL DEFAULT 0,
            avg_rule_multiplier REAL NOT NULL DEFAULT 1.0,
            uses_rule_splitting INTEGER NOT NULL DEFAULT 0,
            rule_split_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            max_agents INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            progress_percent REAL NOT NULL DEFAULT 0.0,
            keyspace_observed_actual_sum INTEGER NOT NULL DEFAULT 0,
            keyspace_observed_base_sum INTEGER NOT NULL DEFAULT 0
        );
    "#),
    ("TABLE_CHUNKS", r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            chunk_number INTEGER NOT NULL,
            assigned_agent_id INTEGER,
            keyspace_start INTEGER NOT NULL,
            keyspace_end INTEGER NOT NULL,
            effective_keyspace_start INTEGER NOT NULL,
            effective_keyspace_end INTEGER NOT NULL,
            effective_keyspace_processed INTEGER NOT NULL DEFAULT 0,
            rule_start_index INTEGER,
            rule_end_index INTEGER,
            rule_chunk_path TEXT,
            is_rule_split_task INTEGER NOT NULL DEFAULT 0,
            chunk_actual_keyspace INTEGER,
            status TEXT NOT NULL DEFAULT 'pending',
            detailed_status TEXT NOT NULL DEFAULT 'none',
            retry_count INTEGER NOT NULL DEFAULT 0,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            benchmark_speed INTEGER,
            chunk_duration_seconds INTEGER NOT NULL DEFAULT 0,
            progress_percent REAL NOT NULL DEFAULT 0.0,
            crack_count INTEGER NOT NULL DEFAULT 0,
            average_speed REAL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_AGENTS", r#"
        CREATE TABLE IF NOT EXISTS agents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            claim_code_limit INTEGER NOT NULL DEFAULT 1,
            enabled INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'inactive',
            last_heartbeat DATETIME,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            files_to_sync INTEGER NOT NULL DEFAULT 0,
            files_synced INTEGER NOT NULL DEFAULT 0,
            sync_error TEXT,
            devices_json TEXT NOT NULL DEFAULT '[]',
            schedule_json TEXT NOT NULL DEFAULT '[]',
            current_task_id TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_HASHLISTS", r#"
        CREATE TABLE IF NOT EXISTS hashlists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            hash_algorithm_id INTEGER NOT NULL,
            total_count INTEGER NOT NULL DEFAULT 0,
            cracked_count INTEGER NOT NULL DEFAULT 0,
            exclude_from_potfile INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_HASHES", r#"
        CREATE TABLE IF NOT EXISTS hashes (
            id TEXT PRIMARY KEY,
            hashlist_id TEXT NOT NULL,
            hash_value TEXT NOT NULL,
            normalized_value TEXT NOT NULL,
            username TEXT,
            domain TEXT,
            hash_algorithm_id INTEGER NOT NULL,
            is_cracked INTEGER NOT NULL DEFAULT 0,
            plaintext TEXT,
            cracked_by_chunk_id TEXT,
            last_updated DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(hashlist_id, normalized_value)
        );
    "#),
    ("TABLE_DEVICE_METRICS", r#"
        CREATE TABLE IF NOT EXISTS device_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id INTEGER NOT NULL,
            task_id TEXT,
            device_id INTEGER NOT NULL,
            hashrate INTEGER NOT NULL,
            temperature_celsius REAL,
            utilization_percent REAL,
            fan_speed_percent REAL,
            recorded_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_SYSTEM_SETTINGS", r#"
        CREATE TABLE IF NOT EXISTS system_settings (
            key TEXT PRIMARY KEY,
            value_text TEXT,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_OUTBOUND_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS outbound_events (
            id TEXT PRIMARY KEY,
            agent_id INTEGER NOT NULL,
            task_id TEXT,
            kind TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            received_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(id)
        );
    "#),
];

const EVOLUTIONARY_COLUMNS: &[(&str, &str)] = &[
    ("CHUNK_RECONNECT_DEADLINE", "ALTER TABLE chunks ADD COLUMN reconnect_deadline DATETIME"),
];

const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_CHUNKS_JOB", "CREATE INDEX IF NOT EXISTS idx_chunks_job ON chunks(job_id);"),
    ("IDX_CHUNKS_STATUS", "CREATE INDEX IF NOT EXISTS idx_chunks_status ON chunks(status);"),
    ("IDX_CHUNKS_AGENT", "CREATE INDEX IF NOT EXISTS idx_chunks_agent ON chunks(assigned_agent_id);"),
    ("IDX_HASHES_HASHLIST", "CREATE INDEX IF NOT EXISTS idx_hashes_hashlist ON hashes(hashlist_id);"),
    ("IDX_HASHES_NORMALIZED", "CREATE INDEX IF NOT EXISTS idx_hashes_normalized ON hashes(normalized_value);"),
    ("IDX_METRICS_AGENT", "CREATE INDEX IF NOT EXISTS idx_metrics_agent ON device_metrics(agent_id, recorded_at);"),
    ("IDX_OUTBOUND_AGENT", "CREATE INDEX IF NOT EXISTS idx_outbound_agent ON outbound_events(agent_id);"),
];

#[instrument(skip(connection))]
pub async fn apply_schema(connection: &Connection) -> Result<()> {
    info!("applying database schema");
    create_base_tables(connection).await?;
    apply_evolutionary_columns(connection).await?;
    create_indexes(connection).await?;
    Ok(())
}

async fn create_base_tables(connection: &Connection) -> Result<()> {
    for (name, sql) in BASE_TABLES {
        debug!(table = name, "creating table if absent");
        connection.execute(sql, ()).await.with_context(|| format!("failed to create {name}"))?;
    }
    Ok(())
}

async fn apply_evolutionary_columns(connection: &Connection) -> Result<()> {
    for (name, sql) in EVOLUTIONARY_COLUMNS {
        match connection.execute(sql, ()).await {
            Ok(_) => debug!(column = name, "evolutionary column applied"),
            Err(err) => {
                if err.to_string().contains("duplicate column name") {
                    debug!(column = name, "evolutionary column already present");
                } else {
                    warn!(column = name, %err, "evolutionary column check incomplete");
                }
            }
        }
    }
    Ok(())
}

async fn create_indexes(connection: &Connection) -> Result<()> {
    for (name, sql) in ACCELERATION_INDEXES {
        connection.execute(sql, ()).await.with_context(|| format!("failed to create index {name}"))?;
    }
    Ok(())
}
