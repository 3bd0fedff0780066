// [libs/infra/db/src/lib.rs]
/*!
 * =================================================================
 * APARATO: PERSISTENCE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: ESQUEMA, CONEXION Y REPOSITORIOS SOBRE LIBSQL
 * =================================================================
 */

pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;
mod sql_enum;

pub use client::DbClient;
pub use errors::DbError;
pub use repositories::{
    AgentRepository, ChunkRepository, HashRepository, JobRepository, MetricsRepository, SettingsRepository,
};

use chrono::{DateTime, Utc};

/// libSQL returns `DATETIME` columns as `CURRENT_TIMESTAMP`-formatted
/// strings (`%Y-%m-%d %H:%M:%S`) or, for values this crate itself writes
/// via `chrono`, RFC 3339. Accept either so rows seeded by the schema's
/// own `DEFAULT CURRENT_TIMESTAMP` and rows written by the application
/// parse the same way.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DbError::MappingError(format!("unparseable timestamp '{raw}': {e}")))
}
