// [libs/infra/db/src/client.rs]
/*!
 * Connection handle over libSQL/Turso. Transparently supports a local
 * file, an in-memory database (for tests, anchored so the schema survives
 * across connections), or a remote libsql:// replica.
 */

use crate::errors::DbError;
use crate::schema::apply_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct DbClient {
    driver: Arc<Database>,
    /// Keeps an in-memory database alive across connections; dropped it
    /// would let SQLite reclaim the whole schema between calls.
    _memory_anchor: Option<Arc<Connection>>,
}

impl DbClient {
    #[instrument(skip(auth_token))]
    pub async fn connect(database_url: &str, auth_token: Option<String>) -> Result<Self, DbError> {
        if database_url.is_empty() {
            return Err(DbError::ConfigurationError("DATABASE_URL is empty".into()));
        }

        let is_remote = database_url.starts_with("libsql://") || database_url.starts_with("https://");
        let is_memory = database_url.contains(":memory:");

        let database = if is_remote {
            let token = auth_token
                .ok_or_else(|| DbError::ConfigurationError("remote database requires an auth token".into()))?;
            Builder::new_remote(database_url.to_string(), token).build().await
        } else {
            Builder::new_local(database_url).build().await
        }
        .map_err(|err| DbError::ConnectionError(err.to_string()))?;

        let driver = Arc::new(database);
        let mut anchor = None;

        if is_memory {
            let anchor_connection = driver.connect().map_err(|err| DbError::ConnectionError(err.to_string()))?;
            apply_schema(&anchor_connection).await?;
            anchor = Some(Arc::new(anchor_connection));
        } else {
            let bootstrap = driver.connect().map_err(|err| DbError::ConnectionError(err.to_string()))?;
            apply_schema(&bootstrap).await?;
        }

        info!(url = %database_url, "database connected and schema applied");
        Ok(Self { driver, _memory_anchor: anchor })
    }

    pub fn connection(&self) -> Result<Connection, DbError> {
        self.driver.connect().map_err(|err| DbError::ConnectionError(err.to_string()))
    }
}
