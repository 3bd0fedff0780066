// [libs/infra/db/src/sql_enum.rs]
/*!
 * Domain enums persist as their serde `snake_case` string representation
 * rather than a parallel hand-written mapping, so adding a variant only
 * ever requires touching the domain crate.
 */

use crate::errors::DbError;
use serde::{de::DeserializeOwned, Serialize};

pub fn to_sql_string<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        other => unreachable!("domain enum must serialize to a JSON string, got {other:?}"),
    }
}

pub fn from_sql_string<T: DeserializeOwned>(raw: &str) -> Result<T, DbError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|err| DbError::MappingError(format!("invalid enum value '{raw}': {err}")))
}
