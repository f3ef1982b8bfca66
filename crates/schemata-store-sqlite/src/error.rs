//! Error type for `schemata-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown version status: {0:?}")]
  Status(String),

  #[error("schema not found: {0}")]
  SchemaNotFound(String),

  #[error("version {version} not found for schema {schema}")]
  VersionNotFound { schema: String, version: uuid::Uuid },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
