//! Error types for `schemata-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::table::TableId;

/// What kind of entity a name collision happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScope {
  Table,
  Column,
}

impl std::fmt::Display for NameScope {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Table => f.write_str("table"),
      Self::Column => f.write_str("column"),
    }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("document is not valid JSON: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("{scope} name already in use: {name:?}")]
  DuplicateName { scope: NameScope, name: String },

  #[error("validation failed: {0}")]
  Validation(String),

  #[error("a save for this document is already in progress")]
  SaveInProgress,

  #[error("table not found: {0}")]
  TableNotFound(TableId),

  #[error("column {column:?} not found in table {table}")]
  ColumnNotFound { table: TableId, column: String },

  #[error("version not found: {0}")]
  VersionNotFound(Uuid),

  #[error("version {0} has no document snapshot")]
  MissingSnapshot(Uuid),

  #[error("activation of version {0} could not be confirmed")]
  ActivationUnconfirmed(Uuid),

  #[error("version history has {0} active versions")]
  MultipleActive(usize),

  /// The raw document could not be brought in line with the canonical model.
  /// The mutation that hit this was not applied.
  #[error("raw document out of sync: {0}")]
  Sync(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
