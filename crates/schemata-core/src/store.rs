//! The `SchemaStore` trait — the boundary between the editor and wherever
//! schema documents are persisted.
//!
//! Implemented by `schemata-client` (remote HTTP service) and
//! `schemata-store-sqlite` (local file). The editing session depends only on
//! this abstraction.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::version::Version;

/// Acknowledgement returned by [`SchemaStore::save_document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveAck {
  pub saved_at:   DateTime<Utc>,
  /// Set when the save also recorded a new version.
  #[serde(default)]
  pub version_id: Option<Uuid>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a schema persistence backend.
///
/// Documents travel as raw JSON. Backends never interpret the document's
/// layout; that is the job of [`SchemaDocument`](crate::SchemaDocument).
///
/// All methods return `Send` futures so sessions can hand work to spawned
/// tasks.
pub trait SchemaStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch the current document for `schema_id`, or the snapshot held by
  /// `version` when one is given.
  fn load_document<'a>(
    &'a self,
    schema_id: &'a str,
    version: Option<Uuid>,
  ) -> impl Future<Output = Result<Value, Self::Error>> + Send + 'a;

  /// Persist `document` as the current document. With `create_version` the
  /// backend also records a new draft version carrying `notes`.
  fn save_document<'a>(
    &'a self,
    schema_id: &'a str,
    document: Value,
    create_version: bool,
    notes: Option<String>,
  ) -> impl Future<Output = Result<SaveAck, Self::Error>> + Send + 'a;

  /// List the version history. Entries may omit their document snapshot.
  fn list_versions<'a>(
    &'a self,
    schema_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Version>, Self::Error>> + Send + 'a;

  /// Make `version` the active one, deprecating the previous active version.
  fn activate_version<'a>(
    &'a self,
    schema_id: &'a str,
    version: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
