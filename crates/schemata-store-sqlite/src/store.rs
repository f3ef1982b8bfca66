//! [`SqliteStore`] — the SQLite implementation of [`SchemaStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use schemata_core::{
  store::{SaveAck, SchemaStore},
  version::{Version, VersionStatus},
};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{RawVersion, decode_document, encode_document, encode_dt, encode_status, encode_uuid},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A schema store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Ids of every schema held in the store, sorted.
  pub async fn list_schemas(&self) -> Result<Vec<String>> {
    let ids = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT schema_id FROM schemas ORDER BY schema_id")?;
        let ids = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids)
  }
}

// ─── SchemaStore impl ────────────────────────────────────────────────────────

impl SchemaStore for SqliteStore {
  type Error = Error;

  async fn load_document(&self, schema_id: &str, version: Option<Uuid>) -> Result<Value> {
    let id = schema_id.to_owned();
    let version_str = version.map(encode_uuid);

    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        let raw = match version_str {
          None => conn
            .query_row(
              "SELECT document FROM schemas WHERE schema_id = ?1",
              rusqlite::params![id],
              |r| r.get(0),
            )
            .optional()?,
          Some(v) => conn
            .query_row(
              "SELECT document FROM versions WHERE schema_id = ?1 AND version_id = ?2",
              rusqlite::params![id, v],
              |r| r.get(0),
            )
            .optional()?,
        };
        Ok(raw)
      })
      .await?;

    match (raw, version) {
      (Some(raw), _) => decode_document(&raw),
      (None, None) => Err(Error::SchemaNotFound(schema_id.to_owned())),
      (None, Some(version)) => Err(Error::VersionNotFound {
        schema: schema_id.to_owned(),
        version,
      }),
    }
  }

  async fn save_document(
    &self,
    schema_id: &str,
    document: Value,
    create_version: bool,
    notes: Option<String>,
  ) -> Result<SaveAck> {
    let saved_at = Utc::now();
    let version_id = create_version.then(Uuid::new_v4);

    let id = schema_id.to_owned();
    let doc_str = encode_document(&document)?;
    let at_str = encode_dt(saved_at);
    let version_str = version_id.map(encode_uuid);
    let draft = encode_status(VersionStatus::Draft);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO schemas (schema_id, document, updated_at) VALUES (?1, ?2, ?3)
           ON CONFLICT (schema_id) DO UPDATE
             SET document = excluded.document, updated_at = excluded.updated_at",
          rusqlite::params![id, doc_str, at_str],
        )?;
        if let Some(v) = version_str {
          tx.execute(
            "INSERT INTO versions (version_id, schema_id, number, status, created_at, notes, document)
             SELECT ?1, ?2, COALESCE(MAX(number), 0) + 1, ?3, ?4, ?5, ?6
               FROM versions WHERE schema_id = ?2",
            rusqlite::params![v, id, draft, at_str, notes, doc_str],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    info!(schema = schema_id, version = ?version_id, "saved document");
    Ok(SaveAck {
      saved_at,
      version_id,
    })
  }

  async fn list_versions(&self, schema_id: &str) -> Result<Vec<Version>> {
    let id = schema_id.to_owned();

    let raws: Vec<RawVersion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM versions WHERE schema_id = ?1 ORDER BY number",
          RawVersion::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id], RawVersion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVersion::into_version).collect()
  }

  /// Deprecates the current active version and activates `version` in one
  /// transaction; the partial unique index rejects anything else.
  async fn activate_version(&self, schema_id: &str, version: Uuid) -> Result<()> {
    let id = schema_id.to_owned();
    let version_str = encode_uuid(version);
    let active = encode_status(VersionStatus::Active);
    let deprecated = encode_status(VersionStatus::Deprecated);

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM versions WHERE schema_id = ?1 AND version_id = ?2",
            rusqlite::params![id, version_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(false);
        }
        tx.execute(
          "UPDATE versions SET status = ?1
            WHERE schema_id = ?2 AND status = ?3 AND version_id != ?4",
          rusqlite::params![deprecated, id, active, version_str],
        )?;
        tx.execute(
          "UPDATE versions SET status = ?1 WHERE version_id = ?2",
          rusqlite::params![active, version_str],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::VersionNotFound {
        schema: schema_id.to_owned(),
        version,
      });
    }
    info!(schema = schema_id, %version, "activated version");
    Ok(())
  }
}
