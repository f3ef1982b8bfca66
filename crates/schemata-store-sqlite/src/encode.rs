//! Encoding and decoding helpers between core types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings and
//! documents compact JSON.

use chrono::{DateTime, Utc};
use schemata_core::version::{Version, VersionStatus};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_status(status: VersionStatus) -> String { status.to_string() }

pub fn decode_status(s: &str) -> Result<VersionStatus> {
  s.parse().map_err(|_| Error::Status(s.to_owned()))
}

pub fn encode_document(document: &Value) -> Result<String> { Ok(serde_json::to_string(document)?) }

pub fn decode_document(s: &str) -> Result<Value> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `versions` row.
pub struct RawVersion {
  pub version_id: String,
  pub number:     u32,
  pub status:     String,
  pub created_at: String,
  pub notes:      Option<String>,
  pub document:   String,
}

impl RawVersion {
  pub const COLUMNS: &'static str = "version_id, number, status, created_at, notes, document";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id: row.get(0)?,
      number:     row.get(1)?,
      status:     row.get(2)?,
      created_at: row.get(3)?,
      notes:      row.get(4)?,
      document:   row.get(5)?,
    })
  }

  pub fn into_version(self) -> Result<Version> {
    Ok(Version {
      id:         decode_uuid(&self.version_id)?,
      number:     self.number,
      status:     decode_status(&self.status)?,
      created_at: decode_dt(&self.created_at)?,
      notes:      self.notes,
      document:   Some(decode_document(&self.document)?),
    })
  }
}
