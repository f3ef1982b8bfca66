//! Version history — named, timestamped snapshots of a schema document.
//!
//! History is append-only: versions are created and change status, but are
//! never removed. At most one version is `active` at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  diff::{self, SchemaDiff},
};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VersionStatus {
  #[default]
  Draft,
  Active,
  Deprecated,
}

// ─── Version ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
  pub id:         Uuid,
  #[serde(alias = "version_number", alias = "version", deserialize_with = "lenient_number")]
  pub number:     u32,
  #[serde(default)]
  pub status:     VersionStatus,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub notes:      Option<String>,
  /// The document as of this version. Listings may omit it.
  #[serde(default, alias = "schema_json")]
  pub document:   Option<Value>,
}

impl Version {
  pub fn is_active(&self) -> bool { self.status == VersionStatus::Active }
}

/// Accepts `3`, `"3"` and `"3.0"`; backends disagree on how they label
/// versions.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
  D: Deserializer<'de>,
{
  use serde::de::Error as _;

  match Value::deserialize(deserializer)? {
    Value::Number(n) => n
      .as_u64()
      .and_then(|n| u32::try_from(n).ok())
      .ok_or_else(|| D::Error::custom(format!("invalid version number {n}"))),
    Value::String(s) => s
      .split('.')
      .next()
      .and_then(|major| major.trim().parse().ok())
      .ok_or_else(|| D::Error::custom(format!("invalid version number {s:?}"))),
    other => Err(D::Error::custom(format!("invalid version number {other}"))),
  }
}

/// Outcome of [`VersionSet::activate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
  pub activated: Uuid,
  /// The previously active version, now deprecated.
  pub demoted:   Option<Uuid>,
}

// ─── VersionSet ──────────────────────────────────────────────────────────────

/// The version history of one schema.
#[derive(Debug, Clone, Default)]
pub struct VersionSet {
  versions: Vec<Version>,
}

impl VersionSet {
  pub fn new() -> Self { Self::default() }

  /// Adopt a history read from a backend. Rejects histories with more than
  /// one active version.
  pub fn from_versions(mut versions: Vec<Version>) -> Result<Self> {
    let active = versions.iter().filter(|v| v.is_active()).count();
    if active > 1 {
      return Err(Error::MultipleActive(active));
    }
    versions.sort_by_key(|v| (v.number, v.created_at));
    Ok(Self { versions })
  }

  pub fn list(&self) -> &[Version] { &self.versions }

  pub fn get(&self, id: Uuid) -> Option<&Version> {
    self.versions.iter().find(|v| v.id == id)
  }

  pub fn active(&self) -> Option<&Version> { self.versions.iter().find(|v| v.is_active()) }

  pub fn latest(&self) -> Option<&Version> { self.versions.iter().max_by_key(|v| v.number) }

  /// Append a new draft holding `document`.
  pub fn create_draft(&mut self, document: Value, notes: Option<String>) -> &Version {
    let number = self.latest().map_or(1, |v| v.number + 1);
    let version = Version {
      id: Uuid::new_v4(),
      number,
      status: VersionStatus::Draft,
      created_at: Utc::now(),
      notes,
      document: Some(document),
    };
    debug!(version = %version.id, number, "created draft version");
    self.versions.push(version);
    &self.versions[self.versions.len() - 1]
  }

  /// Make `id` the active version and deprecate whichever version was active
  /// before. The statuses change together or not at all.
  pub fn activate(&mut self, id: Uuid) -> Result<Activation> {
    let target = self
      .versions
      .iter()
      .position(|v| v.id == id)
      .ok_or(Error::VersionNotFound(id))?;

    let mut statuses: Vec<VersionStatus> = self.versions.iter().map(|v| v.status).collect();
    let mut demoted = None;
    for (i, status) in statuses.iter_mut().enumerate() {
      if i != target && *status == VersionStatus::Active {
        *status = VersionStatus::Deprecated;
        demoted = Some(self.versions[i].id);
      }
    }
    statuses[target] = VersionStatus::Active;

    let active = statuses.iter().filter(|s| **s == VersionStatus::Active).count();
    if active != 1 {
      return Err(Error::MultipleActive(active));
    }

    for (v, status) in self.versions.iter_mut().zip(statuses) {
      v.status = status;
    }
    debug!(version = %id, demoted = ?demoted, "activated version");
    Ok(Activation {
      activated: id,
      demoted,
    })
  }

  /// Store a snapshot fetched separately for a listed version.
  pub fn attach_snapshot(&mut self, id: Uuid, document: Value) -> Result<()> {
    let v = self
      .versions
      .iter_mut()
      .find(|v| v.id == id)
      .ok_or(Error::VersionNotFound(id))?;
    v.document = Some(document);
    Ok(())
  }

  /// Carry snapshots already held by `previous` over to matching versions.
  pub fn keep_snapshots_from(&mut self, previous: &VersionSet) {
    for v in &mut self.versions {
      if v.document.is_none()
        && let Some(doc) = previous.get(v.id).and_then(|p| p.document.clone())
      {
        v.document = Some(doc);
      }
    }
  }

  /// Structural diff between the snapshots of two versions.
  pub fn diff(&self, from: Uuid, to: Uuid) -> Result<SchemaDiff> {
    Ok(diff::diff_values(self.snapshot(from)?, self.snapshot(to)?))
  }

  fn snapshot(&self, id: Uuid) -> Result<&Value> {
    self
      .get(id)
      .ok_or(Error::VersionNotFound(id))?
      .document
      .as_ref()
      .ok_or(Error::MissingSnapshot(id))
  }
}
