//! `EditingSession` — one document being edited against one backend.
//!
//! The session owns the [`SchemaDocument`] and its version history. Edits go
//! through [`EditingSession::document_mut`] and are purely in-memory; the
//! store is touched only by `reload`, `save` and the version operations.
//!
//! Saves are single-flight: while one is outstanding, [`EditingSession::save`]
//! refuses to start another with [`Error::SaveInProgress`]. A save runs on its
//! own task, so it completes even if nobody waits on its [`PendingSave`].

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result, SchemaDocument,
  diff::SchemaDiff,
  store::{SaveAck, SchemaStore},
  version::{Activation, VersionSet},
};

// ─── Session ─────────────────────────────────────────────────────────────────

pub struct EditingSession<S> {
  store:          Arc<S>,
  schema_id:      String,
  document:       SchemaDocument,
  versions:       VersionSet,
  save_in_flight: Arc<AtomicBool>,
}

impl<S: SchemaStore + 'static> EditingSession<S> {
  /// Fetch the current document for `schema_id` and start editing it.
  pub async fn open(store: Arc<S>, schema_id: impl Into<String>) -> Result<Self> {
    let mut session = Self::new_empty(store, schema_id);
    session.reload().await?;
    Ok(session)
  }

  /// Start a brand-new, empty document. Nothing is fetched.
  pub fn new_empty(store: Arc<S>, schema_id: impl Into<String>) -> Self {
    Self {
      store,
      schema_id: schema_id.into(),
      document: SchemaDocument::new_empty(),
      versions: VersionSet::new(),
      save_in_flight: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn schema_id(&self) -> &str { &self.schema_id }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn document(&self) -> &SchemaDocument { &self.document }

  pub fn document_mut(&mut self) -> &mut SchemaDocument { &mut self.document }

  pub fn versions(&self) -> &VersionSet { &self.versions }

  pub fn is_saving(&self) -> bool { self.save_in_flight.load(Ordering::Acquire) }

  /// Replace the document with the backend's current copy. All table ids and
  /// back-references are re-derived from the fetched payload.
  ///
  /// The document is only swapped once the fetch has finished; dropping the
  /// returned future leaves the session exactly as it was.
  pub async fn reload(&mut self) -> Result<()> {
    let raw = self
      .store
      .load_document(&self.schema_id, None)
      .await
      .map_err(Error::store)?;
    self.document = SchemaDocument::from_value(raw);
    debug!(
      schema = %self.schema_id,
      shape = %self.document.shape(),
      tables = self.document.tables().len(),
      "loaded document"
    );
    Ok(())
  }

  /// Send a snapshot of the current document to the backend.
  ///
  /// Must be called from within a tokio runtime.
  pub fn save(&self, create_version: bool, notes: Option<String>) -> Result<PendingSave> {
    if self
      .save_in_flight
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return Err(Error::SaveInProgress);
    }
    let guard = FlightGuard(self.save_in_flight.clone());

    let store = self.store.clone();
    let schema_id = self.schema_id.clone();
    let raw = self.document.raw().clone();
    let handle = tokio::spawn(async move {
      let _guard = guard;
      let ack = store
        .save_document(&schema_id, raw, create_version, notes)
        .await
        .map_err(Error::store)?;
      info!(schema = %schema_id, version = ?ack.version_id, "saved document");
      Ok(ack)
    });
    Ok(PendingSave { handle })
  }

  /// Re-read the version history, keeping snapshots already fetched.
  pub async fn refresh_versions(&mut self) -> Result<()> {
    let listed = self
      .store
      .list_versions(&self.schema_id)
      .await
      .map_err(Error::store)?;
    let mut versions = VersionSet::from_versions(listed)?;
    versions.keep_snapshots_from(&self.versions);
    self.versions = versions;
    Ok(())
  }

  /// Activate `version` on the backend and confirm it by re-reading the
  /// history.
  pub async fn activate(&mut self, version: Uuid) -> Result<Activation> {
    let previous = self.versions.active().map(|v| v.id);
    self
      .store
      .activate_version(&self.schema_id, version)
      .await
      .map_err(Error::store)?;
    self.refresh_versions().await?;

    match self.versions.active() {
      Some(v) if v.id == version => {
        info!(schema = %self.schema_id, %version, "activated version");
        Ok(Activation {
          activated: version,
          demoted:   previous.filter(|p| *p != version),
        })
      }
      other => {
        warn!(
          schema = %self.schema_id,
          %version,
          active = ?other.map(|v| v.id),
          "backend did not report the activated version as active"
        );
        Err(Error::ActivationUnconfirmed(version))
      }
    }
  }

  /// Diff two versions, fetching any snapshot the history does not carry.
  pub async fn diff_versions(&mut self, from: Uuid, to: Uuid) -> Result<SchemaDiff> {
    if self.versions.get(from).is_none() || self.versions.get(to).is_none() {
      self.refresh_versions().await?;
    }
    for id in [from, to] {
      let version = self.versions.get(id).ok_or(Error::VersionNotFound(id))?;
      if version.document.is_none() {
        let snapshot = self.fetch_snapshot(id).await?;
        self.versions.attach_snapshot(id, snapshot)?;
      }
    }
    self.versions.diff(from, to)
  }

  async fn fetch_snapshot(&self, version: Uuid) -> Result<Value> {
    debug!(schema = %self.schema_id, %version, "fetching version snapshot");
    self
      .store
      .load_document(&self.schema_id, Some(version))
      .await
      .map_err(Error::store)
  }
}

// ─── Pending save ────────────────────────────────────────────────────────────

/// Handle to a save running in the background.
#[derive(Debug)]
pub struct PendingSave {
  handle: JoinHandle<Result<SaveAck>>,
}

impl PendingSave {
  pub async fn wait(self) -> Result<SaveAck> { self.handle.await.map_err(Error::store)? }
}

/// Clears the in-flight flag when the save task finishes, however it ends.
struct FlightGuard(Arc<AtomicBool>);

impl Drop for FlightGuard {
  fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

#[cfg(test)]
mod tests {
  use std::{sync::Mutex, time::Duration};

  use chrono::Utc;
  use serde_json::json;
  use tokio::sync::Semaphore;

  use super::*;
  use crate::{
    column::ColumnType,
    version::{Version, VersionStatus},
  };

  #[derive(Debug, thiserror::Error)]
  #[error("{0}")]
  struct MemoryError(String);

  #[derive(Default)]
  struct State {
    document:          Value,
    versions:          Vec<Version>,
    saves:             usize,
    ignore_activation: bool,
  }

  /// In-memory backend. Saves wait for a permit on `save_gate` when set;
  /// loads never finish when `stall_loads` is set.
  #[derive(Default)]
  struct MemoryStore {
    state:       Mutex<State>,
    save_gate:   Option<Arc<Semaphore>>,
    stall_loads: bool,
  }

  impl MemoryStore {
    fn with_document(document: Value) -> Self {
      let store = Self::default();
      store.state.lock().unwrap().document = document;
      store
    }
  }

  impl SchemaStore for MemoryStore {
    type Error = MemoryError;

    async fn load_document(
      &self,
      _schema_id: &str,
      version: Option<Uuid>,
    ) -> Result<Value, MemoryError> {
      if self.stall_loads {
        std::future::pending::<()>().await;
      }
      let state = self.state.lock().unwrap();
      match version {
        None => Ok(state.document.clone()),
        Some(id) => state
          .versions
          .iter()
          .find(|v| v.id == id)
          .and_then(|v| v.document.clone())
          .ok_or_else(|| MemoryError(format!("no version {id}"))),
      }
    }

    async fn save_document(
      &self,
      _schema_id: &str,
      document: Value,
      create_version: bool,
      notes: Option<String>,
    ) -> Result<SaveAck, MemoryError> {
      if let Some(gate) = &self.save_gate {
        let _permit = gate
          .acquire()
          .await
          .map_err(|e| MemoryError(e.to_string()))?;
      }
      let mut state = self.state.lock().unwrap();
      state.saves += 1;
      let version_id = create_version.then(|| {
        let id = Uuid::new_v4();
        let number = state.versions.len() as u32 + 1;
        state.versions.push(Version {
          id,
          number,
          status: VersionStatus::Draft,
          created_at: Utc::now(),
          notes,
          document: Some(document.clone()),
        });
        id
      });
      state.document = document;
      Ok(SaveAck {
        saved_at: Utc::now(),
        version_id,
      })
    }

    async fn list_versions(&self, _schema_id: &str) -> Result<Vec<Version>, MemoryError> {
      // Listings omit snapshots, like the REST backend.
      let state = self.state.lock().unwrap();
      Ok(
        state
          .versions
          .iter()
          .cloned()
          .map(|mut v| {
            v.document = None;
            v
          })
          .collect(),
      )
    }

    async fn activate_version(&self, _schema_id: &str, version: Uuid) -> Result<(), MemoryError> {
      let mut state = self.state.lock().unwrap();
      if state.ignore_activation {
        return Ok(());
      }
      if !state.versions.iter().any(|v| v.id == version) {
        return Err(MemoryError(format!("no version {version}")));
      }
      for v in &mut state.versions {
        if v.id == version {
          v.status = VersionStatus::Active;
        } else if v.status == VersionStatus::Active {
          v.status = VersionStatus::Deprecated;
        }
      }
      Ok(())
    }
  }

  fn trades() -> Value {
    json!({ "tables": [{ "kdb_table_name": "trades", "columns": [{ "name": "sym", "type": "symbol" }] }] })
  }

  #[tokio::test]
  async fn open_normalizes_the_fetched_document() {
    let store = Arc::new(MemoryStore::with_document(trades()));
    let session = EditingSession::open(store, "s1").await.unwrap();
    assert_eq!(session.document().tables().len(), 1);
    assert!(session.document().table_by_name("trades").is_some());
  }

  #[tokio::test]
  async fn edits_are_saved() {
    let store = Arc::new(MemoryStore::with_document(trades()));
    let mut session = EditingSession::open(store.clone(), "s1").await.unwrap();
    let id = session.document().table_by_name("trades").unwrap().id;
    session.document_mut().add_column(id, "px", ColumnType::Float).unwrap();

    let ack = session.save(false, None).unwrap().wait().await.unwrap();
    assert!(ack.version_id.is_none());
    let saved = store.state.lock().unwrap().document.clone();
    assert_eq!(saved["tables"][0]["columns"][1]["kdb_type"], "float");
    assert!(!session.is_saving());
  }

  #[tokio::test]
  async fn overlapping_save_is_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let store = Arc::new(MemoryStore {
      save_gate: Some(gate.clone()),
      ..MemoryStore::with_document(trades())
    });
    let session = EditingSession::open(store.clone(), "s1").await.unwrap();

    let first = session.save(false, None).unwrap();
    assert!(session.is_saving());
    assert!(matches!(session.save(false, None), Err(Error::SaveInProgress)));

    gate.add_permits(1);
    first.wait().await.unwrap();
    assert!(!session.is_saving());

    gate.add_permits(1);
    session.save(false, None).unwrap().wait().await.unwrap();
    assert_eq!(store.state.lock().unwrap().saves, 2);
  }

  #[tokio::test]
  async fn abandoned_save_still_completes() {
    let store = Arc::new(MemoryStore::with_document(json!({})));
    let session = EditingSession::new_empty(store.clone(), "s1");
    drop(session.save(false, None).unwrap());
    while session.is_saving() {
      tokio::task::yield_now().await;
    }
    assert_eq!(store.state.lock().unwrap().saves, 1);
  }

  #[tokio::test]
  async fn dropped_reload_leaves_the_document_alone() {
    let store = Arc::new(MemoryStore {
      stall_loads: true,
      ..MemoryStore::default()
    });
    let mut session = EditingSession::new_empty(store, "s1");
    session.document_mut().add_table("orders", "").unwrap();

    let outcome = tokio::time::timeout(Duration::from_millis(20), session.reload()).await;
    assert!(outcome.is_err());
    assert!(session.document().table_by_name("orders").is_some());
  }

  #[tokio::test]
  async fn activation_is_confirmed_against_the_backend() {
    let store = Arc::new(MemoryStore::with_document(json!({})));
    let mut session = EditingSession::new_empty(store.clone(), "s1");
    let v1 = session.save(true, Some("first".into())).unwrap().wait().await.unwrap();
    let v2 = session.save(true, None).unwrap().wait().await.unwrap();
    let (v1, v2) = (v1.version_id.unwrap(), v2.version_id.unwrap());

    session.activate(v1).await.unwrap();
    let a = session.activate(v2).await.unwrap();
    assert_eq!(a.demoted, Some(v1));
    assert_eq!(session.versions().active().map(|v| v.id), Some(v2));

    store.state.lock().unwrap().ignore_activation = true;
    assert!(matches!(
      session.activate(v1).await,
      Err(Error::ActivationUnconfirmed(id)) if id == v1
    ));
  }

  #[tokio::test]
  async fn diff_fetches_missing_snapshots() {
    let store = Arc::new(MemoryStore::with_document(json!({})));
    let mut session = EditingSession::new_empty(store, "s1");
    let before = session.save(true, None).unwrap().wait().await.unwrap();

    session.document_mut().add_table("orders", "").unwrap();
    let after = session.save(true, None).unwrap().wait().await.unwrap();

    let d = session
      .diff_versions(before.version_id.unwrap(), after.version_id.unwrap())
      .await
      .unwrap();
    assert_eq!(d.added_tables, ["orders"]);
  }

  #[tokio::test]
  async fn backend_errors_surface_as_store_errors() {
    let store = Arc::new(MemoryStore::default());
    let mut session = EditingSession::new_empty(store, "s1");
    assert!(matches!(
      session.activate(Uuid::new_v4()).await,
      Err(Error::Store(_))
    ));
  }
}
