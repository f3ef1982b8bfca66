//! Table normalizer — reads a raw document into canonical [`Table`]s.
//!
//! Normalization never modifies the document and is deterministic: the same
//! input yields the same tables, ids and order every time.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
  mapper::{self, ColumnLayout, first_str},
  shape::{self, Detection, Pointer, Shape},
  table::{Table, TableId},
};

const NAME_FIELDS: &[&str] = &["name", "kdb_table_name"];
const KDB_NAME_FIELDS: &[&str] = &["kdb_table_name", "name"];
const UNKNOWN_TABLE: &str = "unknown";

// ─── Back-references ─────────────────────────────────────────────────────────

/// Position of a raw table record inside its tables container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
  /// Element index in a sequence container.
  Index(usize),
  /// Entry key in a mapping container.
  Key(String),
}

/// Non-owning back-reference from a canonical table to the raw record it was
/// read from.
///
/// It is only meaningful against the document it was derived from; replacing
/// that document invalidates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalRef {
  pub slot:    Slot,
  /// Layout the record uses for its columns; writes keep it.
  pub columns: ColumnLayout,
}

impl OriginalRef {
  pub fn pointer(&self, container: &Pointer) -> Pointer {
    match &self.slot {
      Slot::Index(i) => container.index(*i),
      Slot::Key(k) => container.key(k),
    }
  }
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NormalizedTable {
  pub table:  Table,
  pub origin: OriginalRef,
}

#[derive(Debug, Clone)]
pub struct Normalized {
  pub detection: Detection,
  pub tables:    Vec<NormalizedTable>,
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

/// Detect the shape of `doc` and read every table record it holds.
pub fn normalize(doc: &Value) -> Normalized {
  let detection = shape::detect(doc);
  let container = detection.container.as_ref().and_then(|p| p.resolve(doc));

  let mut tables = Vec::new();
  let mut next_id = 0u64;
  let mut push = |record: &Map<String, Value>, slot: Slot, key: Option<&str>| {
    let (table, columns) = read_table(TableId(next_id), record, key);
    next_id += 1;
    tables.push(NormalizedTable {
      table,
      origin: OriginalRef { slot, columns },
    });
  };

  match (detection.shape, container) {
    (Shape::Grouped | Shape::Array, Some(Value::Array(records))) => {
      for (i, raw) in records.iter().enumerate() {
        match raw.as_object() {
          Some(record) => push(record, Slot::Index(i), None),
          None => warn!(index = i, "skipping non-object table record"),
        }
      }
    }
    (Shape::Keyed, Some(Value::Object(records))) => {
      for (key, raw) in records {
        match raw.as_object() {
          Some(record) => push(record, Slot::Key(key.clone()), Some(key.as_str())),
          None => warn!(key = %key, "skipping non-object table record"),
        }
      }
    }
    _ => {}
  }

  debug!(shape = %detection.shape, tables = tables.len(), "normalized document");
  Normalized { detection, tables }
}

/// Read one raw table record. `key` is the entry key for mapping containers;
/// it names the table.
pub fn read_table(
  id: TableId,
  record: &Map<String, Value>,
  key: Option<&str>,
) -> (Table, ColumnLayout) {
  let name = match key {
    Some(k) => k.to_owned(),
    None => first_str(record, NAME_FIELDS)
      .unwrap_or(UNKNOWN_TABLE)
      .to_owned(),
  };
  let kdb_table_name = first_str(record, KDB_NAME_FIELDS)
    .or(key)
    .unwrap_or(UNKNOWN_TABLE)
    .to_owned();
  let description = record
    .get("description")
    .and_then(Value::as_str)
    .unwrap_or_default()
    .to_owned();
  let (columns, layout) = mapper::read_columns(record);
  let examples = mapper::read_examples(record);

  let table = Table {
    id,
    name,
    kdb_table_name,
    description,
    columns,
    examples,
  };
  (table, layout)
}
