//! [`SchemaDocument`] — a raw schema document together with its canonical
//! table model.
//!
//! Every edit goes through this type. An edit is validated against the
//! canonical model first, then written into the raw document at the table's
//! [`OriginalRef`], and only then committed to the canonical model. If the raw
//! write cannot be located, nothing changes and the edit reports an error.

use std::collections::HashMap;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
  Error, Result,
  column::{Column, ColumnPatch, ColumnType},
  error::NameScope,
  mapper::{self, ColumnLayout},
  normalize::{self, OriginalRef, Slot},
  shape::{Pointer, Shape},
  table::{Example, Table, TableId, TableProposal},
};

#[derive(Debug, Clone)]
struct Entry {
  table:  Table,
  origin: OriginalRef,
}

/// A raw document and the canonical tables read from it.
///
/// Canonical order matches the order of the records in the tables container,
/// and new tables are appended to both.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
  raw:       Value,
  shape:     Shape,
  container: Option<Pointer>,
  entries:   Vec<Entry>,
  next_id:   u64,
}

impl Default for SchemaDocument {
  fn default() -> Self { Self::new_empty() }
}

impl SchemaDocument {
  // ── Construction ──────────────────────────────────────────────────────────

  /// Normalize `raw`. Never fails: an unrecognized layout yields an empty
  /// model.
  pub fn from_value(raw: Value) -> Self {
    let normalized = normalize::normalize(&raw);
    let entries: Vec<Entry> = normalized
      .tables
      .into_iter()
      .map(|t| Entry {
        table:  t.table,
        origin: t.origin,
      })
      .collect();
    Self {
      next_id: entries.len() as u64,
      raw,
      shape: normalized.detection.shape,
      container: normalized.detection.container,
      entries,
    }
  }

  /// Parse and normalize a JSON payload.
  pub fn parse(text: &str) -> Result<Self> {
    let raw: Value = serde_json::from_str(text)?;
    Ok(Self::from_value(raw))
  }

  /// A brand-new document with no tables.
  pub fn new_empty() -> Self { Self::from_value(json!({})) }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub fn shape(&self) -> Shape { self.shape }

  /// The raw document, including every field the engine does not interpret.
  pub fn raw(&self) -> &Value { &self.raw }

  pub fn into_raw(self) -> Value { self.raw }

  pub fn to_json_pretty(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(&self.raw)?)
  }

  pub fn tables(&self) -> impl ExactSizeIterator<Item = &Table> {
    self.entries.iter().map(|e| &e.table)
  }

  pub fn table(&self, id: TableId) -> Option<&Table> {
    self.entries.iter().find(|e| e.table.id == id).map(|e| &e.table)
  }

  /// The first table in document order named `name`.
  pub fn table_by_name(&self, name: &str) -> Option<&Table> {
    self.tables().find(|t| t.name == name)
  }

  /// The back-reference for table `id`.
  pub fn original_ref(&self, id: TableId) -> Option<&OriginalRef> {
    self.entries.iter().find(|e| e.table.id == id).map(|e| &e.origin)
  }

  // ── Table operations ──────────────────────────────────────────────────────

  /// Append a new, empty table.
  pub fn add_table(&mut self, name: &str, description: &str) -> Result<TableId> {
    validate_name(NameScope::Table, name)?;
    self.ensure_table_name_free(name, None)?;

    let record = json!({
      "kdb_table_name": name,
      "description":    description,
      "columns":        [],
    });
    let id = self.append(
      Table {
        id:             TableId(self.next_id),
        name:           name.to_owned(),
        kdb_table_name: name.to_owned(),
        description:    description.to_owned(),
        columns:        Vec::new(),
        examples:       Vec::new(),
      },
      record,
    )?;
    debug!(table = %id, name, "added table");
    Ok(id)
  }

  /// Append a table built by an import or suggestion collaborator. The
  /// proposal is validated as a whole; nothing is added if any part fails.
  pub fn add_table_from_proposal(&mut self, proposal: TableProposal) -> Result<TableId> {
    validate_name(NameScope::Table, &proposal.name)?;
    self.ensure_table_name_free(&proposal.name, None)?;
    for (i, column) in proposal.columns.iter().enumerate() {
      validate_name(NameScope::Column, &column.name)?;
      if proposal.columns[..i].iter().any(|c| c.name == column.name) {
        return Err(Error::DuplicateName {
          scope: NameScope::Column,
          name:  column.name.clone(),
        });
      }
    }

    let record = json!({
      "kdb_table_name": proposal.name,
      "description":    proposal.description,
      "columns":        mapper::write_columns(&proposal.columns, ColumnLayout::Array),
      "examples":       mapper::write_examples(&proposal.examples),
    });
    let id = self.append(
      Table {
        id:             TableId(self.next_id),
        name:           proposal.name.clone(),
        kdb_table_name: proposal.name.clone(),
        description:    proposal.description,
        columns:        proposal.columns,
        examples:       proposal.examples,
      },
      record,
    )?;
    debug!(table = %id, name = %proposal.name, "imported table");
    Ok(id)
  }

  /// Rename a table. Both `name` and `kdb_table_name` take the new value.
  /// In a keyed container the entry moves to the new key in place.
  pub fn rename_table(&mut self, id: TableId, new_name: &str) -> Result<()> {
    validate_name(NameScope::Table, new_name)?;
    let pos = self.position(id)?;
    self.ensure_table_name_free(new_name, Some(id))?;

    let container = self.container()?.clone();
    let origin = self.entries[pos].origin.clone();

    let new_slot = match &origin.slot {
      Slot::Index(_) => {
        let record = record_mut(&mut self.raw, &container, &origin)?;
        set_table_name(record, new_name);
        origin.slot.clone()
      }
      Slot::Key(old_key) => {
        let map = object_mut(&mut self.raw, &container)?;
        if !map.contains_key(old_key) {
          return Err(Error::Sync(format!("no entry {old_key:?} in {container}")));
        }
        if old_key != new_name && map.contains_key(new_name) {
          return Err(Error::DuplicateName {
            scope: NameScope::Table,
            name:  new_name.to_owned(),
          });
        }
        if !map.get(old_key).is_some_and(Value::is_object) {
          return Err(Error::Sync(format!("entry {old_key:?} is not a table record")));
        }
        rekey(map, old_key, new_name);
        if let Some(Value::Object(record)) = map.get_mut(new_name) {
          set_table_name(record, new_name);
        }
        Slot::Key(new_name.to_owned())
      }
    };

    let entry = &mut self.entries[pos];
    debug!(table = %id, from = %entry.table.name, to = new_name, "renamed table");
    entry.origin.slot = new_slot;
    entry.table.name = new_name.to_owned();
    entry.table.kdb_table_name = new_name.to_owned();
    Ok(())
  }

  pub fn set_table_description(&mut self, id: TableId, description: &str) -> Result<()> {
    let pos = self.position(id)?;
    let mut updated = self.entries[pos].table.clone();
    updated.description = description.to_owned();
    self.sync_table(pos, updated, |record, table, _| {
      record.insert("description".into(), Value::String(table.description.clone()));
    })
  }

  /// Remove a table and excise its raw record. The record is located by the
  /// table's own back-reference, never by name.
  pub fn delete_table(&mut self, id: TableId) -> Result<Table> {
    let pos = self.position(id)?;
    let container = self.container()?.clone();

    match self.entries[pos].origin.slot.clone() {
      Slot::Index(index) => {
        let items = array_mut(&mut self.raw, &container)?;
        if index >= items.len() {
          return Err(Error::Sync(format!("{container} has no element {index}")));
        }
        items.remove(index);
        for entry in &mut self.entries {
          if let Slot::Index(i) = &mut entry.origin.slot
            && *i > index
          {
            *i -= 1;
          }
        }
      }
      Slot::Key(key) => {
        let map = object_mut(&mut self.raw, &container)?;
        if map.shift_remove(&key).is_none() {
          return Err(Error::Sync(format!("no entry {key:?} in {container}")));
        }
      }
    }

    let removed = self.entries.remove(pos).table;
    debug!(table = %id, name = %removed.name, "deleted table");
    Ok(removed)
  }

  /// Move a table to `new_index` in canonical order. The raw records follow.
  pub fn move_table(&mut self, id: TableId, new_index: usize) -> Result<()> {
    let pos = self.position(id)?;
    if new_index >= self.entries.len() {
      return Err(Error::Validation(format!(
        "table index {new_index} out of range (have {})",
        self.entries.len()
      )));
    }
    if pos == new_index {
      return Ok(());
    }

    let mut order: Vec<usize> = (0..self.entries.len()).collect();
    let moved = order.remove(pos);
    order.insert(new_index, moved);

    let container = self.container()?.clone();
    let slots = self.reorder_raw(&container, &order)?;

    let mut old: Vec<Option<Entry>> = self.entries.drain(..).map(Some).collect();
    self.entries = order
      .iter()
      .zip(slots)
      .filter_map(|(&from, slot)| {
        old[from].take().map(|mut e| {
          e.origin.slot = slot;
          e
        })
      })
      .collect();
    debug!(table = %id, from = pos, to = new_index, "moved table");
    Ok(())
  }

  // ── Column operations ─────────────────────────────────────────────────────

  pub fn add_column(&mut self, id: TableId, name: &str, column_type: ColumnType) -> Result<()> {
    self.push_column(id, Column::new(name, column_type))
  }

  /// Append a fully specified column.
  pub fn push_column(&mut self, id: TableId, column: Column) -> Result<()> {
    validate_name(NameScope::Column, &column.name)?;
    let pos = self.position(id)?;
    let mut updated = self.entries[pos].table.clone();
    ensure_column_name_free(&updated, &column.name, None)?;

    debug!(table = %id, column = %column.name, "added column");
    updated.columns.push(column);
    self.sync_columns(pos, updated)
  }

  /// Apply `patch` to the column currently named `column`.
  pub fn update_column(&mut self, id: TableId, column: &str, patch: &ColumnPatch) -> Result<()> {
    let pos = self.position(id)?;
    let mut updated = self.entries[pos].table.clone();
    let index = column_index(&updated, column)?;

    let patched = patch.applied_to(&updated.columns[index]);
    if patched.name != updated.columns[index].name {
      validate_name(NameScope::Column, &patched.name)?;
      ensure_column_name_free(&updated, &patched.name, Some(index))?;
    }

    debug!(table = %id, column, "updated column");
    updated.columns[index] = patched;
    self.sync_columns(pos, updated)
  }

  pub fn delete_column(&mut self, id: TableId, column: &str) -> Result<Column> {
    let pos = self.position(id)?;
    let mut updated = self.entries[pos].table.clone();
    let index = column_index(&updated, column)?;

    let removed = updated.columns.remove(index);
    self.sync_columns(pos, updated)?;
    debug!(table = %id, column, "deleted column");
    Ok(removed)
  }

  pub fn move_column(&mut self, id: TableId, column: &str, new_index: usize) -> Result<()> {
    let pos = self.position(id)?;
    let mut updated = self.entries[pos].table.clone();
    let index = column_index(&updated, column)?;
    if new_index >= updated.columns.len() {
      return Err(Error::Validation(format!(
        "column index {new_index} out of range (have {})",
        updated.columns.len()
      )));
    }

    let moved = updated.columns.remove(index);
    updated.columns.insert(new_index, moved);
    self.sync_columns(pos, updated)
  }

  // ── Examples ──────────────────────────────────────────────────────────────

  /// Replace the examples of a table.
  pub fn set_examples(&mut self, id: TableId, examples: Vec<Example>) -> Result<()> {
    let pos = self.position(id)?;
    let mut updated = self.entries[pos].table.clone();
    updated.examples = examples;
    self.sync_table(pos, updated, |record, table, _| {
      record.insert("examples".into(), mapper::write_examples(&table.examples));
    })
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  fn position(&self, id: TableId) -> Result<usize> {
    self
      .entries
      .iter()
      .position(|e| e.table.id == id)
      .ok_or(Error::TableNotFound(id))
  }

  fn container(&self) -> Result<&Pointer> {
    self
      .container
      .as_ref()
      .ok_or_else(|| Error::Sync("document has no tables container".into()))
  }

  fn ensure_table_name_free(&self, name: &str, except: Option<TableId>) -> Result<()> {
    let taken = self
      .entries
      .iter()
      .any(|e| e.table.name == name && Some(e.table.id) != except);
    if taken {
      return Err(Error::DuplicateName {
        scope: NameScope::Table,
        name:  name.to_owned(),
      });
    }
    Ok(())
  }

  /// Insert `record` into the tables container, creating a top-level `tables`
  /// sequence for an unrecognized document, then register `table` (whose id
  /// must be the next unused one).
  fn append(&mut self, table: Table, record: Value) -> Result<TableId> {
    let name = table.name.as_str();
    let slot = match self.shape {
      Shape::Unrecognized => {
        let root = self
          .raw
          .as_object_mut()
          .ok_or_else(|| Error::Sync("document root is not an object".into()))?;
        match root.get("tables") {
          None | Some(Value::Null) => {}
          Some(other) => {
            return Err(Error::Sync(format!(
              "top-level `tables` holds a {}, refusing to overwrite it",
              kind_of(other)
            )));
          }
        }
        root.insert("tables".into(), Value::Array(vec![record]));
        self.shape = Shape::Array;
        self.container = Some(Pointer::root().key("tables"));
        debug!("synthesized top-level tables container");
        Slot::Index(0)
      }
      Shape::Grouped | Shape::Array => {
        let container = self.container()?.clone();
        let items = array_mut(&mut self.raw, &container)?;
        items.push(record);
        Slot::Index(items.len() - 1)
      }
      Shape::Keyed => {
        let container = self.container()?.clone();
        let map = object_mut(&mut self.raw, &container)?;
        if map.contains_key(name) {
          return Err(Error::DuplicateName {
            scope: NameScope::Table,
            name:  name.to_owned(),
          });
        }
        map.insert(name.to_owned(), record);
        Slot::Key(name.to_owned())
      }
    };

    let id = table.id;
    self.next_id += 1;
    self.entries.push(Entry {
      table,
      origin: OriginalRef {
        slot,
        columns: ColumnLayout::Array,
      },
    });
    Ok(id)
  }

  /// Write `updated` into the raw record of entry `pos` via `write`, then
  /// commit it to the canonical model.
  fn sync_table<F>(&mut self, pos: usize, updated: Table, write: F) -> Result<()>
  where
    F: FnOnce(&mut Map<String, Value>, &Table, ColumnLayout),
  {
    let container = self
      .container
      .as_ref()
      .ok_or_else(|| Error::Sync("document has no tables container".into()))?;
    let origin = &self.entries[pos].origin;
    let layout = origin.columns;
    let record = record_mut(&mut self.raw, container, origin)?;
    write(record, &updated, layout);
    self.entries[pos].table = updated;
    Ok(())
  }

  /// Replace the raw columns of entry `pos` wholesale from `updated`.
  fn sync_columns(&mut self, pos: usize, updated: Table) -> Result<()> {
    self.sync_table(pos, updated, |record, table, layout| {
      record.insert("columns".into(), mapper::write_columns(&table.columns, layout));
    })
  }

  /// Permute the raw table records so that position `k` holds the record of
  /// the entry currently at `order[k]`. Non-table members of the container
  /// keep their places. Returns the new slot of each position.
  fn reorder_raw(&mut self, container: &Pointer, order: &[usize]) -> Result<Vec<Slot>> {
    let slots: Vec<Slot> = self.entries.iter().map(|e| e.origin.slot.clone()).collect();
    match self.shape {
      Shape::Grouped | Shape::Array => {
        let indices: Vec<usize> = slots
          .iter()
          .map(|s| match s {
            Slot::Index(i) => Ok(*i),
            Slot::Key(k) => Err(Error::Sync(format!("keyed slot {k:?} in a sequence"))),
          })
          .collect::<Result<_>>()?;
        let items = array_mut(&mut self.raw, container)?;
        if indices.iter().any(|&i| i >= items.len()) {
          return Err(Error::Sync(format!("{container} is shorter than expected")));
        }
        let records: Vec<Value> = indices.iter().map(|&i| items[i].clone()).collect();
        let mut targets = indices;
        targets.sort_unstable();
        for (k, &from) in order.iter().enumerate() {
          items[targets[k]] = records[from].clone();
        }
        Ok(targets.into_iter().map(Slot::Index).collect())
      }
      Shape::Keyed => {
        let keys: Vec<String> = slots
          .iter()
          .map(|s| match s {
            Slot::Key(k) => Ok(k.clone()),
            Slot::Index(i) => Err(Error::Sync(format!("index slot {i} in a mapping"))),
          })
          .collect::<Result<_>>()?;
        let map = object_mut(&mut self.raw, container)?;
        if keys.iter().any(|k| !map.contains_key(k)) {
          return Err(Error::Sync(format!("{container} is missing table entries")));
        }

        let old = std::mem::take(map);
        let mut table_values: HashMap<String, Value> = HashMap::new();
        let mut layout: Vec<Option<(String, Value)>> = Vec::with_capacity(old.len());
        for (k, v) in old {
          if keys.contains(&k) {
            table_values.insert(k, v);
            layout.push(None);
          } else {
            layout.push(Some((k, v)));
          }
        }
        let mut next = order.iter().map(|&from| keys[from].clone());
        for member in layout {
          let (k, v) = match member {
            Some(kv) => kv,
            None => {
              let k = next.next().unwrap_or_default();
              let v = table_values.remove(&k).unwrap_or(Value::Null);
              (k, v)
            }
          };
          map.insert(k, v);
        }
        Ok(order.iter().map(|&from| Slot::Key(keys[from].clone())).collect())
      }
      Shape::Unrecognized => Err(Error::Sync("document has no tables container".into())),
    }
  }
}

// ─── Raw helpers ─────────────────────────────────────────────────────────────

fn validate_name(scope: NameScope, name: &str) -> Result<()> {
  if name.trim().is_empty() {
    return Err(Error::Validation(format!("{scope} name must not be blank")));
  }
  Ok(())
}

fn ensure_column_name_free(table: &Table, name: &str, except: Option<usize>) -> Result<()> {
  let taken = table
    .columns
    .iter()
    .enumerate()
    .any(|(i, c)| c.name == name && Some(i) != except);
  if taken {
    return Err(Error::DuplicateName {
      scope: NameScope::Column,
      name:  name.to_owned(),
    });
  }
  Ok(())
}

fn column_index(table: &Table, column: &str) -> Result<usize> {
  table
    .columns
    .iter()
    .position(|c| c.name == column)
    .ok_or_else(|| Error::ColumnNotFound {
      table:  table.id,
      column: column.to_owned(),
    })
}

fn set_table_name(record: &mut Map<String, Value>, name: &str) {
  record.insert("kdb_table_name".into(), Value::String(name.to_owned()));
  if record.contains_key("name") {
    record.insert("name".into(), Value::String(name.to_owned()));
  }
}

/// Move entry `from` to key `to`, keeping its position in iteration order.
fn rekey(map: &mut Map<String, Value>, from: &str, to: &str) {
  if from == to {
    return;
  }
  let old = std::mem::take(map);
  for (k, v) in old {
    if k == from {
      map.insert(to.to_owned(), v);
    } else {
      map.insert(k, v);
    }
  }
}

fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "sequence",
    Value::Object(_) => "mapping",
  }
}

fn array_mut<'a>(raw: &'a mut Value, container: &Pointer) -> Result<&'a mut Vec<Value>> {
  container
    .resolve_mut(raw)
    .and_then(Value::as_array_mut)
    .ok_or_else(|| Error::Sync(format!("{container} is not a sequence")))
}

fn object_mut<'a>(
  raw: &'a mut Value,
  container: &Pointer,
) -> Result<&'a mut Map<String, Value>> {
  container
    .resolve_mut(raw)
    .and_then(Value::as_object_mut)
    .ok_or_else(|| Error::Sync(format!("{container} is not a mapping")))
}

fn record_mut<'a>(
  raw: &'a mut Value,
  container: &Pointer,
  origin: &OriginalRef,
) -> Result<&'a mut Map<String, Value>> {
  let pointer = origin.pointer(container);
  pointer
    .resolve_mut(raw)
    .and_then(Value::as_object_mut)
    .ok_or_else(|| Error::Sync(format!("no table record at {pointer}")))
}
