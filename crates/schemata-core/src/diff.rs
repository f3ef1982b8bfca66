//! Structural diff between two schema documents.
//!
//! Both sides are normalized first, so field-name variants (`type` vs
//! `kdb_type`), key order and physical layout never show up as differences.
//! Tables are matched by name; when a document holds two tables with the same
//! name, the first in document order is used.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use strum::Display;

use crate::{
  SchemaDocument,
  column::Column,
  table::Table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColumnField {
  Type,
  Description,
  Required,
  Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
  pub field:  ColumnField,
  pub before: String,
  pub after:  String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnChange {
  pub column:  String,
  pub changes: Vec<FieldChange>,
}

/// Differences within one table present on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDiff {
  pub table:              String,
  /// `(before, after)` when the description changed.
  pub description:        Option<(String, String)>,
  pub kdb_table_name:     Option<(String, String)>,
  pub added_columns:      Vec<Column>,
  pub removed_columns:    Vec<Column>,
  pub changed_columns:    Vec<ColumnChange>,
  /// The shared columns appear in a different order.
  pub columns_reordered:  bool,
  pub examples_changed:   bool,
}

impl TableDiff {
  pub fn is_empty(&self) -> bool {
    self.description.is_none()
      && self.kdb_table_name.is_none()
      && self.added_columns.is_empty()
      && self.removed_columns.is_empty()
      && self.changed_columns.is_empty()
      && !self.columns_reordered
      && !self.examples_changed
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDiff {
  pub added_tables:   Vec<String>,
  pub removed_tables: Vec<String>,
  pub changed_tables: Vec<TableDiff>,
}

impl SchemaDiff {
  pub fn is_empty(&self) -> bool {
    self.added_tables.is_empty()
      && self.removed_tables.is_empty()
      && self.changed_tables.is_empty()
  }
}

/// Diff two raw documents.
pub fn diff_values(before: &Value, after: &Value) -> SchemaDiff {
  diff(
    &SchemaDocument::from_value(before.clone()),
    &SchemaDocument::from_value(after.clone()),
  )
}

/// Diff the canonical models of two documents.
pub fn diff(before: &SchemaDocument, after: &SchemaDocument) -> SchemaDiff {
  let old = by_name(before);
  let new = by_name(after);

  let added_tables = unique_names(after)
    .filter(|n| !old.contains_key(n))
    .map(str::to_owned)
    .collect();
  let removed_tables = unique_names(before)
    .filter(|n| !new.contains_key(n))
    .map(str::to_owned)
    .collect();
  let changed_tables = unique_names(before)
    .filter_map(|n| Some((old.get(n)?, new.get(n)?)))
    .map(|(a, b)| diff_table(a, b))
    .filter(|d| !d.is_empty())
    .collect();

  SchemaDiff {
    added_tables,
    removed_tables,
    changed_tables,
  }
}

fn by_name(doc: &SchemaDocument) -> HashMap<&str, &Table> {
  let mut map = HashMap::new();
  for t in doc.tables() {
    map.entry(t.name.as_str()).or_insert(t);
  }
  map
}

/// Table names in document order, first occurrence only.
fn unique_names(doc: &SchemaDocument) -> impl Iterator<Item = &str> {
  let mut seen = std::collections::HashSet::new();
  doc
    .tables()
    .map(|t| t.name.as_str())
    .filter(move |n| seen.insert(*n))
}

fn diff_table(before: &Table, after: &Table) -> TableDiff {
  let changed = |a: &String, b: &String| (a != b).then(|| (a.clone(), b.clone()));

  let added_columns = after
    .columns
    .iter()
    .filter(|c| before.column(&c.name).is_none())
    .cloned()
    .collect();
  let removed_columns = before
    .columns
    .iter()
    .filter(|c| after.column(&c.name).is_none())
    .cloned()
    .collect();
  let changed_columns = before
    .columns
    .iter()
    .filter_map(|a| Some((a, after.column(&a.name)?)))
    .filter_map(|(a, b)| {
      let changes = diff_column(a, b);
      (!changes.is_empty()).then(|| ColumnChange {
        column: a.name.clone(),
        changes,
      })
    })
    .collect();

  let shared_before: Vec<&str> = before
    .columns
    .iter()
    .map(|c| c.name.as_str())
    .filter(|n| after.column(n).is_some())
    .collect();
  let shared_after: Vec<&str> = after
    .columns
    .iter()
    .map(|c| c.name.as_str())
    .filter(|n| before.column(n).is_some())
    .collect();

  TableDiff {
    table: before.name.clone(),
    description: changed(&before.description, &after.description),
    kdb_table_name: changed(&before.kdb_table_name, &after.kdb_table_name),
    added_columns,
    removed_columns,
    changed_columns,
    columns_reordered: shared_before != shared_after,
    examples_changed: before.examples != after.examples,
  }
}

fn diff_column(a: &Column, b: &Column) -> Vec<FieldChange> {
  let mut out = Vec::new();
  let mut push = |field, before: String, after: String| {
    if before != after {
      out.push(FieldChange { field, before, after });
    }
  };
  push(ColumnField::Type, a.column_type.to_string(), b.column_type.to_string());
  push(ColumnField::Description, a.description.clone(), b.description.clone());
  push(ColumnField::Required, a.required.to_string(), b.required.to_string());
  push(ColumnField::Key, a.key.to_string(), b.key.to_string());
  out
}

impl std::fmt::Display for SchemaDiff {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if self.is_empty() {
      return writeln!(f, "no differences");
    }
    for name in &self.added_tables {
      writeln!(f, "+ table {name}")?;
    }
    for name in &self.removed_tables {
      writeln!(f, "- table {name}")?;
    }
    for t in &self.changed_tables {
      writeln!(f, "~ table {}", t.table)?;
      if let Some((a, b)) = &t.description {
        writeln!(f, "    description: {a:?} -> {b:?}")?;
      }
      if let Some((a, b)) = &t.kdb_table_name {
        writeln!(f, "    kdb_table_name: {a:?} -> {b:?}")?;
      }
      for c in &t.added_columns {
        writeln!(f, "    + column {} ({})", c.name, c.column_type)?;
      }
      for c in &t.removed_columns {
        writeln!(f, "    - column {} ({})", c.name, c.column_type)?;
      }
      for c in &t.changed_columns {
        for change in &c.changes {
          writeln!(
            f,
            "    ~ column {}.{}: {} -> {}",
            c.column, change.field, change.before, change.after
          )?;
        }
      }
      if t.columns_reordered {
        writeln!(f, "    columns reordered")?;
      }
      if t.examples_changed {
        writeln!(f, "    examples changed")?;
      }
    }
    Ok(())
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
