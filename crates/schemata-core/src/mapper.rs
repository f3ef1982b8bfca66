//! Column mapper — converts between raw column records and [`Column`].
//!
//! Raw documents name the same concept differently depending on who wrote
//! them. Each canonical field is read from an ordered list of source fields;
//! the first one present as a string wins. On write, the type is mirrored into
//! both `type` and `kdb_type` so readers of either name see it.

use std::collections::HashSet;

use serde_json::{Map, Value, json};

use crate::{
  column::{Column, ColumnType},
  table::Example,
};

const NAME_FIELDS: &[&str] = &["name"];
const TYPE_FIELDS: &[&str] = &["type", "kdb_type"];
const DESCRIPTION_FIELDS: &[&str] = &["description", "column_desc"];

const NATURAL_LANGUAGE_FIELDS: &[&str] = &["natural_language"];
const QUERY_FIELDS: &[&str] = &["query"];

/// How a table record stores its columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnLayout {
  /// `columns: [ { "name": .., .. }, .. ]`
  #[default]
  Array,
  /// `columns: { "<name>": { .. }, .. }`
  Keyed,
}

/// First field from `fields` that is present in `record` as a string.
pub(crate) fn first_str<'a>(
  record: &'a Map<String, Value>,
  fields: &[&str],
) -> Option<&'a str> {
  fields
    .iter()
    .find_map(|f| record.get(*f).and_then(Value::as_str))
}

fn flag(record: &Map<String, Value>, field: &str) -> bool {
  record.get(field).and_then(Value::as_bool).unwrap_or(false)
}

// ─── Columns ─────────────────────────────────────────────────────────────────

/// Read one raw column record. A missing or blank name becomes
/// `column_<fallback_index>`; [`read_columns`] picks an index that does not
/// collide with the record's other columns.
pub fn to_canonical(raw: &Value, fallback_index: usize) -> Column {
  let empty = Map::new();
  let record = raw.as_object().unwrap_or(&empty);

  let name = first_str(record, NAME_FIELDS)
    .filter(|n| !n.trim().is_empty())
    .map(str::to_owned)
    .unwrap_or_else(|| format!("column_{fallback_index}"));

  let column_type = first_str(record, TYPE_FIELDS)
    .map(ColumnType::parse_lenient)
    .unwrap_or_default();

  let description = first_str(record, DESCRIPTION_FIELDS)
    .unwrap_or_default()
    .to_owned();

  Column {
    name,
    column_type,
    description,
    required: flag(record, "required"),
    key: flag(record, "key"),
  }
}

/// Write one column in the mirrored raw form.
pub fn to_raw(column: &Column) -> Value {
  json!({
    "name":        column.name,
    "type":        column.column_type.as_str(),
    "kdb_type":    column.column_type.as_str(),
    "column_desc": column.description,
    "required":    column.required,
    "key":         column.key,
  })
}

/// Read the columns of a raw table record, reporting which layout it used.
/// A record without a usable `columns` field reads as an empty array layout.
pub fn read_columns(record: &Map<String, Value>) -> (Vec<Column>, ColumnLayout) {
  match record.get("columns") {
    Some(Value::Array(items)) => {
      let mut taken: HashSet<String> = items
        .iter()
        .filter_map(explicit_name)
        .map(str::to_owned)
        .collect();
      let columns = items
        .iter()
        .enumerate()
        .map(|(i, raw)| {
          let mut column = to_canonical(raw, i + 1);
          if explicit_name(raw).is_none() {
            column.name = free_fallback_name(&mut taken, i + 1);
          }
          column
        })
        .collect();
      (columns, ColumnLayout::Array)
    }
    Some(Value::Object(entries)) => {
      let columns = entries
        .iter()
        .enumerate()
        .map(|(i, (key, raw))| {
          let mut column = to_canonical(raw, i + 1);
          column.name = key.clone();
          column
        })
        .collect();
      (columns, ColumnLayout::Keyed)
    }
    _ => (Vec::new(), ColumnLayout::Array),
  }
}

fn explicit_name(raw: &Value) -> Option<&str> {
  raw
    .as_object()
    .and_then(|record| first_str(record, NAME_FIELDS))
    .filter(|n| !n.trim().is_empty())
}

/// `column_<n>` for the smallest `n >= start` not already in `taken`.
fn free_fallback_name(taken: &mut HashSet<String>, start: usize) -> String {
  let mut n = start;
  loop {
    let name = format!("column_{n}");
    if taken.insert(name.clone()) {
      return name;
    }
    n += 1;
  }
}

/// Build the full raw `columns` value for `columns` in `layout`.
pub fn write_columns(columns: &[Column], layout: ColumnLayout) -> Value {
  match layout {
    ColumnLayout::Array => Value::Array(columns.iter().map(to_raw).collect()),
    ColumnLayout::Keyed => Value::Object(
      columns
        .iter()
        .map(|c| (c.name.clone(), to_raw(c)))
        .collect(),
    ),
  }
}

// ─── Examples ────────────────────────────────────────────────────────────────

pub fn read_examples(record: &Map<String, Value>) -> Vec<Example> {
  let Some(items) = record.get("examples").and_then(Value::as_array) else {
    return Vec::new();
  };
  let empty = Map::new();
  items
    .iter()
    .map(|raw| {
      let ex = raw.as_object().unwrap_or(&empty);
      Example {
        natural_language: first_str(ex, NATURAL_LANGUAGE_FIELDS)
          .unwrap_or_default()
          .to_owned(),
        query:            first_str(ex, QUERY_FIELDS).unwrap_or_default().to_owned(),
      }
    })
    .collect()
}

pub fn write_examples(examples: &[Example]) -> Value {
  Value::Array(
    examples
      .iter()
      .map(|e| json!({ "natural_language": e.natural_language, "query": e.query }))
      .collect(),
  )
}
