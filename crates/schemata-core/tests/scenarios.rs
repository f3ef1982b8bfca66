//! Document-level properties checked across all physical layouts.

use std::collections::HashSet;

use schemata_core::{
  Error, SchemaDocument,
  column::{ColumnPatch, ColumnType},
  diff,
  shape::Shape,
  table::Table,
};
use serde_json::{Value, json};

fn grouped() -> Value {
  json!({
    "group": "g",
    "schemas": [{
      "schema": [{
        "tables": [
          {
            "kdb_table_name": "trades",
            "description": "executions",
            "columns": [
              { "name": "sym", "kdb_type": "symbol", "column_desc": "ticker" },
              { "name": "px", "type": "float" }
            ],
            "examples": [{ "natural_language": "all trades", "query": "select from trades" }],
            "owner": "desk"
          },
          { "kdb_table_name": "quotes", "columns": [] }
        ]
      }]
    }]
  })
}

fn array() -> Value {
  json!({
    "version": 3,
    "tables": [
      { "name": "trades", "columns": [{ "name": "sym", "type": "symbol" }] },
      { "name": "quotes", "columns": [{ "name": "bid", "type": "float" }] }
    ]
  })
}

fn keyed() -> Value {
  json!({
    "tables": {
      "trades": { "description": "d", "columns": { "sym": { "type": "symbol" } } },
      "quotes": { "columns": { "bid": { "type": "float", "required": true } } }
    }
  })
}

fn fixtures() -> [(Shape, Value); 3] {
  [(Shape::Grouped, grouped()), (Shape::Array, array()), (Shape::Keyed, keyed())]
}

fn renormalized(doc: &SchemaDocument) -> SchemaDocument {
  SchemaDocument::from_value(doc.raw().clone())
}

fn same_tables(a: &SchemaDocument, b: &SchemaDocument) -> bool {
  let a: Vec<&Table> = a.tables().collect();
  let b: Vec<&Table> = b.tables().collect();
  a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.content_eq(y))
}

fn assert_unique(doc: &SchemaDocument) {
  let mut tables = HashSet::new();
  for t in doc.tables() {
    assert!(tables.insert(t.name.clone()), "duplicate table {}", t.name);
    let mut columns = HashSet::new();
    for c in &t.columns {
      assert!(columns.insert(&c.name), "duplicate column {} in {}", c.name, t.name);
    }
  }
}

// ─── Round-trip identity ─────────────────────────────────────────────────────

#[test]
fn unedited_documents_round_trip() {
  for (shape, raw) in fixtures() {
    let doc = SchemaDocument::from_value(raw.clone());
    assert_eq!(doc.shape(), shape);
    assert_eq!(doc.tables().len(), 2);

    let text = doc.to_json_pretty().unwrap();
    let reparsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(reparsed, raw, "{shape} document changed without edits");
  }
}

// ─── Mutation round-trip ─────────────────────────────────────────────────────

#[test]
fn model_edits_match_raw_edits_in_grouped_documents() {
  let mut doc = SchemaDocument::from_value(grouped());
  let trades = doc.table_by_name("trades").unwrap().id;
  doc.add_column(trades, "size", ColumnType::Long).unwrap();
  doc
    .update_column(trades, "sym", &ColumnPatch::default().description("instrument"))
    .unwrap();
  doc.set_table_description(trades, "fills").unwrap();

  let mut raw = grouped();
  let t = &mut raw["schemas"][0]["schema"][0]["tables"][0];
  t["description"] = json!("fills");
  t["columns"][0]["column_desc"] = json!("instrument");
  t["columns"].as_array_mut().unwrap().push(json!({ "name": "size", "type": "long" }));

  assert!(same_tables(&doc, &SchemaDocument::from_value(raw)));
  assert!(same_tables(&doc, &renormalized(&doc)));
}

#[test]
fn model_edits_match_raw_edits_in_array_documents() {
  let mut doc = SchemaDocument::from_value(array());
  let quotes = doc.table_by_name("quotes").unwrap().id;
  doc.rename_table(quotes, "book").unwrap();
  doc.delete_column(quotes, "bid").unwrap();
  let trades = doc.table_by_name("trades").unwrap().id;
  doc.delete_table(trades).unwrap();

  let raw = json!({
    "version": 3,
    "tables": [{ "name": "book", "kdb_table_name": "book", "columns": [] }]
  });

  assert!(same_tables(&doc, &SchemaDocument::from_value(raw)));
  assert!(same_tables(&doc, &renormalized(&doc)));
  assert_eq!(doc.raw()["version"], 3);
}

#[test]
fn model_edits_match_raw_edits_in_keyed_documents() {
  let mut doc = SchemaDocument::from_value(keyed());
  let trades = doc.table_by_name("trades").unwrap().id;
  doc.rename_table(trades, "ticks").unwrap();
  doc.add_column(trades, "px", ColumnType::Float).unwrap();
  doc.move_table(trades, 1).unwrap();

  let raw = json!({
    "tables": {
      "quotes": { "columns": { "bid": { "type": "float", "required": true } } },
      "ticks": {
        "description": "d",
        "columns": { "sym": { "type": "symbol" }, "px": { "type": "float" } }
      }
    }
  });

  assert!(same_tables(&doc, &SchemaDocument::from_value(raw)));
  assert!(same_tables(&doc, &renormalized(&doc)));
}

// ─── Uniqueness ──────────────────────────────────────────────────────────────

#[test]
fn names_stay_unique_under_mixed_edits() {
  for (_, raw) in fixtures() {
    let mut doc = SchemaDocument::from_value(raw);
    let trades = doc.table_by_name("trades").unwrap().id;

    assert!(matches!(doc.add_table("quotes", ""), Err(Error::DuplicateName { .. })));
    assert!(matches!(doc.rename_table(trades, "quotes"), Err(Error::DuplicateName { .. })));
    assert!(matches!(
      doc.add_column(trades, "sym", ColumnType::Int),
      Err(Error::DuplicateName { .. })
    ));

    let orders = doc.add_table("orders", "").unwrap();
    doc.add_column(orders, "id", ColumnType::Symbol).unwrap();
    doc.add_column(orders, "qty", ColumnType::Long).unwrap();
    assert!(
      doc
        .update_column(orders, "qty", &ColumnPatch::default().name("id"))
        .is_err()
    );

    assert_unique(&doc);
    assert_unique(&renormalized(&doc));
  }
}

// ─── Idempotence ─────────────────────────────────────────────────────────────

#[test]
fn add_then_delete_leaves_no_difference() {
  for (shape, raw) in fixtures() {
    let original = SchemaDocument::from_value(raw.clone());
    let mut doc = SchemaDocument::from_value(raw);
    let id = doc.add_table("orders", "pending").unwrap();
    doc.delete_table(id).unwrap();

    let d = diff::diff(&original, &doc);
    assert!(d.is_empty(), "{shape}: {d}");
  }
}

#[test]
fn add_then_delete_on_an_empty_document() {
  let original = SchemaDocument::new_empty();
  let mut doc = SchemaDocument::new_empty();
  let id = doc.add_table("orders", "").unwrap();
  assert_eq!(
    doc.raw(),
    &json!({ "tables": [{ "kdb_table_name": "orders", "description": "", "columns": [] }] })
  );
  doc.delete_table(id).unwrap();
  assert!(diff::diff(&original, &doc).is_empty());
}
