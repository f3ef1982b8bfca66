//! Shape detection — classifies a raw document by the physical layout of its
//! table list.
//!
//! Three layouts occur in persisted documents:
//!
//! | Shape | Tables container |
//! |-------|------------------|
//! | Grouped | `schemas[*].schema[*].tables`, a sequence (first one found) |
//! | Array | top-level `tables`, a sequence of table records |
//! | Keyed | top-level `tables`, a mapping of table name → table record |
//!
//! Anything else is `Unrecognized`; such a document starts with no tables.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

/// The physical layout of a document's table list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Shape {
  Grouped,
  Array,
  Keyed,
  Unrecognized,
}

// ─── Pointer ─────────────────────────────────────────────────────────────────

/// An RFC 6901 JSON pointer into a raw document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Pointer(String);

impl Pointer {
  /// The pointer to the document root.
  pub fn root() -> Self { Self(String::new()) }

  pub fn key(&self, key: &str) -> Self {
    let escaped = key.replace('~', "~0").replace('/', "~1");
    Self(format!("{}/{}", self.0, escaped))
  }

  pub fn index(&self, index: usize) -> Self { Self(format!("{}/{}", self.0, index)) }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn resolve<'a>(&self, doc: &'a Value) -> Option<&'a Value> { doc.pointer(&self.0) }

  pub fn resolve_mut<'a>(&self, doc: &'a mut Value) -> Option<&'a mut Value> {
    doc.pointer_mut(&self.0)
  }
}

impl std::fmt::Display for Pointer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if self.0.is_empty() {
      f.write_str("/")
    } else {
      f.write_str(&self.0)
    }
  }
}

// ─── Detection ───────────────────────────────────────────────────────────────

/// The outcome of [`detect`]: the shape plus where its tables live.
///
/// `container` is `None` exactly when `shape` is [`Shape::Unrecognized`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
  pub shape:     Shape,
  pub container: Option<Pointer>,
}

impl Detection {
  fn found(shape: Shape, container: Pointer) -> Self {
    Self {
      shape,
      container: Some(container),
    }
  }

  fn unrecognized() -> Self {
    Self {
      shape:     Shape::Unrecognized,
      container: None,
    }
  }
}

/// Classify `doc`. The richest layout is tried first; the first match wins.
pub fn detect(doc: &Value) -> Detection {
  let Some(root) = doc.as_object() else {
    return Detection::unrecognized();
  };

  if root.contains_key("group")
    && let Some(container) = grouped_container(doc)
  {
    return Detection::found(Shape::Grouped, container);
  }

  let tables = Pointer::root().key("tables");
  match root.get("tables") {
    Some(Value::Array(_)) => Detection::found(Shape::Array, tables),
    Some(Value::Object(_)) => Detection::found(Shape::Keyed, tables),
    _ => Detection::unrecognized(),
  }
}

/// First `schemas[i].schema[j].tables` sequence, in document order.
fn grouped_container(doc: &Value) -> Option<Pointer> {
  let schemas = doc.get("schemas")?.as_array()?;
  for (i, entry) in schemas.iter().enumerate() {
    let Some(inner) = entry.get("schema").and_then(Value::as_array) else {
      continue;
    };
    for (j, schema) in inner.iter().enumerate() {
      if matches!(schema.get("tables"), Some(Value::Array(_))) {
        return Some(
          Pointer::root()
            .key("schemas")
            .index(i)
            .key("schema")
            .index(j)
            .key("tables"),
        );
      }
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn grouped_wins_over_top_level_tables() {
    let doc = json!({
      "group": "g",
      "tables": [],
      "schemas": [
        { "schema": [ { "name": "no tables here" } ] },
        { "schema": [ { "tables": [] }, { "tables": [] } ] },
      ],
    });
    let d = detect(&doc);
    assert_eq!(d.shape, Shape::Grouped);
    assert_eq!(d.container.unwrap().as_str(), "/schemas/1/schema/0/tables");
  }

  #[test]
  fn grouped_without_container_falls_through() {
    let doc = json!({ "group": "g", "schemas": [], "tables": [] });
    assert_eq!(detect(&doc).shape, Shape::Array);
  }

  #[test]
  fn schemas_without_group_is_not_grouped() {
    let doc = json!({ "schemas": [ { "schema": [ { "tables": [] } ] } ] });
    assert_eq!(detect(&doc).shape, Shape::Unrecognized);
  }

  #[test]
  fn array_and_keyed() {
    assert_eq!(detect(&json!({ "tables": [] })).shape, Shape::Array);
    assert_eq!(detect(&json!({ "tables": {} })).shape, Shape::Keyed);
  }

  #[test]
  fn unrecognized_documents() {
    for doc in [json!({}), json!({ "tables": "x" }), json!([1, 2]), json!(null)] {
      let d = detect(&doc);
      assert_eq!(d.shape, Shape::Unrecognized);
      assert!(d.container.is_none());
    }
  }

  #[test]
  fn pointer_escapes_keys() {
    let p = Pointer::root().key("tables").key("a/b~c");
    assert_eq!(p.as_str(), "/tables/a~1b~0c");
    let doc = json!({ "tables": { "a/b~c": 1 } });
    assert_eq!(p.resolve(&doc), Some(&json!(1)));
  }
}
