//! Table types — the canonical, layout-independent view of a table record.

use serde::{Deserialize, Serialize};

use crate::column::Column;

/// Session-local identity of a table.
///
/// Ids are assigned in document order when a document is normalized and are
/// never reused within one [`crate::SchemaDocument`]. They carry no meaning
/// across documents.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TableId(pub u64);

impl std::fmt::Display for TableId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// A natural-language question paired with the query that answers it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
  #[serde(default)]
  pub natural_language: String,
  #[serde(default)]
  pub query:            String,
}

impl Example {
  pub fn new(natural_language: impl Into<String>, query: impl Into<String>) -> Self {
    Self {
      natural_language: natural_language.into(),
      query:            query.into(),
    }
  }
}

/// A canonical table.
///
/// `name` is what the editor shows and what uniqueness is checked against;
/// `kdb_table_name` is the physical table name. Both are set together on
/// rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
  pub id:             TableId,
  pub name:           String,
  pub kdb_table_name: String,
  pub description:    String,
  pub columns:        Vec<Column>,
  pub examples:       Vec<Example>,
}

impl Table {
  pub fn column(&self, name: &str) -> Option<&Column> {
    self.columns.iter().find(|c| c.name == name)
  }

  /// Equality on everything except the session-local id.
  pub fn content_eq(&self, other: &Table) -> bool {
    self.name == other.name
      && self.kdb_table_name == other.kdb_table_name
      && self.description == other.description
      && self.columns == other.columns
      && self.examples == other.examples
  }
}

/// A ready-made table handed in by an import or suggestion collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableProposal {
  pub name:        String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub columns:     Vec<Column>,
  #[serde(default)]
  pub examples:    Vec<Example>,
}
