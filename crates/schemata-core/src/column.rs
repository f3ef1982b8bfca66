//! Column types — one typed field of a table.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

// ─── ColumnType ──────────────────────────────────────────────────────────────

/// The primitive kinds a column can hold.
///
/// Parsing is case-insensitive. Raw documents carrying an unknown or missing
/// type are read as [`ColumnType::Symbol`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ColumnType {
  #[default]
  Symbol,
  Char,
  String,
  Boolean,
  Byte,
  Short,
  Int,
  Long,
  Real,
  Float,
  Time,
  Minute,
  Second,
  Timestamp,
  Month,
  Date,
  Datetime,
  Timespan,
}

impl ColumnType {
  /// The string written to the `type` and `kdb_type` fields.
  pub fn as_str(self) -> &'static str { self.into() }

  /// The single-character q type code, where the kind has one.
  pub fn type_char(self) -> Option<char> {
    let c = match self {
      Self::Symbol => 's',
      Self::Char => 'c',
      Self::String => return None,
      Self::Boolean => 'b',
      Self::Byte => 'x',
      Self::Short => 'h',
      Self::Int => 'i',
      Self::Long => 'j',
      Self::Real => 'e',
      Self::Float => 'f',
      Self::Time => 't',
      Self::Minute => 'u',
      Self::Second => 'v',
      Self::Timestamp => 'p',
      Self::Month => 'm',
      Self::Date => 'd',
      Self::Datetime => 'z',
      Self::Timespan => 'n',
    };
    Some(c)
  }

  /// Lenient parse used on the read path: anything unrecognised becomes the
  /// default kind.
  pub fn parse_lenient(s: &str) -> Self { s.trim().parse().unwrap_or_default() }
}

// ─── Column ──────────────────────────────────────────────────────────────────

/// A canonical column. `name` is unique within its owning table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
  pub name:        String,
  #[serde(rename = "type", default)]
  pub column_type: ColumnType,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub required:    bool,
  #[serde(default)]
  pub key:         bool,
}

impl Column {
  /// A column with an empty description and both flags cleared.
  pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
    Self {
      name: name.into(),
      column_type,
      description: String::new(),
      required: false,
      key: false,
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }
}

// ─── ColumnPatch ─────────────────────────────────────────────────────────────

/// A partial update for [`crate::SchemaDocument::update_column`]. Fields left
/// as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnPatch {
  pub name:        Option<String>,
  pub column_type: Option<ColumnType>,
  pub description: Option<String>,
  pub required:    Option<bool>,
  pub key:         Option<bool>,
}

impl ColumnPatch {
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn column_type(mut self, column_type: ColumnType) -> Self {
    self.column_type = Some(column_type);
    self
  }

  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn required(mut self, required: bool) -> Self {
    self.required = Some(required);
    self
  }

  pub fn key(mut self, key: bool) -> Self {
    self.key = Some(key);
    self
  }

  /// Return `column` with this patch applied.
  pub fn applied_to(&self, column: &Column) -> Column {
    Column {
      name:        self.name.clone().unwrap_or_else(|| column.name.clone()),
      column_type: self.column_type.unwrap_or(column.column_type),
      description: self
        .description
        .clone()
        .unwrap_or_else(|| column.description.clone()),
      required:    self.required.unwrap_or(column.required),
      key:         self.key.unwrap_or(column.key),
    }
  }
}
