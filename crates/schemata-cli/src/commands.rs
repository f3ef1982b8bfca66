//! Subcommands and their execution against any [`SchemaStore`].

use std::{
  io::Write,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};
use schemata_core::{
  SchemaDocument,
  column::{Column, ColumnPatch, ColumnType},
  session::EditingSession,
  store::SchemaStore,
  table::{Table, TableProposal},
};
use uuid::Uuid;

// ─── Arguments ───────────────────────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Create an empty document for the schema.
  Init {
    #[command(flatten)]
    save: SaveArgs,
  },
  /// List the tables of the document.
  Tables,
  /// Show the columns and examples of one table.
  Show { table: String },
  /// Print the raw document as stored.
  Export {
    /// Export the snapshot of this version instead of the current document.
    #[arg(long)]
    version: Option<Uuid>,
  },
  /// Add an empty table.
  AddTable {
    name:        String,
    #[arg(short, long, default_value = "")]
    description: String,
    #[command(flatten)]
    save:        SaveArgs,
  },
  /// Add a complete table from a JSON proposal
  /// (`{ name, description, columns, examples }`); `-` reads stdin.
  Import {
    file: PathBuf,
    #[command(flatten)]
    save: SaveArgs,
  },
  RenameTable {
    table:    String,
    new_name: String,
    #[command(flatten)]
    save:     SaveArgs,
  },
  DescribeTable {
    table:       String,
    description: String,
    #[command(flatten)]
    save:        SaveArgs,
  },
  DropTable {
    table: String,
    #[command(flatten)]
    save:  SaveArgs,
  },
  /// Move a table to a zero-based position.
  MoveTable {
    table: String,
    index: usize,
    #[command(flatten)]
    save:  SaveArgs,
  },
  AddColumn {
    table:       String,
    name:        String,
    /// One of the column kinds, e.g. `symbol`, `float`, `timestamp`.
    column_type: ColumnType,
    #[arg(short, long, default_value = "")]
    description: String,
    #[arg(long)]
    required:    bool,
    #[arg(long)]
    key:         bool,
    #[command(flatten)]
    save:        SaveArgs,
  },
  UpdateColumn {
    table:       String,
    column:      String,
    #[arg(long)]
    name:        Option<String>,
    #[arg(long = "type")]
    column_type: Option<ColumnType>,
    #[arg(short, long)]
    description: Option<String>,
    #[arg(long)]
    required:    Option<bool>,
    #[arg(long)]
    key:         Option<bool>,
    #[command(flatten)]
    save:        SaveArgs,
  },
  DropColumn {
    table:  String,
    column: String,
    #[command(flatten)]
    save:   SaveArgs,
  },
  /// Move a column to a zero-based position within its table.
  MoveColumn {
    table:  String,
    column: String,
    index:  usize,
    #[command(flatten)]
    save:   SaveArgs,
  },
  /// List the version history.
  Versions,
  /// Make a version the active one.
  Activate { version: Uuid },
  /// Structural differences between two versions.
  Diff { from: Uuid, to: Uuid },
}

#[derive(Args, Debug, Clone, Default)]
pub struct SaveArgs {
  /// Also record a new draft version.
  #[arg(long)]
  pub create_version: bool,
  /// Notes for the new version.
  #[arg(long, requires = "create_version")]
  pub notes:          Option<String>,
}

// ─── Execution ───────────────────────────────────────────────────────────────

pub async fn run<S, W>(
  store: Arc<S>,
  schema_id: &str,
  command: Command,
  out: &mut W,
) -> Result<()>
where
  S: SchemaStore + 'static,
  W: Write,
{
  match command {
    Command::Init { save } => {
      let session = EditingSession::new_empty(store, schema_id);
      commit(&session, save, out).await
    }
    Command::Tables => {
      let session = open(store, schema_id).await?;
      print_tables(session.document(), out)
    }
    Command::Show { table } => {
      let session = open(store, schema_id).await?;
      print_table(find(session.document(), &table)?, out)
    }
    Command::Export { version } => {
      let raw = store
        .load_document(schema_id, version)
        .await
        .with_context(|| format!("failed to load schema {schema_id}"))?;
      writeln!(out, "{}", serde_json::to_string_pretty(&raw)?)?;
      Ok(())
    }
    Command::Versions => {
      let mut session = EditingSession::new_empty(store, schema_id);
      session.refresh_versions().await.context("failed to list versions")?;
      for v in session.versions().list() {
        writeln!(
          out,
          "v{:<4} {:<10} {}  {}  {}",
          v.number,
          v.status.to_string(),
          v.created_at.format("%Y-%m-%d %H:%M"),
          v.id,
          v.notes.as_deref().unwrap_or_default()
        )?;
      }
      Ok(())
    }
    Command::Activate { version } => {
      let mut session = EditingSession::new_empty(store, schema_id);
      session.refresh_versions().await.context("failed to list versions")?;
      let activation = session.activate(version).await?;
      match activation.demoted {
        Some(old) => writeln!(out, "activated {version} (deprecated {old})")?,
        None => writeln!(out, "activated {version}")?,
      }
      Ok(())
    }
    Command::Diff { from, to } => {
      let mut session = EditingSession::new_empty(store, schema_id);
      let diff = session.diff_versions(from, to).await?;
      write!(out, "{diff}")?;
      Ok(())
    }
    edit => {
      let mut session = open(store, schema_id).await?;
      let save = apply(session.document_mut(), edit)?;
      commit(&session, save, out).await
    }
  }
}

async fn open<S>(store: Arc<S>, schema_id: &str) -> Result<EditingSession<S>>
where
  S: SchemaStore + 'static,
{
  EditingSession::open(store, schema_id)
    .await
    .with_context(|| format!("failed to load schema {schema_id}"))
}

/// Apply one editing command to the document, returning how to save it.
fn apply(doc: &mut SchemaDocument, command: Command) -> Result<SaveArgs> {
  let save = match command {
    Command::AddTable {
      name,
      description,
      save,
    } => {
      doc.add_table(&name, &description)?;
      save
    }
    Command::Import { file, save } => {
      let proposal = read_proposal(&file)?;
      doc.add_table_from_proposal(proposal)?;
      save
    }
    Command::RenameTable {
      table,
      new_name,
      save,
    } => {
      let id = find(doc, &table)?.id;
      doc.rename_table(id, &new_name)?;
      save
    }
    Command::DescribeTable {
      table,
      description,
      save,
    } => {
      let id = find(doc, &table)?.id;
      doc.set_table_description(id, &description)?;
      save
    }
    Command::DropTable { table, save } => {
      let id = find(doc, &table)?.id;
      doc.delete_table(id)?;
      save
    }
    Command::MoveTable { table, index, save } => {
      let id = find(doc, &table)?.id;
      doc.move_table(id, index)?;
      save
    }
    Command::AddColumn {
      table,
      name,
      column_type,
      description,
      required,
      key,
      save,
    } => {
      let id = find(doc, &table)?.id;
      let column = Column {
        required,
        key,
        ..Column::new(name, column_type).with_description(description)
      };
      doc.push_column(id, column)?;
      save
    }
    Command::UpdateColumn {
      table,
      column,
      name,
      column_type,
      description,
      required,
      key,
      save,
    } => {
      let id = find(doc, &table)?.id;
      let patch = ColumnPatch {
        name,
        column_type,
        description,
        required,
        key,
      };
      if patch == ColumnPatch::default() {
        bail!("nothing to update; pass at least one of --name, --type, --description, --required or --key");
      }
      doc.update_column(id, &column, &patch)?;
      save
    }
    Command::DropColumn {
      table,
      column,
      save,
    } => {
      let id = find(doc, &table)?.id;
      doc.delete_column(id, &column)?;
      save
    }
    Command::MoveColumn {
      table,
      column,
      index,
      save,
    } => {
      let id = find(doc, &table)?.id;
      doc.move_column(id, &column, index)?;
      save
    }
    other => bail!("{other:?} does not edit the document"),
  };
  Ok(save)
}

async fn commit<S, W>(session: &EditingSession<S>, save: SaveArgs, out: &mut W) -> Result<()>
where
  S: SchemaStore + 'static,
  W: Write,
{
  let ack = session
    .save(save.create_version, save.notes)?
    .wait()
    .await
    .with_context(|| format!("failed to save schema {}", session.schema_id()))?;
  match ack.version_id {
    Some(v) => writeln!(out, "saved; created version {v}")?,
    None => writeln!(out, "saved")?,
  }
  Ok(())
}

fn find<'a>(doc: &'a SchemaDocument, name: &str) -> Result<&'a Table> {
  doc
    .table_by_name(name)
    .with_context(|| format!("no table named {name:?}"))
}

fn read_proposal(file: &Path) -> Result<TableProposal> {
  let text = if file.as_os_str() == "-" {
    std::io::read_to_string(std::io::stdin()).context("reading proposal from stdin")?
  } else {
    std::fs::read_to_string(file)
      .with_context(|| format!("reading proposal {}", file.display()))?
  };
  serde_json::from_str(&text).context("parsing table proposal")
}

// ─── Output ──────────────────────────────────────────────────────────────────

fn print_tables(doc: &SchemaDocument, out: &mut impl Write) -> Result<()> {
  if doc.tables().len() == 0 {
    writeln!(out, "no tables ({} document)", doc.shape())?;
    return Ok(());
  }
  let width = doc.tables().map(|t| t.name.len()).max().unwrap_or(0);
  for t in doc.tables() {
    writeln!(
      out,
      "{:<width$}  {:>3} columns  {}",
      t.name,
      t.columns.len(),
      t.description
    )?;
  }
  Ok(())
}

fn print_table(table: &Table, out: &mut impl Write) -> Result<()> {
  writeln!(out, "{}", table.name)?;
  if table.kdb_table_name != table.name {
    writeln!(out, "  physical name: {}", table.kdb_table_name)?;
  }
  if !table.description.is_empty() {
    writeln!(out, "  {}", table.description)?;
  }

  let width = table.columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
  for c in &table.columns {
    let code = c.column_type.type_char().unwrap_or(' ');
    let flags = match (c.key, c.required) {
      (true, _) => "key",
      (false, true) => "req",
      (false, false) => "",
    };
    writeln!(
      out,
      "  {:<width$}  {code} {:<10} {:<3}  {}",
      c.name,
      c.column_type.as_str(),
      flags,
      c.description
    )?;
  }

  for e in &table.examples {
    writeln!(out, "  example: {}", e.natural_language)?;
    writeln!(out, "    {}", e.query)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use schemata_store_sqlite::SqliteStore;
  use serde_json::json;

  use super::*;

  async fn store_with(doc: serde_json::Value) -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store.save_document("eq", doc, false, None).await.unwrap();
    Arc::new(store)
  }

  async fn exec(store: &Arc<SqliteStore>, command: Command) -> Result<String> {
    let mut out = Vec::new();
    run(store.clone(), "eq", command, &mut out).await?;
    Ok(String::from_utf8(out).unwrap())
  }

  fn trades() -> serde_json::Value {
    json!({ "tables": [{ "kdb_table_name": "trades", "columns": [{ "name": "sym", "kdb_type": "symbol" }] }] })
  }

  #[tokio::test]
  async fn add_column_saves_into_the_original_layout() {
    let store = store_with(trades()).await;
    let out = exec(&store, Command::AddColumn {
      table:       "trades".into(),
      name:        "px".into(),
      column_type: ColumnType::Float,
      description: "price".into(),
      required:    true,
      key:         false,
      save:        SaveArgs::default(),
    })
    .await
    .unwrap();
    assert_eq!(out, "saved\n");

    let raw = store.load_document("eq", None).await.unwrap();
    let px = &raw["tables"][0]["columns"][1];
    assert_eq!(px["type"], "float");
    assert_eq!(px["kdb_type"], "float");
    assert_eq!(px["required"], true);
  }

  #[tokio::test]
  async fn tables_and_show() {
    let store = store_with(trades()).await;
    let out = exec(&store, Command::Tables).await.unwrap();
    assert!(out.starts_with("trades"));
    assert!(out.contains("1 columns"));

    let out = exec(&store, Command::Show {
      table: "trades".into(),
    })
    .await
    .unwrap();
    assert!(out.contains("sym"));
    assert!(out.contains(" s symbol"));
  }

  #[tokio::test]
  async fn unknown_table_is_reported() {
    let store = store_with(trades()).await;
    let err = exec(&store, Command::DropTable {
      table: "quotes".into(),
      save:  SaveArgs::default(),
    })
    .await
    .unwrap_err();
    assert!(err.to_string().contains("quotes"));
  }

  #[tokio::test]
  async fn failed_edit_saves_nothing() {
    let store = store_with(trades()).await;
    let err = exec(&store, Command::AddTable {
      name:        "trades".into(),
      description: String::new(),
      save:        SaveArgs {
        create_version: true,
        notes:          None,
      },
    })
    .await;
    assert!(err.is_err());
    assert!(store.list_versions("eq").await.unwrap().is_empty());
    assert_eq!(store.load_document("eq", None).await.unwrap(), trades());
  }

  #[tokio::test]
  async fn version_workflow() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let versioned = || SaveArgs {
      create_version: true,
      notes:          Some("step".into()),
    };
    exec(&store, Command::Init { save: versioned() }).await.unwrap();
    exec(&store, Command::AddTable {
      name:        "orders".into(),
      description: "open orders".into(),
      save:        versioned(),
    })
    .await
    .unwrap();

    let versions = store.list_versions("eq").await.unwrap();
    assert_eq!(versions.len(), 2);
    let (v1, v2) = (versions[0].id, versions[1].id);

    let out = exec(&store, Command::Versions).await.unwrap();
    assert_eq!(out.lines().count(), 2);

    let out = exec(&store, Command::Diff { from: v1, to: v2 }).await.unwrap();
    assert!(out.contains("orders"));

    exec(&store, Command::Activate { version: v2 }).await.unwrap();
    let out = exec(&store, Command::Activate { version: v1 }).await.unwrap();
    assert_eq!(out, format!("activated {v1} (deprecated {v2})\n"));

    let out = exec(&store, Command::Export { version: Some(v1) }).await.unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(&out).unwrap(), json!({}));
  }

  #[tokio::test]
  async fn empty_column_update_is_rejected() {
    let store = store_with(trades()).await;
    let err = exec(&store, Command::UpdateColumn {
      table:       "trades".into(),
      column:      "sym".into(),
      name:        None,
      column_type: None,
      description: None,
      required:    None,
      key:         None,
      save:        SaveArgs::default(),
    })
    .await;
    assert!(err.is_err());
  }
}
