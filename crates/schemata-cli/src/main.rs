//! `schemata` — inspect and edit schema documents from the terminal.
//!
//! # Usage
//!
//! ```
//! schemata --schema 42 tables
//! schemata --schema 42 add-column trades px float --create-version --notes "add price"
//! schemata --store ./schemas.db --schema local init
//! ```

mod commands;
mod settings;

use std::{io, path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use clap::Parser;
use commands::Command;
use schemata_client::ApiClient;
use schemata_store_sqlite::SqliteStore;
use settings::{DEFAULT_CONFIG, Overrides, Settings};
use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "schemata", version, about = "Edit table schema documents")]
struct Cli {
  /// Path to a TOML config file (url, store_path, timeout_secs).
  #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
  config: PathBuf,

  /// Base URL of the schema-manager service (default: http://localhost:8000).
  #[arg(long, env = "SCHEMATA_URL")]
  url: Option<String>,

  /// Use a local SQLite file instead of the service.
  #[arg(long, value_name = "PATH", env = "SCHEMATA_STORE_PATH")]
  store: Option<PathBuf>,

  /// Request timeout in seconds.
  #[arg(long, value_name = "SECS")]
  timeout: Option<u64>,

  /// Id of the schema to operate on.
  #[arg(short, long, env = "SCHEMATA_SCHEMA")]
  schema: String,

  #[command(subcommand)]
  command: Command,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Flags override environment, which overrides the config file.
  let settings = Settings::load(&cli.config)?.apply(Overrides {
    url:          cli.url,
    store_path:   cli.store,
    timeout_secs: cli.timeout,
  });
  debug!(?settings, "resolved settings");

  let mut out = io::stdout().lock();
  match &settings.store_path {
    Some(path) => {
      let store = SqliteStore::open(path)
        .await
        .with_context(|| format!("failed to open store at {}", path.display()))?;
      commands::run(Arc::new(store), &cli.schema, cli.command, &mut out).await
    }
    None => {
      let client = ApiClient::new(settings.api_config()).context("failed to build HTTP client")?;
      commands::run(Arc::new(client), &cli.schema, cli.command, &mut out).await
    }
  }
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn cli_definition_is_consistent() { Cli::command().debug_assert(); }

  #[test]
  fn parses_column_types_case_insensitively() {
    let cli = Cli::try_parse_from([
      "schemata", "--schema", "42", "add-column", "trades", "px", "FLOAT", "--required",
    ])
    .unwrap();
    assert!(matches!(
      cli.command,
      Command::AddColumn {
        column_type: schemata_core::column::ColumnType::Float,
        required: true,
        ..
      }
    ));
  }

  #[test]
  fn notes_require_create_version() {
    let parsed = Cli::try_parse_from([
      "schemata", "--schema", "42", "drop-table", "trades", "--notes", "x",
    ]);
    assert!(parsed.is_err());
  }
}
