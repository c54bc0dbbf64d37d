//! Command line driver for the `harvester` pipeline.
//!
//! # Usage
//!
//! ```bash
//! # Harvest every open-access record matching a query into a table and a bucket
//! harvester harvest --keywords "cyber physical system" --openaccess \
//!   --tablename Articles --pkname ID --pktype N --bucketname papers
//!
//! # Same, but keep everything in memory and print what would have been stored
//! harvester harvest --keywords "cyber physical system" --tablename Articles \
//!   --pkname ID --pktype N --dry-run
//!
//! # Remove the table and the bucket again
//! harvester teardown --tablename Articles --bucketname papers
//! ```
//!
//! Settings may also come from a TOML file passed with `--config`; flags override it. Use `-v`
//! (repeatable) for more logging, or set `RUST_LOG`.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{builder::ArgAction, Args, Parser, Subcommand};
use console::style;
use harvester::{
  config::{ConfigFile, Credentials, HarvestConfig, KeySchema, KeyType, TableConfig},
  harvest::Harvester,
  prelude::*,
  query::ApiEndpoint,
  report::HarvestReport,
  storage::{
    load_aws_config, Attribute, DynamoStore, Item, MemoryKeyValueStore, MemoryObjectStore,
    S3Store,
  },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

pub mod commands;
pub mod error;

use crate::{commands::*, error::*};

/// Prefix for information messages
static INFO_PREFIX: &str = "ℹ ";
/// Prefix for success messages
static SUCCESS_PREFIX: &str = "✓ ";
/// Prefix for warning messages
static WARNING_PREFIX: &str = "⚠️ ";
/// Prefix for error messages
static ERROR_PREFIX: &str = "✗ ";

/// Command line interface configuration and argument parsing
#[derive(Parser)]
#[command(author, version, about = "Bulk harvester for scholarly article metadata")]
pub struct Cli {
  /// Verbose mode (-v, -vv, -vvv) for different levels of logging detail
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// The subcommand to execute
  #[command(subcommand)]
  command: Commands,

  /// Skip all prompts and accept defaults (mostly for testing)
  #[arg(long, hide = true, global = true)]
  accept_defaults: bool,
}

/// Configures the logging system based on the verbosity level
///
/// `RUST_LOG` takes precedence. Otherwise the verbosity levels are:
/// - 0: error (default)
/// - 1: warn
/// - 2: info
/// - 3: debug
/// - 4+: trace
fn setup_logging(verbosity: u8) {
  let filter = match verbosity {
    0 => "error",
    1 => "warn",
    2 => "info",
    3 => "debug",
    _ => "trace",
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_file(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .with_target(true)
    .init();
}

/// Entry point for the harvester CLI
///
/// Startup failures (bad flags, missing credentials, an unreachable API) are printed and end the
/// process with a non-zero status. Failures of individual pages or records are listed in the
/// final report and do not change the exit status.
#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  setup_logging(cli.verbose);

  let result = match &cli.command {
    Commands::Harvest(args) => harvest(args).await,
    Commands::Teardown(args) => teardown(&cli, args).await,
  };
  if let Err(e) = &result {
    eprintln!("{} {e}", style(ERROR_PREFIX).red());
  }
  result
}
