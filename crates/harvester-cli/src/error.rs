//! Error types for the harvester CLI.

use thiserror::Error;

use super::*;

/// Error type alias used for the CLI.
pub type Result<T> = core::result::Result<T, CliError>;

/// Errors that can end a CLI invocation.
#[derive(Error, Debug)]
pub enum CliError {
  /// The harvester library failed.
  #[error(transparent)]
  Harvest(#[from] HarvestError),

  /// An interactive prompt failed.
  #[error(transparent)]
  Dialog(#[from] dialoguer::Error),

  /// Writing to the terminal failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),
}
