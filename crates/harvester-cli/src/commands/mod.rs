//! Subcommands of the harvester CLI.

use super::*;

pub mod harvest;
pub mod teardown;

pub use harvest::{harvest, HarvestArgs};
pub use teardown::{teardown, TeardownArgs};

/// Default seconds to wait for a table or bucket change to become visible.
const DEFAULT_BACKEND_WAIT_SECS: u64 = 300;

/// Available commands for the CLI
#[derive(Subcommand, Clone)]
pub enum Commands {
  /// Query the metadata API and store every matching record
  Harvest(HarvestArgs),

  /// Delete a table and, optionally, a bucket with all its objects
  Teardown(TeardownArgs),
}

/// Credential flags shared by every command that talks to the storage backends.
///
/// Give all three or none; with none, the ambient AWS provider chain is used.
#[derive(Args, Clone, Debug, Default)]
pub struct StorageArgs {
  /// Access key id
  #[arg(long)]
  pub accesskey: Option<String>,

  /// Secret access key
  #[arg(long)]
  pub secretkey: Option<String>,

  /// Region of the table and the bucket
  #[arg(long)]
  pub region: Option<String>,
}

impl StorageArgs {
  /// Resolves the flags into credentials.
  pub fn credentials(&self) -> Result<Credentials> {
    Ok(Credentials::from_parts(self.accesskey.clone(), self.secretkey.clone(), self.region.clone())?)
  }
}
