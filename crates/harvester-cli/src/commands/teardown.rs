//! The `teardown` command.

use dialoguer::Confirm;

use super::*;

/// Flags of the `teardown` command.
#[derive(Args, Clone, Debug)]
pub struct TeardownArgs {
  /// Table to delete
  #[arg(long)]
  pub tablename: String,

  /// Bucket to empty and delete
  #[arg(long)]
  pub bucketname: Option<String>,

  /// Seconds to wait for each deletion to become visible
  #[arg(long, default_value_t = DEFAULT_BACKEND_WAIT_SECS)]
  pub backend_wait: u64,

  /// Storage credentials
  #[command(flatten)]
  pub storage: StorageArgs,
}

/// Function for the [`Commands::Teardown`] in the CLI.
pub async fn teardown(cli: &Cli, args: &TeardownArgs) -> Result<()> {
  let target = match &args.bucketname {
    Some(bucket) => format!("table {} and bucket {bucket}", args.tablename),
    None => format!("table {}", args.tablename),
  };
  println!("{} This deletes {} with everything in it", style(WARNING_PREFIX).yellow(), target);

  if !cli.accept_defaults
    && !Confirm::new()
      .with_prompt(format!("Are you sure you want to delete {target}?"))
      .default(false)
      .wait_for_newline(true)
      .interact()?
  {
    println!("{} Operation cancelled", style(ERROR_PREFIX).red());
    return Ok(());
  }

  let sdk_config = load_aws_config(&args.storage.credentials()?).await?;
  let wait = Duration::from_secs(args.backend_wait);
  let objects = S3Store::new(&sdk_config, wait);
  let bucket = args.bucketname.as_deref().map(|bucket| (&objects as &dyn ObjectStore, bucket));
  remove_resources(&DynamoStore::new(&sdk_config, wait), bucket, &args.tablename).await?;
  Ok(())
}

/// Empties and deletes the bucket, if any, then deletes the table.
///
/// Returns the number of objects deleted.
async fn remove_resources(
  kv: &dyn KeyValueStore,
  bucket: Option<(&dyn ObjectStore, &str)>,
  table: &str,
) -> Result<usize> {
  let mut deleted = 0;
  if let Some((objects, bucket)) = bucket {
    for key in objects.list_objects(bucket).await? {
      debug!("Deleting {key} from {bucket}");
      objects.delete_object(bucket, &key).await?;
      deleted += 1;
    }
    objects.delete_bucket(bucket).await?;
    println!(
      "{} Deleted bucket {} and its {deleted} objects",
      style(SUCCESS_PREFIX).green(),
      style(bucket).yellow()
    );
  }

  kv.delete_table(table).await?;
  println!("{} Deleted table {}", style(SUCCESS_PREFIX).green(), style(table).yellow());
  Ok(deleted)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_remove_resources() {
    let kv = MemoryKeyValueStore::new();
    kv.create_table(&TableConfig::new("Articles", KeySchema::new("ID", KeyType::Number)))
      .await
      .unwrap();
    let objects = MemoryObjectStore::new();
    objects.create_bucket("papers").await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.pdf", "b.pdf"] {
      let path = dir.path().join(name);
      std::fs::write(&path, b"%PDF-1.4").unwrap();
      objects.upload_file("papers", name, &path).await.unwrap();
    }

    let bucket = Some((&objects as &dyn ObjectStore, "papers"));
    let deleted = remove_resources(&kv, bucket, "Articles").await.unwrap();
    assert_eq!(deleted, 2);
    assert!(objects.list_buckets().await.unwrap().is_empty());
    assert!(kv.list_tables().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_missing_table_is_an_error() {
    let kv = MemoryKeyValueStore::new();
    assert!(remove_resources(&kv, None, "Articles").await.is_err());
  }
}
