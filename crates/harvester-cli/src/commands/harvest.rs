//! The `harvest` command.

use super::*;

/// Shortest pause a fetch worker may take after each page.
const MIN_RATE_LIMIT: Duration = Duration::from_secs(1);

/// Flags of the `harvest` command.
///
/// Flags given here override values from `--config`.
#[derive(Args, Clone, Debug)]
pub struct HarvestArgs {
  /// Keyword expression to search for
  #[arg(long, required_unless_present = "config")]
  pub keywords: Option<String>,

  /// Only harvest open-access records
  #[arg(long)]
  pub openaccess: bool,

  /// Records per listing page (at most 50)
  #[arg(long)]
  pub records: Option<usize>,

  /// Maximum number of listing pages, -1 for no limit
  #[arg(long, allow_negative_numbers = true)]
  pub maxpages: Option<i64>,

  /// Table the metadata is written to
  #[arg(long, required_unless_present = "config")]
  pub tablename: Option<String>,

  /// Name of the partition key
  #[arg(long, required_unless_present = "config")]
  pub pkname: Option<String>,

  /// Type of the partition key (N or S)
  #[arg(long, required_unless_present = "config")]
  pub pktype: Option<KeyType>,

  /// Name of the sort key
  #[arg(long, requires = "sktype")]
  pub skname: Option<String>,

  /// Type of the sort key (N or S)
  #[arg(long, requires = "skname")]
  pub sktype: Option<KeyType>,

  /// Bucket open-access PDFs are uploaded to; no upload without it
  #[arg(long)]
  pub bucketname: Option<String>,

  /// Number of page fetch workers
  #[arg(long)]
  pub routines: Option<usize>,

  /// Number of record enrichment workers
  #[arg(long)]
  pub store_routines: Option<usize>,

  /// Seconds each fetch worker pauses after a page (at least 1)
  #[arg(long)]
  pub timeout: Option<u64>,

  /// Seconds before an HTTP request is abandoned
  #[arg(long)]
  pub request_timeout: Option<u64>,

  /// Directory for temporary PDF files
  #[arg(long)]
  pub scratch_dir: Option<PathBuf>,

  /// TOML file with default settings
  #[arg(long)]
  pub config: Option<PathBuf>,

  /// Metadata API key
  #[arg(long, env = "HARVESTER_API_KEY", hide_env_values = true)]
  pub apikey: Option<String>,

  /// Metadata API base URL
  #[arg(long, env = "HARVESTER_API_URL", hide = true)]
  pub api_url: Option<String>,

  /// Keep everything in memory and print what would have been stored
  #[arg(long)]
  pub dry_run: bool,

  /// Storage credentials
  #[command(flatten)]
  pub storage: StorageArgs,
}

impl HarvestArgs {
  /// Assembles the run configuration from the config file and the flags.
  pub fn harvest_config(&self) -> Result<HarvestConfig> {
    let mut builder = HarvestConfig::builder(String::new());
    let file = match &self.config {
      Some(path) => {
        debug!("Loading settings from {}", path.display());
        let file = ConfigFile::load(path)?;
        builder = builder.apply_file(&file)?;
        Some(file)
      },
      None => None,
    };

    if let Some(keywords) = &self.keywords {
      builder = builder.keywords(keywords);
    }
    if self.openaccess {
      builder = builder.open_access_only(true);
    }
    if let Some(records) = self.records {
      builder = builder.page_size(records);
    }
    if let Some(max_pages) = self.maxpages {
      builder = builder.max_pages(max_pages);
    }
    builder = builder.table(self.table(file.as_ref().and_then(|file| file.table.as_ref()))?);
    if let Some(bucket) = &self.bucketname {
      builder = builder.bucket(bucket);
    }
    if let Some(workers) = self.routines {
      builder = builder.fetch_workers(workers);
    }
    if let Some(workers) = self.store_routines {
      builder = builder.store_workers(workers);
    }
    if let Some(secs) = self.timeout {
      builder = builder.rate_limit(Duration::from_secs(secs));
    }
    if let Some(secs) = self.request_timeout {
      builder = builder.request_timeout(Duration::from_secs(secs));
    }
    if let Some(dir) = &self.scratch_dir {
      builder = builder.scratch_dir(dir);
    }
    if !self.dry_run {
      builder = builder.credentials(self.storage.credentials()?);
    }

    let mut config = builder.build()?;
    if config.rate_limit < MIN_RATE_LIMIT {
      return Err(
        HarvestError::Config(format!(
          "Timeout must be at least {} second (got {:?})",
          MIN_RATE_LIMIT.as_secs(),
          config.rate_limit
        ))
        .into(),
      );
    }
    if let Some(base_url) = &self.api_url {
      config.api = ApiEndpoint::new(base_url, &config.api.api_key)?;
    }
    if let Some(api_key) = &self.apikey {
      config.api.api_key = api_key.clone();
    }
    if config.api.api_key.is_empty() {
      warn!("No API key given, the metadata API will most likely refuse every request");
    }
    Ok(config)
  }

  /// Merges the table flags over the `[table]` section of the config file.
  fn table(&self, file_table: Option<&TableConfig>) -> Result<TableConfig> {
    let name = self.tablename.clone().or_else(|| file_table.map(|table| table.name.clone()));
    let pk_name =
      self.pkname.clone().or_else(|| file_table.map(|table| table.primary_key.name.clone()));
    let pk_type = self.pktype.or_else(|| file_table.map(|table| table.primary_key.key_type));
    let (Some(name), Some(pk_name), Some(pk_type)) = (name, pk_name, pk_type) else {
      return Err(
        HarvestError::Config(
          "Table is incomplete, give --tablename, --pkname and --pktype or a [table] section"
            .into(),
        )
        .into(),
      );
    };

    let sort_key = match (&self.skname, self.sktype) {
      (Some(sk_name), Some(sk_type)) => Some(KeySchema::new(sk_name, sk_type)),
      _ => file_table.and_then(|table| table.sort_key.clone()),
    };
    let table = TableConfig::new(name, KeySchema::new(pk_name, pk_type));
    Ok(match sort_key {
      Some(sort_key) => table.with_sort_key(sort_key),
      None => table,
    })
  }
}

/// Function for the [`Commands::Harvest`] in the CLI.
pub async fn harvest(args: &HarvestArgs) -> Result<()> {
  let config = args.harvest_config()?;
  let table = config.table.name.clone();
  let upload = config.upload_enabled();
  let wait = config.backend_wait;
  println!(
    "{} Harvesting \"{}\" into table {}",
    style(INFO_PREFIX).cyan(),
    style(config.search_expression()).yellow(),
    style(&table).yellow()
  );

  let token = CancellationToken::new();
  let ctrl_c = token.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("{} Interrupted, finishing with a partial report", style(WARNING_PREFIX).yellow());
      ctrl_c.cancel();
    }
  });

  let report = if args.dry_run {
    println!("{} Dry run, nothing is written to storage", style(INFO_PREFIX).cyan());
    let kv = Arc::new(MemoryKeyValueStore::new());
    let mut builder =
      Harvester::builder(config).key_value_store(kv.clone()).cancellation_token(token);
    if upload {
      builder = builder.object_store(Arc::new(MemoryObjectStore::new()));
    }
    let report = builder.build()?.run().await?;
    print_items(&kv.items(&table));
    report
  } else {
    let sdk_config = load_aws_config(&config.credentials).await?;
    let mut builder = Harvester::builder(config)
      .key_value_store(Arc::new(DynamoStore::new(&sdk_config, wait)))
      .cancellation_token(token);
    if upload {
      builder = builder.object_store(Arc::new(S3Store::new(&sdk_config, wait)));
    }
    builder.build()?.run().await?
  };

  print_report(&report);
  Ok(())
}

/// Text of a string or number attribute.
fn attribute_text(item: &Item, name: &str) -> String {
  match item.get(name) {
    Some(Attribute::S(text)) | Some(Attribute::N(text)) => text.clone(),
    _ => String::new(),
  }
}

/// Lists the items a dry run would have stored.
fn print_items(items: &[Item]) {
  println!("{} {} items would have been stored:", style(INFO_PREFIX).cyan(), items.len());
  for item in items {
    let file_name = attribute_text(item, "FileName");
    println!(
      "  {} {}{}",
      style(attribute_text(item, "ID")).dim(),
      attribute_text(item, "Title"),
      if file_name.is_empty() { String::new() } else { format!(" [{file_name}]") }
    );
  }
}

/// Prints the run summary.
fn print_report(report: &HarvestReport) {
  println!("{report}");
  if report.is_clean() {
    println!(
      "{} Stored {} items, uploaded {} artifacts",
      style(SUCCESS_PREFIX).green(),
      report.items_stored,
      report.artifacts_uploaded
    );
  } else {
    println!(
      "{} Finished with {} errors and {} unprocessed jobs",
      style(WARNING_PREFIX).yellow(),
      report.error_count(),
      report.unprocessed
    );
  }
}

#[cfg(test)]
mod tests {
  use clap::Parser;

  use super::*;

  fn parse(args: &[&str]) -> HarvestArgs {
    let cli = Cli::try_parse_from([&["harvester", "harvest"][..], args].concat()).unwrap();
    match cli.command {
      Commands::Harvest(args) => args,
      Commands::Teardown(_) => unreachable!(),
    }
  }

  #[test]
  fn test_flags_build_config() {
    let args = parse(&[
      "--keywords",
      "graph theory",
      "--openaccess",
      "--records",
      "25",
      "--maxpages",
      "-1",
      "--tablename",
      "Articles",
      "--pkname",
      "ID",
      "--pktype",
      "N",
      "--skname",
      "Title",
      "--sktype",
      "S",
      "--routines",
      "3",
      "--timeout",
      "2",
      "--apikey",
      "secret",
      "--dry-run",
    ]);
    let config = args.harvest_config().unwrap();
    assert_eq!(config.search_expression(), "graph theory openaccess:true");
    assert_eq!(config.page_size, 25);
    assert_eq!(config.max_pages, -1);
    assert_eq!(config.fetch_workers, 3);
    assert_eq!(config.rate_limit, Duration::from_secs(2));
    assert_eq!(config.table.sort_key, Some(KeySchema::new("Title", KeyType::String)));
    assert_eq!(config.api.api_key, "secret");
    assert!(!config.upload_enabled());
  }

  #[test]
  fn test_flags_override_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvest.toml");
    std::fs::write(
      &path,
      r#"
        keywords = "from file"
        page_size = 40
        bucket = "papers"

        [table]
        name = "FileTable"
        primary_key = { name = "ID", key_type = "N" }
      "#,
    )
    .unwrap();

    let args = parse(&["--config", path.to_str().unwrap(), "--records", "5", "--dry-run"]);
    let config = args.harvest_config().unwrap();
    assert_eq!(config.keywords, "from file");
    assert_eq!(config.page_size, 5);
    assert_eq!(config.table.name, "FileTable");
    assert_eq!(config.bucket.as_deref(), Some("papers"));
  }

  #[test]
  fn test_table_flags_override_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvest.toml");
    std::fs::write(
      &path,
      r#"
        keywords = "from file"

        [table]
        name = "FileTable"
        primary_key = { name = "ID", key_type = "N" }
        sort_key = { name = "Title", key_type = "S" }
      "#,
    )
    .unwrap();
    let path = path.to_str().unwrap();

    let config = parse(&["--config", path, "--tablename", "FlagTable", "--dry-run"])
      .harvest_config()
      .unwrap();
    assert_eq!(config.table.name, "FlagTable");
    assert_eq!(config.table.primary_key, KeySchema::new("ID", KeyType::Number));
    assert_eq!(config.table.sort_key, Some(KeySchema::new("Title", KeyType::String)));

    let config =
      parse(&["--config", path, "--pkname", "DOI", "--pktype", "S", "--dry-run"])
        .harvest_config()
        .unwrap();
    assert_eq!(config.table.name, "FileTable");
    assert_eq!(config.table.primary_key, KeySchema::new("DOI", KeyType::String));
  }

  #[test]
  fn test_incomplete_table_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvest.toml");
    std::fs::write(&path, "keywords = \"from file\"\n").unwrap();

    let err = parse(&["--config", path.to_str().unwrap(), "--tablename", "Articles", "--dry-run"])
      .harvest_config()
      .unwrap_err();
    assert!(err.to_string().contains("Table is incomplete"));
  }

  #[test]
  fn test_rate_limit_below_one_second_is_rejected() {
    let args = parse(&[
      "--keywords",
      "graphs",
      "--tablename",
      "Articles",
      "--pkname",
      "ID",
      "--pktype",
      "N",
      "--timeout",
      "0",
      "--dry-run",
    ]);
    let err = args.harvest_config().unwrap_err();
    assert!(err.to_string().contains("Timeout must be at least 1 second"));
  }

  #[test]
  fn test_partial_credentials_are_rejected() {
    let args = parse(&[
      "--keywords",
      "graphs",
      "--tablename",
      "Articles",
      "--pkname",
      "ID",
      "--pktype",
      "N",
      "--accesskey",
      "AKIA",
    ]);
    let err = args.harvest_config().unwrap_err();
    assert!(err.to_string().contains("secret key, region"));
  }
}
