//! Run configuration.
//!
//! A [`HarvestConfig`] is assembled once at startup, validated, and then shared read-only with
//! every worker. It can be built programmatically through [`HarvestConfig::builder`] or seeded
//! from a TOML file with [`ConfigFile`].
//!
//! ```toml
//! keywords = "decompilation techniques"
//! open_access_only = true
//! page_size = 25
//! max_pages = -1
//! fetch_workers = 8
//! store_workers = 16
//! rate_limit_secs = 2
//!
//! [table]
//! name = "Articles"
//! primary_key = { name = "ID", key_type = "N" }
//! ```

use super::*;

/// Largest page the metadata API will serve.
pub const MAX_PAGE_SIZE: usize = 50;

/// Default number of records requested per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Default ceiling on the number of listing pages fetched.
pub const DEFAULT_MAX_PAGES: i64 = 100;

/// Default number of workers in each pool.
pub const DEFAULT_WORKERS: usize = 10;

/// Host prefix that open-access PDFs are served from.
pub const DEFAULT_CONTENT_HOST: &str = "https://link.springer.com/content/pdf/";

/// Attribute type of a table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
  /// Numeric attribute (`N`)
  #[serde(rename = "N")]
  Number,
  /// String attribute (`S`)
  #[serde(rename = "S")]
  String,
}

impl Display for KeyType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      KeyType::Number => write!(f, "N"),
      KeyType::String => write!(f, "S"),
    }
  }
}

impl FromStr for KeyType {
  type Err = HarvestError;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "N" => Ok(KeyType::Number),
      "S" => Ok(KeyType::String),
      other => Err(HarvestError::Config(format!(
        "Invalid key type - \"{other}\". Should be 'N' (Number) or 'S' (String)"
      ))),
    }
  }
}

/// Name and type of one table key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
  /// Attribute name of the key
  pub name:     String,
  /// Attribute type of the key
  pub key_type: KeyType,
}

impl KeySchema {
  /// Creates a key schema.
  pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
    Self { name: name.into(), key_type }
  }
}

/// The key-value table records are written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
  /// Table name
  pub name:        String,
  /// Partition key
  pub primary_key: KeySchema,
  /// Optional sort key
  #[serde(default)]
  pub sort_key:    Option<KeySchema>,
}

impl TableConfig {
  /// Creates a table description with a partition key only.
  pub fn new(name: impl Into<String>, primary_key: KeySchema) -> Self {
    Self { name: name.into(), primary_key, sort_key: None }
  }

  /// Adds a sort key.
  pub fn with_sort_key(mut self, sort_key: KeySchema) -> Self {
    self.sort_key = Some(sort_key);
    self
  }
}

/// Credential material for the storage backends.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credentials {
  /// Explicit access key pair and region.
  Static {
    /// Access key id
    access_key: String,
    /// Secret access key
    secret_key: String,
    /// Region of both backends
    region:     String,
  },
  /// Whatever the ambient provider chain (environment, shared config files) yields.
  #[default]
  Ambient,
}

impl Credentials {
  /// Resolves the three optional credential flags.
  ///
  /// All three present gives [`Credentials::Static`], none gives [`Credentials::Ambient`], and
  /// anything in between is an error naming what is missing.
  pub fn from_parts(
    access_key: Option<String>,
    secret_key: Option<String>,
    region: Option<String>,
  ) -> Result<Self> {
    let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
    match (non_empty(access_key), non_empty(secret_key), non_empty(region)) {
      (Some(access_key), Some(secret_key), Some(region)) =>
        Ok(Credentials::Static { access_key, secret_key, region }),
      (None, None, None) => Ok(Credentials::Ambient),
      (access_key, secret_key, region) => {
        let missing: Vec<&str> = [
          (access_key.is_none(), "access key id"),
          (secret_key.is_none(), "secret key"),
          (region.is_none(), "region"),
        ]
        .into_iter()
        .filter_map(|(absent, name)| absent.then_some(name))
        .collect();
        Err(HarvestError::Credentials(format!("missing {}", missing.join(", "))))
      },
    }
  }
}

/// Immutable configuration of one harvesting run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
  /// Free-text keyword expression
  pub keywords:         String,
  /// Restrict the search to open-access records
  pub open_access_only: bool,
  /// Records requested per listing page
  pub page_size:        usize,
  /// Ceiling on listing pages, `-1` for no ceiling
  pub max_pages:        i64,
  /// Workers in the page fetch pool
  pub fetch_workers:    usize,
  /// Workers in the record enrichment pool
  pub store_workers:    usize,
  /// Pause each fetch worker takes after a successful page
  pub rate_limit:       Duration,
  /// Upper bound on any single HTTP request
  pub request_timeout:  Duration,
  /// Upper bound on waiting for a backend resource to become visible
  pub backend_wait:     Duration,
  /// Destination table
  pub table:            TableConfig,
  /// Destination bucket; artifacts are uploaded only when set
  pub bucket:           Option<String>,
  /// Metadata API location and key
  pub api:              ApiEndpoint,
  /// Host prefix artifact URLs are derived from
  pub content_host:     String,
  /// Directory temporary artifact files are written to
  pub scratch_dir:      PathBuf,
  /// Storage backend credentials
  pub credentials:      Credentials,
}

impl HarvestConfig {
  /// Starts building a configuration for the given keyword expression.
  pub fn builder(keywords: impl Into<String>) -> HarvestConfigBuilder {
    HarvestConfigBuilder::new(keywords.into())
  }

  /// Whether open-access artifacts should be uploaded.
  pub fn upload_enabled(&self) -> bool { self.bucket.is_some() }

  /// The keyword expression as sent to the API, including the open-access filter.
  ///
  /// The filter is appended before escaping, so its space is escaped like any other.
  pub fn search_expression(&self) -> String {
    if self.open_access_only {
      format!("{} openaccess:true", self.keywords)
    } else {
      self.keywords.clone()
    }
  }

  /// Checks every range constraint.
  pub fn validate(&self) -> Result<()> {
    if self.keywords.trim().is_empty() {
      return Err(HarvestError::Config("Keywords are not specified".into()));
    }
    if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
      return Err(HarvestError::Config(format!(
        "Page length must be between 1 and {MAX_PAGE_SIZE} (got {})",
        self.page_size
      )));
    }
    if self.fetch_workers == 0 || self.store_workers == 0 {
      return Err(HarvestError::Config("Worker counts must be at least 1".into()));
    }
    if self.table.name.is_empty() {
      return Err(HarvestError::Config("Table name is not specified".into()));
    }
    if self.table.primary_key.name.is_empty() {
      return Err(HarvestError::Config("Primary key is not specified".into()));
    }
    if matches!(&self.bucket, Some(bucket) if bucket.is_empty()) {
      return Err(HarvestError::Config("Bucket name is empty".into()));
    }
    Ok(())
  }
}

/// Builder for [`HarvestConfig`].
#[derive(Debug, Clone)]
pub struct HarvestConfigBuilder {
  /// The configuration under construction
  config: HarvestConfig,
}

impl HarvestConfigBuilder {
  /// Creates a builder populated with defaults.
  fn new(keywords: String) -> Self {
    Self {
      config: HarvestConfig {
        keywords,
        open_access_only: false,
        page_size: DEFAULT_PAGE_SIZE,
        max_pages: DEFAULT_MAX_PAGES,
        fetch_workers: DEFAULT_WORKERS,
        store_workers: DEFAULT_WORKERS,
        rate_limit: Duration::from_secs(1),
        request_timeout: Duration::from_secs(60),
        backend_wait: Duration::from_secs(300),
        table: TableConfig::new("", KeySchema::new("", KeyType::Number)),
        bucket: None,
        api: ApiEndpoint::default(),
        content_host: DEFAULT_CONTENT_HOST.to_string(),
        scratch_dir: std::env::temp_dir(),
        credentials: Credentials::Ambient,
      },
    }
  }

  /// Replaces the keyword expression.
  pub fn keywords(mut self, keywords: impl Into<String>) -> Self {
    self.config.keywords = keywords.into();
    self
  }

  /// Restricts the search to open-access records.
  pub fn open_access_only(mut self, open_access_only: bool) -> Self {
    self.config.open_access_only = open_access_only;
    self
  }

  /// Sets the records requested per page.
  pub fn page_size(mut self, page_size: usize) -> Self {
    self.config.page_size = page_size;
    self
  }

  /// Sets the page ceiling; negative means unbounded.
  pub fn max_pages(mut self, max_pages: i64) -> Self {
    self.config.max_pages = max_pages;
    self
  }

  /// Sets the size of the page fetch pool.
  pub fn fetch_workers(mut self, workers: usize) -> Self {
    self.config.fetch_workers = workers;
    self
  }

  /// Sets the size of the record enrichment pool.
  pub fn store_workers(mut self, workers: usize) -> Self {
    self.config.store_workers = workers;
    self
  }

  /// Sets the post-fetch pause of each fetch worker.
  pub fn rate_limit(mut self, rate_limit: Duration) -> Self {
    self.config.rate_limit = rate_limit;
    self
  }

  /// Sets the per-request timeout.
  pub fn request_timeout(mut self, timeout: Duration) -> Self {
    self.config.request_timeout = timeout;
    self
  }

  /// Sets the deadline for backend resources to become visible.
  pub fn backend_wait(mut self, wait: Duration) -> Self {
    self.config.backend_wait = wait;
    self
  }

  /// Sets the destination table.
  pub fn table(mut self, table: TableConfig) -> Self {
    self.config.table = table;
    self
  }

  /// Sets the destination bucket, enabling artifact upload.
  pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
    self.config.bucket = Some(bucket.into());
    self
  }

  /// Sets the metadata API endpoint.
  pub fn api(mut self, api: ApiEndpoint) -> Self {
    self.config.api = api;
    self
  }

  /// Sets the host prefix artifact URLs are derived from.
  pub fn content_host(mut self, content_host: impl Into<String>) -> Self {
    self.config.content_host = content_host.into();
    self
  }

  /// Sets the directory for temporary artifact files.
  pub fn scratch_dir(mut self, dir: impl AsRef<Path>) -> Self {
    self.config.scratch_dir = dir.as_ref().to_path_buf();
    self
  }

  /// Sets the storage credentials.
  pub fn credentials(mut self, credentials: Credentials) -> Self {
    self.config.credentials = credentials;
    self
  }

  /// Applies every value present in a configuration file.
  pub fn apply_file(mut self, file: &ConfigFile) -> Result<Self> {
    if let Some(keywords) = &file.keywords {
      self.config.keywords = keywords.clone();
    }
    if let Some(open_access_only) = file.open_access_only {
      self.config.open_access_only = open_access_only;
    }
    if let Some(page_size) = file.page_size {
      self.config.page_size = page_size;
    }
    if let Some(max_pages) = file.max_pages {
      self.config.max_pages = max_pages;
    }
    if let Some(workers) = file.fetch_workers {
      self.config.fetch_workers = workers;
    }
    if let Some(workers) = file.store_workers {
      self.config.store_workers = workers;
    }
    if let Some(secs) = file.rate_limit_secs {
      self.config.rate_limit = Duration::from_secs(secs);
    }
    if let Some(secs) = file.request_timeout_secs {
      self.config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(table) = &file.table {
      self.config.table = table.clone();
    }
    if let Some(bucket) = &file.bucket {
      self.config.bucket = Some(bucket.clone());
    }
    if let Some(base_url) = &file.api_base_url {
      self.config.api = ApiEndpoint::new(base_url, &self.config.api.api_key)?;
    }
    if let Some(api_key) = &file.api_key {
      self.config.api.api_key = api_key.clone();
    }
    if let Some(dir) = &file.scratch_dir {
      self.config.scratch_dir = dir.clone();
    }
    Ok(self)
  }

  /// Validates and returns the configuration.
  pub fn build(self) -> Result<HarvestConfig> {
    self.config.validate()?;
    if self.config.max_pages < -1 {
      warn!(
        "Max number of pages ({}) is less than -1, treating it as unbounded",
        self.config.max_pages
      );
    }
    Ok(self.config)
  }
}

/// Optional settings read from a TOML file.
///
/// Every field is optional; values present here are applied before command line flags.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
  /// Keyword expression
  pub keywords:             Option<String>,
  /// Open-access filter
  pub open_access_only:     Option<bool>,
  /// Records per page
  pub page_size:            Option<usize>,
  /// Page ceiling
  pub max_pages:            Option<i64>,
  /// Fetch pool size
  pub fetch_workers:        Option<usize>,
  /// Enrichment pool size
  pub store_workers:        Option<usize>,
  /// Rate limit in seconds
  pub rate_limit_secs:      Option<u64>,
  /// Request timeout in seconds
  pub request_timeout_secs: Option<u64>,
  /// Destination table
  pub table:                Option<TableConfig>,
  /// Destination bucket
  pub bucket:               Option<String>,
  /// Metadata API base URL
  pub api_base_url:         Option<String>,
  /// Metadata API key
  pub api_key:              Option<String>,
  /// Scratch directory for artifacts
  pub scratch_dir:          Option<PathBuf>,
}

impl ConfigFile {
  /// Parses a configuration from a TOML string.
  pub fn from_toml_str(toml_str: &str) -> Result<Self> { Ok(toml::from_str(toml_str)?) }

  /// Reads and parses a TOML configuration file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table() -> TableConfig { TableConfig::new("Articles", KeySchema::new("ID", KeyType::Number)) }

  #[test]
  fn test_defaults() {
    let config = HarvestConfig::builder("graphs").table(table()).build().unwrap();
    assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    assert_eq!(config.max_pages, DEFAULT_MAX_PAGES);
    assert_eq!(config.fetch_workers, DEFAULT_WORKERS);
    assert!(!config.upload_enabled());
    assert_eq!(config.credentials, Credentials::Ambient);
  }

  #[test]
  fn test_page_size_is_capped() {
    let result = HarvestConfig::builder("graphs").table(table()).page_size(51).build();
    assert!(matches!(result, Err(HarvestError::Config(_))));
    let result = HarvestConfig::builder("graphs").table(table()).page_size(0).build();
    assert!(matches!(result, Err(HarvestError::Config(_))));
    assert!(HarvestConfig::builder("graphs").table(table()).page_size(50).build().is_ok());
  }

  #[test]
  fn test_missing_required_values() {
    assert!(HarvestConfig::builder("").table(table()).build().is_err());
    assert!(HarvestConfig::builder("graphs").build().is_err());
    assert!(HarvestConfig::builder("graphs").table(table()).store_workers(0).build().is_err());
  }

  #[traced_test]
  #[test]
  fn test_negative_ceiling_below_minus_one_warns() {
    let config = HarvestConfig::builder("graphs").table(table()).max_pages(-5).build().unwrap();
    assert_eq!(config.max_pages, -5);
    assert!(logs_contain("less than -1"));
  }

  #[test]
  fn test_search_expression_appends_filter() {
    let config = HarvestConfig::builder("cyber physical system")
      .open_access_only(true)
      .table(table())
      .build()
      .unwrap();
    assert_eq!(config.search_expression(), "cyber physical system openaccess:true");
  }

  #[test]
  fn test_key_type_parsing() {
    assert_eq!("N".parse::<KeyType>().unwrap(), KeyType::Number);
    assert_eq!("S".parse::<KeyType>().unwrap(), KeyType::String);
    assert!("B".parse::<KeyType>().is_err());
    assert_eq!(KeyType::Number.to_string(), "N");
  }

  #[test]
  fn test_credentials_from_parts() {
    assert_eq!(Credentials::from_parts(None, None, None).unwrap(), Credentials::Ambient);
    let creds =
      Credentials::from_parts(Some("id".into()), Some("secret".into()), Some("eu-west-1".into()))
        .unwrap();
    assert!(matches!(creds, Credentials::Static { ref region, .. } if region == "eu-west-1"));

    let err = Credentials::from_parts(Some("id".into()), None, Some(String::new())).unwrap_err();
    assert_eq!(err.to_string(), "Credentials error: missing secret key, region");
  }

  #[test]
  fn test_config_file_applies() {
    let file = ConfigFile::from_toml_str(
      r#"
        keywords = "decompilation techniques"
        open_access_only = true
        page_size = 25
        max_pages = -1
        store_workers = 16
        rate_limit_secs = 2
        bucket = "papers-bucket"

        [table]
        name = "Articles"
        primary_key = { name = "ID", key_type = "N" }
        sort_key = { name = "Title", key_type = "S" }
      "#,
    )
    .unwrap();

    let config = HarvestConfig::builder("ignored").apply_file(&file).unwrap().build().unwrap();
    assert_eq!(config.keywords, "decompilation techniques");
    assert!(config.open_access_only);
    assert_eq!(config.page_size, 25);
    assert_eq!(config.max_pages, -1);
    assert_eq!(config.fetch_workers, DEFAULT_WORKERS);
    assert_eq!(config.store_workers, 16);
    assert_eq!(config.rate_limit, Duration::from_secs(2));
    assert!(config.upload_enabled());
    assert_eq!(config.table.sort_key, Some(KeySchema::new("Title", KeyType::String)));
  }

  #[test]
  fn test_config_file_rejects_unknown_fields() {
    assert!(ConfigFile::from_toml_str("routines = 3").is_err());
  }
}
