//! HTTP access to the metadata API.
//!
//! One [`reqwest::Client`] is built per run with the configured request timeout and shared by
//! every component that talks HTTP: listing pages, article landing pages and artifact downloads.

use super::*;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("harvester/", env!("CARGO_PKG_VERSION"));

/// Builds the shared HTTP client.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
  Ok(reqwest::Client::builder().timeout(timeout).user_agent(USER_AGENT).build()?)
}

/// Turns a non-success response into [`HarvestError::Api`].
///
/// The query string is left out of the message since it carries the API key.
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let mut url = response.url().clone();
  url.set_query(None);
  Err(HarvestError::Api(format!("{url} returned {status}")))
}

/// Fetches listing pages of one query.
#[derive(Debug, Clone)]
pub struct MetadataClient {
  /// Shared HTTP client
  http:          reqwest::Client,
  /// API location and key
  endpoint:      ApiEndpoint,
  /// Percent-encoded search expression
  escaped_query: String,
  /// Records per page
  page_size:     usize,
}

impl MetadataClient {
  /// Creates a client for the search described by `config`.
  pub fn new(http: reqwest::Client, config: &HarvestConfig) -> Self {
    let escaped_query = escape_query(&config.search_expression());
    debug!("Search expression escaped as {escaped_query}");
    Self { http, endpoint: config.api.clone(), escaped_query, page_size: config.page_size }
  }

  /// URL of the first listing page.
  pub fn first_page_url(&self) -> String {
    self.endpoint.page_url(&self.escaped_query, 1, self.page_size)
  }

  /// URLs of the first `num_pages` listing pages.
  pub fn page_urls(&self, num_pages: usize) -> Vec<String> {
    self.endpoint.page_urls(&self.escaped_query, num_pages, self.page_size)
  }

  /// Fetches and parses one listing page.
  pub async fn fetch_page(&self, url: &str) -> Result<Page> {
    let response = check_status(self.http.get(url).send().await?)?;
    let data = response.bytes().await?;
    trace!("Listing page response: {}", String::from_utf8_lossy(&data));
    Page::parse(&data)
  }

  /// Fetches the first listing page, which carries the total record count.
  pub async fn first_page(&self) -> Result<Page> {
    let url = self.first_page_url();
    info!("Requesting first listing page");
    self.fetch_page(&url).await
  }
}
