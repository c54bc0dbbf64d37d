//! Query formatting for the metadata API.
//!
//! The API takes the keyword expression verbatim in the `q` parameter, so the expression is
//! escaped by hand instead of with a general-purpose URL encoder: the query operators the API
//! understands (`"`, `*`, `~`, `:`, `<`, `>` and friends) must survive untouched.
//!
//! # Examples
//!
//! ```
//! use harvester::query::{escape_query, ApiEndpoint};
//!
//! let q = escape_query("\"Springer Link\" openaccess:true");
//! assert_eq!(q, "\"Springer%20Link\"%20openaccess:true");
//!
//! let api = ApiEndpoint::new("http://api.springernature.com/", "key").unwrap();
//! assert_eq!(
//!   api.page_url(&q, 2, 10),
//!   "http://api.springernature.com/metadata/pam?q=\"Springer%20Link\"%20openaccess:true&s=11&p=10&api_key=key"
//! );
//! ```

use std::fmt::Write;

use url::Url;

use super::*;

/// Default location of the metadata API.
pub const DEFAULT_API_BASE: &str = "http://api.springernature.com/";

/// Path of the paginated metadata listing below the API base.
const LISTING_PATH: &str = "metadata/pam";

/// Punctuation passed through unescaped.
const ALLOWED_PUNCTUATION: [char; 9] = ['-', '_', '*', '"', '~', '.', '<', '>', ':'];

/// Whether `c` may appear unescaped in a query.
pub fn is_allowed(c: char) -> bool {
  c.is_alphabetic() || c.is_numeric() || ALLOWED_PUNCTUATION.contains(&c)
}

/// Escapes a free-text keyword expression for the `q` parameter.
///
/// Letters and digits (including non-ASCII ones) and the punctuation in the allow-list pass
/// through unchanged. Every other character is replaced by the percent-encoding of each of its
/// UTF-8 bytes, as two uppercase hex digits.
pub fn escape_query(source: &str) -> String {
  let mut escaped = String::with_capacity(source.len());
  let mut buf = [0u8; 4];
  for c in source.chars() {
    if is_allowed(c) {
      escaped.push(c);
    } else {
      for byte in c.encode_utf8(&mut buf).bytes() {
        // Writing into a `String` cannot fail.
        let _ = write!(escaped, "%{byte:02X}");
      }
    }
  }
  escaped
}

/// Location of, and key for, the metadata API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
  /// Base URL, always ending in `/`
  pub base_url: String,
  /// API key sent with every request
  pub api_key:  String,
}

impl Default for ApiEndpoint {
  fn default() -> Self { Self { base_url: DEFAULT_API_BASE.to_string(), api_key: String::new() } }
}

impl ApiEndpoint {
  /// Creates an endpoint, checking that `base_url` is an absolute http(s) URL.
  pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
    let parsed = Url::parse(base_url)
      .map_err(|e| HarvestError::Config(format!("Invalid API base URL {base_url}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
      return Err(HarvestError::Config(format!("API base URL must be http(s): {base_url}")));
    }
    let mut base_url = base_url.to_string();
    if !base_url.ends_with('/') {
      base_url.push('/');
    }
    Ok(Self { base_url, api_key: api_key.to_string() })
  }

  /// Builds the URL of one listing page.
  ///
  /// `start` is the 1-based offset of the first record on the page and `escaped_query` must
  /// already have gone through [`escape_query`].
  pub fn page_url(&self, escaped_query: &str, start: usize, page_size: usize) -> String {
    format!(
      "{}{LISTING_PATH}?q={escaped_query}&s={start}&p={page_size}&api_key={}",
      self.base_url, self.api_key
    )
  }

  /// URLs of the first `num_pages` listing pages.
  pub fn page_urls(&self, escaped_query: &str, num_pages: usize, page_size: usize) -> Vec<String> {
    (0..num_pages).map(|page| self.page_url(escaped_query, page * page_size + 1, page_size)).collect()
  }
}
