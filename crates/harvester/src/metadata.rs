//! Normalized article metadata as persisted to the key-value store.
//!
//! [`ArticleMeta`] flattens a [`RawRecord`] and adds everything the pipeline learns about it:
//! scraped keywords, the derived PDF location, the uploaded file name and the run-unique
//! sequence id. Attribute names on the wire are kept stable across runs so tables written by
//! earlier harvests stay queryable.

use serde_json::Value;

use super::*;

/// Prefix of canonical article URLs that is dropped when deriving the PDF location.
pub const DOI_RESOLVER_PREFIX: &str = "http://dx.doi.org/";

/// Value of the constant discriminator attribute.
pub const VERSION_MARKER: u32 = 1;

/// Attribute names every stored item carries.
pub const ATTRIBUTE_NAMES: [&str; 17] = [
  "Authors",
  "Keywords",
  "Title",
  "Abstract",
  "PublicationName",
  "Number",
  "PublicationDate",
  "Publisher",
  "Link",
  "PDFLink",
  "FileName",
  "OpenAccess",
  "AlwaysTheSame",
  "StartingPage",
  "EndingPage",
  "Volume",
  "ID",
];

/// Derives the PDF location of an open-access article from its canonical URL.
///
/// ```
/// use harvester::metadata::artifact_url;
///
/// assert_eq!(
///   artifact_url("http://dx.doi.org/10.1007/s11277-019-06001-x", "https://link.springer.com/content/pdf/"),
///   "https://link.springer.com/content/pdf/10.1007%2Fs11277-019-06001-x.pdf"
/// );
/// ```
pub fn artifact_url(link: &str, content_host: &str) -> String {
  let doi = link.strip_prefix(DOI_RESOLVER_PREFIX).unwrap_or(link);
  format!("{content_host}{}.pdf", doi.replace('/', "%2F"))
}

/// Metadata of one article, in storage form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArticleMeta {
  /// Author names
  pub authors:          Vec<String>,
  /// Lowercased keyword tags scraped from the landing page
  pub keywords:         Vec<String>,
  /// Title
  pub title:            String,
  /// Abstract
  #[serde(rename = "Abstract")]
  pub abstract_text:    String,
  /// Journal or book name
  pub publication_name: String,
  /// Issue number
  pub number:           String,
  /// Publication date
  pub publication_date: String,
  /// Publisher
  pub publisher:        String,
  /// Canonical URL
  pub link:             String,
  /// PDF location, only for open-access articles
  #[serde(rename = "PDFLink")]
  pub pdf_link:         Option<String>,
  /// Object key of the uploaded PDF, empty unless an upload succeeded
  pub file_name:        String,
  /// Open-access flag
  pub open_access:      bool,
  /// Constant discriminator
  #[serde(rename = "AlwaysTheSame")]
  pub version_marker:   u32,
  /// First page
  pub starting_page:    Option<u32>,
  /// Last page
  pub ending_page:      Option<u32>,
  /// Volume
  pub volume:           Option<u32>,
  /// Run-unique sequence id
  #[serde(rename = "ID")]
  pub id:               u64,
}

impl ArticleMeta {
  /// Flattens a raw record.
  ///
  /// Keywords start out empty, `file_name` empty and `id` zero; the enrichment pool fills them
  /// in.
  pub fn from_record(record: &RawRecord, content_host: &str) -> Self {
    let article = &record.article;
    let pdf_link = article.open_access.then(|| artifact_url(&article.url, content_host));
    Self {
      authors: article.creators.clone(),
      keywords: Vec::new(),
      title: article.title.clone(),
      abstract_text: record.abstract_text.clone(),
      publication_name: article.publication_name.clone(),
      number: article.number.clone(),
      publication_date: article.publication_date.clone(),
      publisher: article.publisher.clone(),
      link: article.url.clone(),
      pdf_link,
      file_name: String::new(),
      open_access: article.open_access,
      version_marker: VERSION_MARKER,
      starting_page: article.starting_page,
      ending_page: article.ending_page,
      volume: article.volume,
      id: 0,
    }
  }

  /// Encodes the metadata as a storage item.
  pub fn to_item(&self) -> Result<Item> {
    let value = serde_json::to_value(self)
      .map_err(|e| HarvestError::KeyValueStore(format!("failed to encode item: {e}")))?;
    match Attribute::from(value) {
      Attribute::M(item) => Ok(item),
      _ => Err(HarvestError::KeyValueStore("item did not encode to a map".into())),
    }
  }
}

impl From<Value> for Attribute {
  fn from(value: Value) -> Self {
    match value {
      Value::Null => Attribute::Null,
      Value::Bool(b) => Attribute::Bool(b),
      Value::Number(n) => Attribute::N(n.to_string()),
      Value::String(s) => Attribute::S(s),
      Value::Array(values) => Attribute::L(values.into_iter().map(Attribute::from).collect()),
      Value::Object(map) => Attribute::M(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
    }
  }
}
