//! Records as returned by the metadata API.
//!
//! A listing page is a namespaced XML document:
//!
//! ```xml
//! <response xmlns:pam="http://prismstandard.org/namespaces/pam/2.0/">
//!   <result><total>125</total><start>1</start><pageLength>50</pageLength></result>
//!   <records>
//!     <pam:message>
//!       <xhtml:head>
//!         <pam:article>
//!           <dc:title>Cyber-physical systems</dc:title>
//!           <dc:creator>Doe, Jane</dc:creator>
//!           <prism:openAccess>true</prism:openAccess>
//!           <prism:url>http://dx.doi.org/10.1007/s00000-020-0000-0</prism:url>
//!         </pam:article>
//!       </xhtml:head>
//!       <xhtml:body><p>Abstract text</p></xhtml:body>
//!     </pam:message>
//!   </records>
//! </response>
//! ```
//!
//! Namespace prefixes carry no information we need, so they are stripped before decoding. Titles
//! and abstract paragraphs may carry inline markup such as `H<sub>2</sub>`; it is flattened to its
//! text first, so a marked-up record decodes like any other.

use serde::Deserializer;

use super::*;

lazy_static! {
  /// Namespace declarations such as `xmlns:dc="..."`.
  static ref XMLNS_ATTRIBUTE: Regex = Regex::new(r#"\s+xmlns(?::[\w.\-]+)?="[^"]*""#).unwrap();
  /// The prefix of a namespaced start or end tag.
  static ref TAG_PREFIX: Regex = Regex::new(r"<(/?)[A-Za-z_][\w.\-]*:").unwrap();
  /// A title or paragraph element together with its content.
  static ref MIXED_CONTENT: Regex =
    Regex::new(r"(?s)<(title|p)(?:\s[^>]*)?>(.*?)</(?:title|p)>").unwrap();
  /// Any start, end or empty tag.
  static ref INLINE_TAG: Regex = Regex::new(r"</?[A-Za-z][^>]*>").unwrap();
}

/// Removes namespace declarations and tag prefixes from an XML document.
fn strip_xml_namespaces(xml: &str) -> String {
  let without_declarations = XMLNS_ATTRIBUTE.replace_all(xml, "");
  TAG_PREFIX.replace_all(&without_declarations, "<$1").into_owned()
}

/// Replaces the content of every title and paragraph by its text, dropping inline tags.
fn flatten_inline_markup(xml: &str) -> String {
  MIXED_CONTENT
    .replace_all(xml, |caps: &regex::Captures| {
      format!("<{0}>{1}</{0}>", &caps[1], INLINE_TAG.replace_all(&caps[2], ""))
    })
    .into_owned()
}

/// Decodes an optional number, treating absent or malformed values as absent.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where D: Deserializer<'de> {
  let raw: Option<String> = Option::deserialize(deserializer)?;
  Ok(raw.and_then(|s| s.trim().parse().ok()))
}

/// Bibliographic part of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
  /// Article title
  #[serde(default)]
  pub title:            String,
  /// Author names in listing order
  #[serde(rename = "creator", default)]
  pub creators:         Vec<String>,
  /// Journal or book the article appeared in
  #[serde(default)]
  pub publication_name: String,
  /// Volume number
  #[serde(default, deserialize_with = "lenient_number")]
  pub volume:           Option<u32>,
  /// Issue number, kept verbatim since it is not always numeric
  #[serde(default)]
  pub number:           String,
  /// Whether the full text is freely downloadable
  #[serde(default)]
  pub open_access:      bool,
  /// First page
  #[serde(default, deserialize_with = "lenient_number")]
  pub starting_page:    Option<u32>,
  /// Last page
  #[serde(default, deserialize_with = "lenient_number")]
  pub ending_page:      Option<u32>,
  /// Publisher name
  #[serde(default)]
  pub publisher:        String,
  /// Publication date as reported by the API
  #[serde(default)]
  pub publication_date: String,
  /// Canonical (DOI resolver) URL of the article
  #[serde(default)]
  pub url:              String,
}

/// One record of a listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
  /// Bibliographic data
  pub article:       Article,
  /// Abstract text, paragraphs joined by newlines
  pub abstract_text: String,
}

/// Totals reported alongside a listing page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
  /// Records matching the query across all pages
  #[serde(default)]
  pub total:             usize,
  /// 1-based offset of this page
  #[serde(default)]
  pub start:             usize,
  /// Requested page length
  #[serde(default)]
  pub page_length:       usize,
  /// Records actually on this page
  #[serde(default)]
  pub records_displayed: usize,
}

/// A decoded listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
  /// Totals
  pub summary: ResultSummary,
  /// Records in listing order
  pub records: Vec<RawRecord>,
}

/// Wire shape of the whole response.
#[derive(Debug, Deserialize)]
struct Envelope {
  /// Totals
  #[serde(default)]
  result:  ResultSummary,
  /// Record container
  #[serde(default)]
  records: Records,
}

/// Wire shape of `<records>`.
#[derive(Debug, Default, Deserialize)]
struct Records {
  /// Individual records
  #[serde(rename = "message", default)]
  messages: Vec<Message>,
}

/// Wire shape of `<message>`.
#[derive(Debug, Deserialize)]
struct Message {
  /// Bibliographic head
  head: Head,
  /// Abstract body
  #[serde(default)]
  body: Body,
}

/// Wire shape of `<head>`.
#[derive(Debug, Deserialize)]
struct Head {
  /// The article itself
  article: Article,
}

/// Wire shape of `<body>`.
#[derive(Debug, Default, Deserialize)]
struct Body {
  /// Abstract paragraphs
  #[serde(rename = "p", default)]
  paragraphs: Vec<String>,
}

impl From<Message> for RawRecord {
  fn from(message: Message) -> Self {
    RawRecord { article: message.head.article, abstract_text: message.body.paragraphs.join("\n") }
  }
}

impl Page {
  /// Decodes a listing page from the raw response body.
  pub fn parse(data: &[u8]) -> Result<Self> {
    if data.iter().all(u8::is_ascii_whitespace) {
      return Err(HarvestError::Parse("empty response".into()));
    }
    let xml = flatten_inline_markup(&strip_xml_namespaces(&String::from_utf8_lossy(data)));
    let envelope: Envelope =
      quick_xml::de::from_str(&xml).map_err(|e| HarvestError::Parse(e.to_string()))?;

    Ok(Page {
      summary: envelope.result,
      records: envelope.records.messages.into_iter().map(RawRecord::from).collect(),
    })
  }
}
