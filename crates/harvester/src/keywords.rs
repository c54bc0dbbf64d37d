//! Keyword scraping from article landing pages.
//!
//! Landing pages come in two layouts. Older pages group keywords as
//! `<div class="KeywordGroup"><span class="Keyword">…</span></div>`; newer ones list subjects in
//! `<div class="c-bibliographic-information__column"><ul class="c-article-subject-list"><li>…`.
//! Divs are visited in document order and the first one matching either layout wins.
//!
//! ```
//! use harvester::keywords::extract_keywords;
//!
//! let html = r#"<div class="KeywordGroup"><span class="Keyword">Graph Theory&nbsp;</span></div>"#;
//! assert_eq!(extract_keywords(html), vec!["graph theory"]);
//! ```

use scraper::{ElementRef, Html, Selector};

use super::*;

/// Class of the div holding keyword spans.
const KEYWORD_GROUP_CLASS: &str = "KeywordGroup";
/// Class of a keyword span.
const KEYWORD_CLASS: &str = "Keyword";
/// Class of the div holding the subject list.
const BIBLIOGRAPHIC_COLUMN_CLASS: &str = "c-bibliographic-information__column";
/// Class of the subject list.
const SUBJECT_LIST_CLASS: &str = "c-article-subject-list";

lazy_static! {
  /// Every div, in document order.
  static ref DIV: Selector = Selector::parse("div").unwrap();
  /// Spans below an element.
  static ref SPAN: Selector = Selector::parse("span").unwrap();
  /// Unordered lists below an element.
  static ref UL: Selector = Selector::parse("ul").unwrap();
  /// List items below an element.
  static ref LI: Selector = Selector::parse("li").unwrap();
}

/// Source of keyword tags for an article.
#[async_trait]
pub trait KeywordSource: Send + Sync {
  /// Keywords of the article whose landing page is at `url`, lowercased, possibly empty.
  async fn keywords(&self, url: &str) -> Result<Vec<String>>;
}

/// Whether the element's `class` attribute is exactly `class`.
fn has_class(element: &ElementRef<'_>, class: &str) -> bool {
  element.value().attr("class") == Some(class)
}

/// Lowercased text content of an element.
fn text_of(element: &ElementRef<'_>) -> String {
  element.text().collect::<String>().trim().to_lowercase()
}

/// Extracts keywords from a landing page.
pub fn extract_keywords(html: &str) -> Vec<String> {
  let document = Html::parse_document(html);
  for div in document.select(&DIV) {
    if has_class(&div, KEYWORD_GROUP_CLASS) {
      return div
        .select(&SPAN)
        .filter(|span| has_class(span, KEYWORD_CLASS))
        .map(|span| text_of(&span))
        .collect();
    }
    if has_class(&div, BIBLIOGRAPHIC_COLUMN_CLASS) {
      if let Some(list) = div.select(&UL).find(|ul| has_class(ul, SUBJECT_LIST_CLASS)) {
        return list.select(&LI).map(|li| text_of(&li)).collect();
      }
    }
  }
  Vec::new()
}

/// Scrapes keywords over HTTP.
#[derive(Debug, Clone)]
pub struct HtmlKeywordScraper {
  /// Shared HTTP client
  http: reqwest::Client,
}

impl HtmlKeywordScraper {
  /// Creates a scraper on the shared client.
  pub fn new(http: reqwest::Client) -> Self { Self { http } }
}

#[async_trait]
impl KeywordSource for HtmlKeywordScraper {
  async fn keywords(&self, url: &str) -> Result<Vec<String>> {
    let response = check_status(self.http.get(url).send().await?)?;
    let html = response.text().await?;
    let keywords = extract_keywords(&html);
    debug!("Found {} keywords at {url}", keywords.len());
    Ok(keywords)
  }
}
