//! Filename formatting for uploaded artifacts.

/// Name used when a title has no usable characters at all.
const FALLBACK_STEM: &str = "article";

/// Turns a title into a filesystem- and key-safe stem.
///
/// Letters and digits are kept. Runs of whitespace, `\` and `/` become a single `_`, every
/// other character is dropped, and leading or trailing `_` and spaces are trimmed.
///
/// ```
/// use harvester::format::sanitize_title;
///
/// assert_eq!(sanitize_title("@sample string/hello !!!\u{2603}"), "sample_string_hello");
/// ```
pub fn sanitize_title(title: &str) -> String {
  let mut stem = String::with_capacity(title.len());
  for c in title.chars() {
    if c.is_alphabetic() || c.is_numeric() {
      stem.push(c);
    } else if (c.is_whitespace() || c == '\\' || c == '/') && !stem.ends_with('_') {
      stem.push('_');
    }
  }
  stem.trim_matches(|c| c == '_' || c == ' ').to_string()
}

/// The object key an artifact for `title` is uploaded under.
pub fn artifact_file_name(title: &str) -> String {
  let stem = sanitize_title(title);
  if stem.is_empty() {
    format!("{FALLBACK_STEM}.pdf")
  } else {
    format!("{stem}.pdf")
  }
}
