use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashSet;
use std::path::Path;

/// Load the ordered candidate list.
///
/// One URL per line. Blank lines and `#` comments are skipped, and repeats
/// are dropped after their first occurrence so that order still decides
/// which candidate is tried first.
pub async fn read_url_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .or_raise(|| ErrorKind::UrlList(format!("cannot read {}", path.display())))?;
    let urls = parse_url_list(&text)?;
    tracing::debug!(path = %path.display(), count = urls.len(), "URL list loaded");
    Ok(urls)
}

pub(crate) fn parse_url_list(text: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        // Manifest fields are space-delimited.
        if line.contains(char::is_whitespace) {
            exn::bail!(ErrorKind::UrlList(format!("line {} contains whitespace", index + 1)));
        }
        if seen.insert(line) {
            urls.push(line.to_string());
        }
    }
    if urls.is_empty() {
        exn::bail!(ErrorKind::UrlList("no URLs".to_string()));
    }
    Ok(urls)
}
