//! URL list files: one URL per line, blank lines and `#` comments ignored.

use anyhow::{Context, Result};
use std::path::Path;

/// Parses a URL list. Each entry must be an absolute URL; the error names the
/// offending line.
pub fn parse_url_list(text: &str) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        url::Url::parse(line).with_context(|| format!("line {}: invalid URL {:?}", n + 1, line))?;
        urls.push(line.to_string());
    }
    Ok(urls)
}

/// Reads and parses a URL list file.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read URL list: {}", path.display()))?;
    parse_url_list(&text).with_context(|| format!("parse URL list: {}", path.display()))
}
