//! Filename extraction from a URL.

/// Everything after the final `/` of `url`, or the whole string if there is none.
///
/// No decoding or query stripping happens here: `https://h/a/f.zip?x=1` yields
/// `f.zip?x=1`, and a URL ending in `/` yields an empty string.
pub fn last_path_segment(url: &str) -> &str {
    url.rsplit_once('/').map_or(url, |(_, tail)| tail)
}
