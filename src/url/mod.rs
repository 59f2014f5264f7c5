//! URL handling module for forum-dl
//!
//! This module provides forum-style URL normalization, base-relative paths and
//! link resolution shared by the adapters and the file collector.

mod normalize;

// Re-export main functions
pub use normalize::{normalize_url, relative_path, resolve_link, NormalizeOptions};

use url::Url;

/// Returns the value of the first query parameter named `key`
pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Returns the last non-empty path segment of `url`
pub fn last_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.filter(|s| !s.is_empty()).last()
}
