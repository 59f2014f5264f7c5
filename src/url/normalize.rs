use crate::{UrlError, UrlResult};
use url::Url;

/// Options for forum-style URL normalization
#[derive(Debug, Clone)]
pub struct NormalizeOptions<'a> {
    /// Trailing path components to strip (e.g. `index.php`)
    pub remove_suffixes: &'a [&'a str],

    /// Append a trailing slash when no query string remains
    pub append_slash: bool,

    /// Query keys that survive normalization; everything else is dropped
    pub keep_queries: &'a [&'a str],
}

impl Default for NormalizeOptions<'_> {
    fn default() -> Self {
        Self {
            remove_suffixes: &["index.php"],
            append_slash: true,
            keep_queries: &[],
        }
    }
}

/// Normalizes a forum URL
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Strip trailing slashes from the path
/// 3. Strip the configured suffixes, unless kept query keys are present
/// 4. Keep only the whitelisted query keys, in whitelist order
/// 5. Remove the fragment
/// 6. Append a trailing slash when no query remains
///
/// # Examples
///
/// ```
/// use forum_dl::url::{normalize_url, NormalizeOptions};
///
/// let url = normalize_url("https://forum.example/community/index.php#top", &NormalizeOptions::default()).unwrap();
/// assert_eq!(url.as_str(), "https://forum.example/community/");
/// ```
pub fn normalize_url(url_str: &str, options: &NormalizeOptions<'_>) -> UrlResult<Url> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| options.keep_queries.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut path = url.path().trim_end_matches('/').to_string();

    if options.keep_queries.is_empty() || url.query().is_none() {
        for suffix in options.remove_suffixes {
            if let Some(stripped) = path.strip_suffix(suffix) {
                path = stripped.to_string();
            }
        }
    }

    let mut path = path.trim_end_matches('/').to_string();

    // Keep the whitelist's order rather than the page's
    let mut ordered = Vec::new();
    for key in options.keep_queries {
        ordered.extend(kept.iter().filter(|(k, _)| k == key).cloned());
    }

    if options.append_slash && ordered.is_empty() {
        path.push('/');
    }

    url.set_path(&path);
    url.set_fragment(None);

    if ordered.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(ordered);
    }

    Ok(url)
}

/// Returns the path of `url` relative to `base`
///
/// Fails if `url` is on another origin or outside the base path.
pub fn relative_path(url: &Url, base: &Url) -> UrlResult<String> {
    let not_relative = || UrlError::NotRelative {
        url: url.to_string(),
        base: base.to_string(),
    };

    if url.origin() != base.origin() {
        return Err(not_relative());
    }

    let base_path = base.path().trim_end_matches('/');
    let path = url.path();

    if path.trim_end_matches('/') == base_path {
        return Ok(String::new());
    }

    path.strip_prefix(base_path)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| rest.trim_end_matches('/').to_string())
        .ok_or_else(not_relative)
}

/// Resolves an href against a base URL
///
/// Returns None if the link should be ignored:
/// - javascript:, mailto:, tel: and data: schemes
/// - fragment-only links
/// - anything that is not HTTP(S) after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute)
        }
        _ => None,
    }
}
