//! Forum engine adapters
//!
//! Each adapter implements `crawler::Adapter` for one forum engine. `detect` tries
//! them in registration order and returns the first that recognizes a URL.

pub mod discourse;
pub mod phpbb;

pub use discourse::DiscourseAdapter;
pub use phpbb::PhpbbAdapter;

use crate::crawler::{Adapter, Session};
use crate::{ForumError, Result};
use scraper::{ElementRef, Selector};
use std::sync::Arc;

/// Names of the registered adapters, in detection order
pub fn adapter_names() -> &'static [&'static str] {
    &[discourse::NAME, phpbb::NAME]
}

/// Finds the adapter for `url`
///
/// A detection request that fails only rules that adapter out.
///
/// # Errors
///
/// `ExtractorNotFound` if no adapter recognizes the URL.
pub async fn detect(session: Arc<Session>, url: &str) -> Result<Box<dyn Adapter>> {
    match DiscourseAdapter::detect(session.clone(), url).await {
        Ok(Some(adapter)) => return Ok(Box::new(adapter)),
        Ok(None) => {}
        Err(e) => tracing::debug!("{} detection failed for {}: {}", discourse::NAME, url, e),
    }

    match PhpbbAdapter::detect(session, url).await {
        Ok(Some(adapter)) => return Ok(Box::new(adapter)),
        Ok(None) => {}
        Err(e) => tracing::debug!("{} detection failed for {}: {}", phpbb::NAME, url, e),
    }

    Err(ForumError::ExtractorNotFound {
        url: url.to_string(),
    })
}

/// Elements below `root` matching `css`; nothing if the selector does not parse
pub(crate) fn select_all<'a>(root: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => root.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

pub(crate) fn select_first<'a>(root: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    root.select(&selector).next()
}

/// Text content with runs of whitespace collapsed
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
