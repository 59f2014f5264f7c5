//! Embedded file discovery
//!
//! This module scans markup for the references a page embeds:
//! - Stylesheets (`<link rel="stylesheet">`)
//! - Embedded objects (`<embed>`) and generic objects (`<object data>`)
//! - Audio sources (`<audio src>`, `<audio><source src>`)
//! - Images (`<img src>`)
//! - Inline `<svg>` graphics, taken by value
//!
//! Callers scanning post contents first and then the whole page pass the same
//! `seen` set to both passes so a post-level file is not reported again at page
//! level.

use crate::model::{Attributes, File, NodePath};
use crate::url::resolve_link;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Reference shapes in scan order: selector, attribute holding the URL, kind
const REFERENCES: &[(&str, &str, &str)] = &[
    (r#"link[rel~="stylesheet"][href]"#, "href", "stylesheet"),
    ("embed[src]", "src", "embed"),
    ("audio[src]", "src", "audio"),
    ("audio source[src]", "src", "audio"),
    ("img[src]", "src", "image"),
    ("object[data]", "data", "object"),
];

const SVG_CONTENT_TYPE: &str = "image/svg+xml";

/// Where found files are anchored
#[derive(Debug, Clone, Copy)]
pub struct FileScope<'a> {
    /// Path of the enclosing board or thread
    pub path: &'a NodePath,
    /// Subpath of the enclosing post; empty for page-level files
    pub subpath: &'a NodePath,
    /// URL of the page the markup came from
    pub origin: &'a str,
}

/// Scans a whole HTML document
pub fn scan_page(
    html: &str,
    base_url: &Url,
    scope: FileScope<'_>,
    seen: &mut HashSet<String>,
) -> Vec<File> {
    let document = Html::parse_document(html);
    collect_files(document.root_element(), base_url, scope, seen)
}

/// Scans a markup fragment, such as a post's rendered content
pub fn scan_fragment(
    html: &str,
    base_url: &Url,
    scope: FileScope<'_>,
    seen: &mut HashSet<String>,
) -> Vec<File> {
    let fragment = Html::parse_fragment(html);
    collect_files(fragment.root_element(), base_url, scope, seen)
}

/// Collects the files referenced below `root`
///
/// # Arguments
///
/// * `root` - Element whose descendants are scanned
/// * `base_url` - URL relative references are resolved against
/// * `scope` - Path, subpath and origin given to every file
/// * `seen` - URLs (and inline markup) already reported; extended in place
///
/// # Returns
///
/// Files not in `seen`, in reference-shape order and document order within each
/// shape.
pub fn collect_files(
    root: ElementRef<'_>,
    base_url: &Url,
    scope: FileScope<'_>,
    seen: &mut HashSet<String>,
) -> Vec<File> {
    let mut files = Vec::new();

    for (selector, attr, kind) in REFERENCES {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };

        for element in root.select(&selector) {
            let Some(url) = element
                .value()
                .attr(attr)
                .and_then(|href| resolve_link(href, base_url))
            else {
                continue;
            };

            if !seen.insert(url.to_string()) {
                continue;
            }

            files.push(File {
                path: scope.path.clone(),
                subpath: scope.subpath.clone(),
                url: url.to_string(),
                origin: scope.origin.to_string(),
                data: kind_data(kind, false),
                content_type: element.value().attr("type").map(str::to_string),
                content: None,
                os_path: None,
            });
        }
    }

    if let Ok(selector) = Selector::parse("svg") {
        for element in root.select(&selector) {
            // Nested graphics are part of their outermost svg
            if element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|ancestor| ancestor.value().name() == "svg")
            {
                continue;
            }

            let markup = element.html();
            if !seen.insert(markup.clone()) {
                continue;
            }

            files.push(File {
                path: scope.path.clone(),
                subpath: scope.subpath.clone(),
                url: scope.origin.to_string(),
                origin: scope.origin.to_string(),
                data: kind_data("svg", true),
                content_type: Some(SVG_CONTENT_TYPE.to_string()),
                content: Some(markup.into_bytes()),
                os_path: None,
            });
        }
    }

    files
}

fn kind_data(kind: &str, inline: bool) -> Attributes {
    let mut data = Attributes::new();
    data.insert("kind".to_string(), kind.into());
    if inline {
        data.insert("inline".to_string(), true.into());
    }
    data
}
