//! Crawl engine
//!
//! This module contains the generic crawling logic, including:
//! - The HTTP session (cache, cycle guard, retries)
//! - The adapter contract implemented per forum engine
//! - Lazy board-tree discovery through the `Extractor`
//! - Pagination through `Traversal`
//! - Embedded file discovery

mod adapter;
mod extractor;
pub mod files;
mod session;
mod traversal;

pub use adapter::{Adapter, Node, Page};
pub use extractor::{Extractor, Target};
pub use files::{collect_files, scan_fragment, scan_page, FileScope};
pub use session::{backoff_delay, build_http_client, Request, RequestKey, Response, Session};
pub use traversal::{
    BoardPages, PageSource, PostTraversal, ThreadPages, ThreadTraversal, Traversal,
};
