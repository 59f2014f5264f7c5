//! Board hierarchy
//!
//! The tree itself is synchronous and owns no network access. Lazy per-node
//! fetching is driven from `crawler::Extractor`, which pairs a tree with an adapter.

mod tree;

pub use tree::{BoardAttrs, BoardId, BoardTree};
