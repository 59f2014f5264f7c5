//! Crawled data model
//!
//! Boards, threads, posts and files all share a path-based identity. The tagged
//! `Item` union is what the output pipeline consumes.

mod item;
mod path;

pub use item::{Attributes, Board, File, Item, PageEntry, Post, PostEntry, Thread, ThreadEntry};
pub use path::NodePath;
