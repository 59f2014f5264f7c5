//! Output handler trait and writer-side errors
//!
//! The walk in `output::write_url` pulls items from the extractor and hands each
//! one to an `OutputHandler`. Handlers only format and store; they never fetch.

use crate::model::{Board, File, Post, Thread};
use thiserror::Error;

/// Errors that can occur while writing output
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to format output: {0}")]
    Format(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Receiver of the crawled item stream
///
/// Items arrive in traversal order: a board, its threads each followed by their
/// posts, then its subboards depth-first. Files arrive right after the item
/// whose page they were found on.
pub trait OutputHandler {
    /// Whether the whole board tree should be discovered before writing starts
    fn wants_all_boards(&self) -> bool {
        false
    }

    /// Records a board
    ///
    /// # Arguments
    ///
    /// * `board` - The board, with its full path
    fn record_board(&mut self, board: &Board) -> OutputResult<()>;

    fn record_thread(&mut self, thread: &Thread) -> OutputResult<()>;

    /// Records a post
    ///
    /// # Arguments
    ///
    /// * `thread` - The thread the post belongs to
    /// * `post` - The post; its `subpath` gives the reply nesting
    fn record_post(&mut self, thread: &Thread, post: &Post) -> OutputResult<()>;

    /// Records an embedded file, already materialized if downloads are on
    fn record_file(&mut self, file: &File) -> OutputResult<()>;

    /// Flushes anything still buffered
    fn finalize(&mut self) -> OutputResult<()>;
}
