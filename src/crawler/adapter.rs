//! Per-forum-engine adapter contract
//!
//! An adapter knows one forum engine's URL scheme and markup. It fills the board
//! tree when asked and turns one page state into one page of items; everything
//! else (laziness, pagination, failure policy) lives in the extractor.

use crate::board::{BoardId, BoardTree};
use crate::crawler::Session;
use crate::model::{Board, File, NodePath, Post, PostEntry, Thread, ThreadEntry};
use crate::state::PageState;
use crate::Result;
use async_trait::async_trait;

/// One fetched page: its items in page order and the continuation, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageState>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<PageState>) -> Self {
        Self { items, next }
    }

    /// A page with nothing on it and nothing after it
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: None,
        }
    }

    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// What an arbitrary site URL points at, as far as the adapter can tell
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A board known by its path; resolved through the tree
    Board(NodePath),

    /// A board known only by the URLs of its ancestors and itself, top-down
    BoardTrail(Vec<String>),

    Thread(Thread),
    Post(Post),
    File(File),
}

/// Contract implemented once per supported forum engine
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short engine name, as listed by `--list-extractors`
    fn name(&self) -> &'static str;

    /// Normalized base URL of the forum; the root board's URL
    fn base_url(&self) -> &str;

    fn session(&self) -> &Session;

    /// Populates the first tier(s) of the tree
    async fn fetch_top_boards(&self, tree: &mut BoardTree) -> Result<()>;

    /// Populates the immediate children of a non-root `board`
    ///
    /// The extractor marks the board fetched afterwards, whether or not this
    /// succeeds.
    async fn fetch_subboards(&self, tree: &mut BoardTree, board: BoardId) -> Result<()>;

    /// Classifies a site URL
    async fn resolve_node(&self, tree: &BoardTree, url: &str) -> Result<Node>;

    async fn fetch_board_page(&self, board: &Board, state: PageState)
        -> Result<Page<ThreadEntry>>;

    async fn fetch_thread_page(&self, thread: &Thread, state: PageState)
        -> Result<Page<PostEntry>>;
}
