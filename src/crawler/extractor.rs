//! Extractor: one adapter paired with the board tree it discovers
//!
//! The tree is filled lazily. A board's children are fetched the first time
//! something needs them; a failing fetch is logged and the board is treated as a
//! leaf from then on, so one broken branch never takes the rest of the crawl down.

use crate::board::{BoardId, BoardTree};
use crate::crawler::adapter::{Adapter, Node};
use crate::crawler::traversal::{
    BoardPages, PostTraversal, ThreadPages, ThreadTraversal, Traversal,
};
use crate::model::{Board, File, NodePath, Post, Thread};
use crate::state::PageState;
use crate::{ForumError, Result};

/// What `node_from_url` resolved a URL to
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Board(BoardId),
    Thread(Thread),
    Post(Post),
    File(File),
}

/// Crawl facade over one forum
pub struct Extractor {
    adapter: Box<dyn Adapter>,
    tree: BoardTree,
    all_boards_fetched: bool,
    max_pages: Option<u32>,
}

impl Extractor {
    pub fn new(adapter: Box<dyn Adapter>) -> Self {
        let tree = BoardTree::new(adapter.base_url());

        Self {
            adapter,
            tree,
            all_boards_fetched: false,
            max_pages: None,
        }
    }

    /// Caps every traversal created by this extractor at `max_pages` pages
    pub fn with_page_limit(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn name(&self) -> &'static str {
        self.adapter.name()
    }

    pub fn base_url(&self) -> &str {
        self.adapter.base_url()
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    pub fn tree(&self) -> &BoardTree {
        &self.tree
    }

    pub fn root(&self) -> &Board {
        self.tree.get(self.tree.root())
    }

    pub fn board(&self, id: BoardId) -> &Board {
        self.tree.get(id)
    }

    /// Fetches the top tier(s) of the board tree
    pub async fn fetch(&mut self) -> Result<()> {
        let root = self.tree.root();
        self.adapter.fetch_top_boards(&mut self.tree).await?;
        self.tree.mark_fetched(root);
        tracing::debug!("{} top-level boards", self.tree.children(root).len());
        Ok(())
    }

    /// Immediate children of `board`, fetching them once if never fetched
    pub async fn subboards(&mut self, board: BoardId) -> Vec<BoardId> {
        self.ensure_subboards(board).await;
        self.tree.children(board).to_vec()
    }

    /// Resolves `path` top-down, lazily fetching unexpanded ancestors
    ///
    /// # Errors
    ///
    /// `BoardNotFound` if a segment is still missing after its parent was fetched.
    pub async fn find_board(&mut self, path: &NodePath) -> Result<BoardId> {
        let mut current = self.tree.root();

        for segment in path.segments() {
            if self.tree.child(current, segment).is_none() {
                self.ensure_subboards(current).await;
            }

            current = self
                .tree
                .child(current, segment)
                .ok_or_else(|| ForumError::BoardNotFound { path: path.clone() })?;
        }

        Ok(current)
    }

    /// Resolves a top-down trail of board URLs
    ///
    /// Each level whose children do not contain the next URL is fetched again,
    /// even if it was fetched before.
    pub async fn find_board_from_urls(&mut self, urls: &[String]) -> Result<BoardId> {
        let mut current = self.tree.root();

        for url in urls {
            let found = match self.tree.child_by_url(current, url) {
                Some(child) => Some(child),
                None => {
                    if self.tree.is_fetched(current) {
                        self.refetch_subboards(current).await;
                    } else {
                        self.ensure_subboards(current).await;
                    }
                    self.tree.child_by_url(current, url)
                }
            };

            current = found.ok_or_else(|| ForumError::BoardNotFound {
                path: self.tree.get(current).path.child(url.as_str()),
            })?;
        }

        Ok(current)
    }

    /// Forces discovery of every board below `board`
    ///
    /// For the root this runs at most once per extractor.
    pub async fn fetch_all_lower_boards(&mut self, board: BoardId) {
        if self.all_boards_fetched {
            return;
        }

        let prefix = self.tree.get(board).path.clone();

        loop {
            let pending: Vec<BoardId> = self
                .tree
                .ids()
                .filter(|&id| !self.tree.is_fetched(id))
                .filter(|&id| self.tree.get(id).path.starts_with(&prefix))
                .collect();

            if pending.is_empty() {
                break;
            }

            for id in pending {
                self.ensure_subboards(id).await;
            }
        }

        if prefix.is_root() {
            self.all_boards_fetched = true;
        }
    }

    /// Classifies `url` through the adapter and resolves boards through the tree
    pub async fn node_from_url(&mut self, url: &str) -> Result<Target> {
        let node = self.adapter.resolve_node(&self.tree, url).await?;

        Ok(match node {
            Node::Board(path) => Target::Board(self.find_board(&path).await?),
            Node::BoardTrail(urls) => Target::Board(self.find_board_from_urls(&urls).await?),
            Node::Thread(thread) => Target::Thread(thread),
            Node::Post(post) => Target::Post(post),
            Node::File(file) => Target::File(file),
        })
    }

    /// Threads (and files) of `board`, from page 1 or from `initial`
    pub fn threads(&self, board: &Board, initial: Option<PageState>) -> ThreadTraversal<'_> {
        let source = BoardPages::new(self.adapter.as_ref(), board.clone());
        Traversal::new(source, initial).with_page_limit(self.max_pages)
    }

    /// Posts (and files) of `thread`, from page 1 or from `initial`
    pub fn posts(&self, thread: &Thread, initial: Option<PageState>) -> PostTraversal<'_> {
        let source = ThreadPages::new(self.adapter.as_ref(), thread.clone());
        Traversal::new(source, initial).with_page_limit(self.max_pages)
    }

    async fn ensure_subboards(&mut self, board: BoardId) {
        if !self.tree.is_fetched(board) {
            self.refetch_subboards(board).await;
        }
    }

    async fn refetch_subboards(&mut self, board: BoardId) {
        let path = self.tree.get(board).path.clone();
        tracing::debug!("Fetching subboards of {}", path);

        let result = if board == self.tree.root() {
            self.adapter.fetch_top_boards(&mut self.tree).await
        } else {
            self.adapter.fetch_subboards(&mut self.tree, board).await
        };

        if let Err(e) = result {
            tracing::warn!("Failed to fetch subboards of {}: {}", path, e);
        }

        self.tree.mark_fetched(board);
    }
}
