//! Pagination driver
//!
//! A `Traversal` walks one container (a board's thread listing or a thread's post
//! listing) page by page. Each step hands the current `PageState` to the adapter
//! and gets back one page of entries plus an optional next state. The driver keeps
//! at most one page buffered and never reorders what the adapter produced.
//!
//! Failure policy: a failed page ends the chain (state `Done(Failed)`), the error
//! is logged and kept for the caller, and entries already yielded stay valid.

use crate::crawler::adapter::{Adapter, Page};
use crate::model::{Board, PageEntry, PostEntry, Thread, ThreadEntry};
use crate::state::{DoneReason, PageState, TraversalState};
use crate::{ForumError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;

/// One paginated container
#[async_trait]
pub trait PageSource: Send + Sync {
    type Entry: PageEntry;

    /// URL of the container; the first page state starts here
    fn container_url(&self) -> &str;

    async fn fetch_page(&self, state: PageState) -> Result<Page<Self::Entry>>;
}

/// Thread listing of a board
pub struct BoardPages<'a> {
    adapter: &'a dyn Adapter,
    board: Board,
}

impl<'a> BoardPages<'a> {
    pub fn new(adapter: &'a dyn Adapter, board: Board) -> Self {
        Self { adapter, board }
    }
}

#[async_trait]
impl PageSource for BoardPages<'_> {
    type Entry = ThreadEntry;

    fn container_url(&self) -> &str {
        &self.board.url
    }

    async fn fetch_page(&self, state: PageState) -> Result<Page<ThreadEntry>> {
        self.adapter.fetch_board_page(&self.board, state).await
    }
}

/// Post listing of a thread
pub struct ThreadPages<'a> {
    adapter: &'a dyn Adapter,
    thread: Thread,
}

impl<'a> ThreadPages<'a> {
    pub fn new(adapter: &'a dyn Adapter, thread: Thread) -> Self {
        Self { adapter, thread }
    }
}

#[async_trait]
impl PageSource for ThreadPages<'_> {
    type Entry = PostEntry;

    fn container_url(&self) -> &str {
        &self.thread.url
    }

    async fn fetch_page(&self, state: PageState) -> Result<Page<PostEntry>> {
        self.adapter.fetch_thread_page(&self.thread, state).await
    }
}

/// Threads (and files) of a board
pub type ThreadTraversal<'a> = Traversal<BoardPages<'a>>;

/// Posts (and files) of a thread
pub type PostTraversal<'a> = Traversal<ThreadPages<'a>>;

/// Pull-driven pagination state machine over one container
pub struct Traversal<S: PageSource> {
    source: S,
    state: TraversalState,
    buffer: VecDeque<S::Entry>,
    error: Option<ForumError>,
    pages_fetched: u32,
    max_pages: Option<u32>,
}

impl<S: PageSource> Traversal<S> {
    /// Starts at `initial`, or at page 1 of the container
    pub fn new(source: S, initial: Option<PageState>) -> Self {
        let start = initial.unwrap_or_else(|| PageState::new(source.container_url()));

        Self {
            source,
            state: TraversalState::Active(start),
            buffer: VecDeque::new(),
            error: None,
            pages_fetched: 0,
            max_pages: None,
        }
    }

    /// Stops after `max_pages` pages; `None` means no cap
    pub fn with_page_limit(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Next entry of any kind, fetching the next page when the buffer runs dry
    pub async fn next(&mut self) -> Option<S::Entry> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Some(entry);
            }

            let state = match &self.state {
                TraversalState::Active(state) => state.clone(),
                TraversalState::Done(_) => return None,
            };

            if self.max_pages.is_some_and(|max| self.pages_fetched >= max) {
                tracing::debug!("Page limit reached before {}", state.url);
                self.state = TraversalState::Done(DoneReason::PageLimit);
                return None;
            }

            self.step(state).await;
        }
    }

    /// Next entry of the primary kind (thread or post), skipping files
    pub async fn next_primary(&mut self) -> Option<S::Entry> {
        while let Some(entry) = self.next().await {
            if !entry.is_file() {
                return Some(entry);
            }
        }
        None
    }

    /// Drains the traversal
    pub async fn collect_all(mut self) -> Vec<S::Entry> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await {
            entries.push(entry);
        }
        entries
    }

    /// Current state; while active it names the next page to fetch
    pub fn state(&self) -> &TraversalState {
        &self.state
    }

    /// The error that ended the chain, if any
    pub fn error(&self) -> Option<&ForumError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<ForumError> {
        self.error.take()
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    async fn step(&mut self, state: PageState) {
        let url = state.url.clone();
        tracing::trace!("Fetching page {} at {}", state.page, url);

        match self.source.fetch_page(state).await {
            Ok(page) => {
                self.pages_fetched += 1;
                self.buffer.extend(page.items);
                self.state = match page.next {
                    Some(next) => TraversalState::Active(next),
                    None => TraversalState::Done(DoneReason::Exhausted),
                };
            }
            Err(e) => {
                tracing::warn!("Pagination of {} stopped at {}: {}", self.source.container_url(), url, e);
                self.error = Some(e);
                self.state = TraversalState::Done(DoneReason::Failed);
            }
        }
    }
}
