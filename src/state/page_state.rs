/// Pagination state definitions
///
/// This module defines the continuation value passed between page fetches and the
/// states a traversal chain moves through.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Continuation token for a paginated fetch
///
/// This is the only mutable value threaded from one page fetch to the next. Adapters
/// may stash extra carry-over in `pending`, for example the remaining post ids of a
/// stream or relative links still to visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageState {
    /// URL of the next page to fetch
    pub url: String,

    /// 1-based page counter
    pub page: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<String>,
}

impl PageState {
    /// Initial state for a container: its own URL, page 1
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            page: 1,
            pending: Vec::new(),
        }
    }

    /// State for the following page at `url`, keeping the carry-over fields
    pub fn next(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            page: self.page + 1,
            pending: self.pending.clone(),
        }
    }

    pub fn with_pending(mut self, pending: Vec<String>) -> Self {
        self.pending = pending;
        self
    }

    /// True if this is the first page of its container
    pub fn is_first(&self) -> bool {
        self.page == 1
    }
}

/// Why a traversal chain stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoneReason {
    /// The adapter returned no next state
    Exhausted,

    /// A page fetch failed; remaining pages were not attempted
    Failed,

    /// The configured page cap was reached
    PageLimit,
}

/// Represents the current state of a pagination chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalState {
    // ===== Active States =====
    /// The next page to fetch
    Active(PageState),

    // ===== Terminal States =====
    /// No further pages will be fetched
    Done(DoneReason),
}

impl TraversalState {
    /// Returns true if this is a terminal state (no further pages will be fetched)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Returns true if another page fetch is pending
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Returns true if the chain ended because of a failure
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Done(DoneReason::Failed))
    }

    /// The pending continuation, if any
    pub fn page_state(&self) -> Option<&PageState> {
        match self {
            Self::Active(state) => Some(state),
            Self::Done(_) => None,
        }
    }

    /// Short label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active(_) => "active",
            Self::Done(DoneReason::Exhausted) => "exhausted",
            Self::Done(DoneReason::Failed) => "failed",
            Self::Done(DoneReason::PageLimit) => "page_limit",
        }
    }
}

impl fmt::Display for TraversalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active(state) => write!(f, "active(page {} at {})", state.page, state.url),
            Self::Done(_) => write!(f, "{}", self.as_str()),
        }
    }
}
