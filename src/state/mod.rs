//! State module for tracking pagination progress
//!
//! # Components
//!
//! - `PageState`: the continuation passed from one page fetch to the next
//! - `TraversalState`: where a pagination chain currently is (active or done)

mod page_state;

// Re-export main types
pub use page_state::{DoneReason, PageState, TraversalState};
