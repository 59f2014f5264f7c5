//! Node paths
//!
//! A `NodePath` is the ordered list of segment identifiers that names a board,
//! thread or post within one crawl. The root board has the empty path.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered sequence of segment identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(Vec<String>);

impl NodePath {
    /// The empty (root) path
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds a path from anything that yields segments
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment, `None` for the root
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// `path[:-1]`; the root is its own parent
    pub fn parent(&self) -> NodePath {
        match self.0.split_last() {
            Some((_, rest)) => Self(rest.to_vec()),
            None => Self::root(),
        }
    }

    /// Returns a new path with `segment` appended
    pub fn child(&self, segment: impl Into<String>) -> NodePath {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// True if `prefix` is a (non-strict) prefix of this path
    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Replaces the leading `prefix` of this path with `replacement`
    ///
    /// Returns `None` if `prefix` is not a prefix of this path.
    pub fn rebase(&self, prefix: &NodePath, replacement: &NodePath) -> Option<NodePath> {
        let rest = self.0.strip_prefix(prefix.0.as_slice())?;
        let mut segments = replacement.0.clone();
        segments.extend(rest.iter().cloned());
        Some(Self(segments))
    }

    /// Joins the segments with `sep`
    pub fn join(&self, sep: &str) -> String {
        self.0.join(sep)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl<S: Into<String>> FromIterator<S> for NodePath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_segments(iter)
    }
}

impl From<Vec<String>> for NodePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&[&str]> for NodePath {
    fn from(segments: &[&str]) -> Self {
        Self::from_segments(segments.iter().copied())
    }
}
