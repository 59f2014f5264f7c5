//! Reply-tree reconstruction for mail-style archives
//!
//! Posts arrive flat, each carrying only its `subpath`. A post's parent is the
//! post of the same thread whose subpath is `subpath[:-1]`. The reconstructor
//! remembers the message id it handed out for every subpath of the current
//! thread and starts over when a new thread begins, since subpaths are only
//! unique within one thread.

use crate::model::{NodePath, Post, Thread};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Mail headers linking one post into its thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostLinks {
    pub message_id: String,
    /// Nearest earlier ancestor; `None` for a thread's root post
    pub in_reply_to: Option<String>,
    /// Every known ancestor, outermost first
    pub references: Vec<String>,
}

/// Per-thread `subpath -> message id` bookkeeping
#[derive(Debug)]
pub struct ThreadReconstructor {
    domain: String,
    thread: Option<NodePath>,
    ids: HashMap<NodePath, String>,
}

impl ThreadReconstructor {
    /// `domain` is used as the right-hand side of generated message ids
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            thread: None,
            ids: HashMap::new(),
        }
    }

    /// Starts a new thread, forgetting the previous thread's posts
    pub fn start_thread(&mut self, thread: &Thread) {
        self.reset(&thread.path);
    }

    /// Assigns a message id to `post` and links it to its ancestors
    ///
    /// A post whose direct parent was never seen (for example because a page
    /// failed to load) is attached to its nearest seen ancestor instead.
    pub fn link(&mut self, post: &Post) -> PostLinks {
        if self.thread.as_ref() != Some(&post.path) {
            self.reset(&post.path);
        }

        let references: Vec<String> = (0..post.subpath.len())
            .map(|len| NodePath::from_segments(post.subpath.segments()[..len].iter().cloned()))
            .filter_map(|prefix| self.ids.get(&prefix).cloned())
            .collect();

        let message_id = self.message_id(&post.path, &post.subpath);
        self.ids.insert(post.subpath.clone(), message_id.clone());

        PostLinks {
            message_id,
            in_reply_to: references.last().cloned(),
            references,
        }
    }

    /// Message id already assigned to `subpath` in the current thread
    pub fn lookup(&self, subpath: &NodePath) -> Option<&str> {
        self.ids.get(subpath).map(String::as_str)
    }

    fn reset(&mut self, thread: &NodePath) {
        self.thread = Some(thread.clone());
        self.ids.clear();
    }

    fn message_id(&self, path: &NodePath, subpath: &NodePath) -> String {
        let mut local = if path.is_root() {
            "root".to_string()
        } else {
            path.join(".")
        };
        if !subpath.is_root() {
            local.push('.');
            local.push_str(&subpath.join("."));
        }

        format!("<{}@{}>", local, self.domain)
    }
}

/// Board path to output container, created on first use
#[derive(Debug)]
pub struct BoardGroups<T> {
    groups: HashMap<NodePath, T>,
}

impl<T> BoardGroups<T> {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }

    /// The container for `path`, creating it with `create` the first time
    pub fn get_or_create<E>(
        &mut self,
        path: &NodePath,
        create: impl FnOnce(&NodePath) -> Result<T, E>,
    ) -> Result<&T, E> {
        match self.groups.entry(path.clone()) {
            Entry::Occupied(entry) => Ok(&*entry.into_mut()),
            Entry::Vacant(entry) => Ok(&*entry.insert(create(path)?)),
        }
    }

    pub fn get(&self, path: &NodePath) -> Option<&T> {
        self.groups.get(path)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl<T> Default for BoardGroups<T> {
    fn default() -> Self {
        Self::new()
    }
}
