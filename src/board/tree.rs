//! Arena-backed board hierarchy
//!
//! Boards are stored in a flat arena and addressed by `BoardId`. Two lookup tables
//! sit beside it: canonical path to id, and `(parent id, segment)` to child id.
//! Relocating a board is an index reassignment plus a path rewrite of its subtree;
//! nodes are never removed from the arena, only detached when merged away.

use crate::model::{Attributes, Board, NodePath};
use crate::{ForumError, Result};
use std::collections::HashMap;

/// Index of a board in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoardId(usize);

impl BoardId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Attributes recorded by `set_board`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardAttrs {
    pub url: String,
    pub origin: String,
    pub title: String,
    pub data: Attributes,
    /// `Some` overrides the node's fetch flag, `None` keeps it (new nodes start unfetched)
    pub subboards_fetched: Option<bool>,
}

impl BoardAttrs {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn data(mut self, data: Attributes) -> Self {
        self.data = data;
        self
    }

    pub fn fetched(mut self, fetched: bool) -> Self {
        self.subboards_fetched = Some(fetched);
        self
    }
}

#[derive(Debug, Clone)]
struct BoardNode {
    board: Board,
    parent: Option<BoardId>,
    children: Vec<BoardId>,
    subboards_fetched: bool,
    detached: bool,
}

/// The board hierarchy of one crawl
#[derive(Debug, Clone)]
pub struct BoardTree {
    nodes: Vec<BoardNode>,
    by_path: HashMap<NodePath, BoardId>,
    by_segment: HashMap<(BoardId, String), BoardId>,
}

impl BoardTree {
    /// Creates a tree holding only the root board
    pub fn new(root_url: impl Into<String>) -> Self {
        let url = root_url.into();
        let root = BoardNode {
            board: Board {
                path: NodePath::root(),
                origin: url.clone(),
                url,
                ..Board::default()
            },
            parent: None,
            children: Vec::new(),
            subboards_fetched: false,
            detached: false,
        };

        let mut by_path = HashMap::new();
        by_path.insert(NodePath::root(), BoardId(0));

        Self {
            nodes: vec![root],
            by_path,
            by_segment: HashMap::new(),
        }
    }

    pub fn root(&self) -> BoardId {
        BoardId(0)
    }

    /// Number of live boards, root included
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| !node.detached).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: BoardId) -> &Board {
        &self.nodes[id.0].board
    }

    /// Resolves a path against the boards already known, without fetching
    pub fn id_of(&self, path: &NodePath) -> Option<BoardId> {
        self.by_path.get(path).copied()
    }

    pub fn lookup(&self, path: &NodePath) -> Option<&Board> {
        self.id_of(path).map(|id| self.get(id))
    }

    pub fn child(&self, parent: BoardId, segment: &str) -> Option<BoardId> {
        self.by_segment.get(&(parent, segment.to_string())).copied()
    }

    /// Immediate children in discovery order
    pub fn children(&self, id: BoardId) -> &[BoardId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: BoardId) -> Option<BoardId> {
        self.nodes[id.0].parent
    }

    pub fn is_fetched(&self, id: BoardId) -> bool {
        self.nodes[id.0].subboards_fetched
    }

    /// Marks a board's subboards as enumerated; the flag never goes back to false
    /// through this call
    pub fn mark_fetched(&mut self, id: BoardId) {
        self.nodes[id.0].subboards_fetched = true;
    }

    /// False once the board was merged into another one
    pub fn is_live(&self, id: BoardId) -> bool {
        self.nodes.get(id.0).is_some_and(|node| !node.detached)
    }

    /// All live boards in creation order
    pub fn ids(&self) -> impl Iterator<Item = BoardId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.detached)
            .map(|(i, _)| BoardId(i))
    }

    /// Child of `parent` whose URL equals `url`
    pub fn child_by_url(&self, parent: BoardId, url: &str) -> Option<BoardId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&child| self.get(child).url == url)
    }

    /// First live board (other than the root) whose last path segment is `segment`
    pub fn find_by_last_segment(&self, segment: &str) -> Option<BoardId> {
        self.ids()
            .skip(1)
            .find(|&id| self.get(id).path.last() == Some(segment))
    }

    /// First live board matching `predicate`
    pub fn find(&self, mut predicate: impl FnMut(&Board) -> bool) -> Option<BoardId> {
        self.ids().find(|&id| predicate(self.get(id)))
    }

    /// Creates or updates the board at `path`
    ///
    /// With `replace_at` naming an existing board, that board (and its subtree) is
    /// moved to `path` and its attributes overwritten with `attrs`. If a board
    /// already exists at `path`, the moved board is merged into it. Fetch flags of
    /// moved descendants are preserved. Missing ancestors of `path` are created as
    /// unfetched placeholders so a later lazy fetch fills them in.
    pub fn set_board(
        &mut self,
        path: &NodePath,
        attrs: BoardAttrs,
        replace_at: Option<&NodePath>,
    ) -> Result<BoardId> {
        let source = replace_at
            .filter(|from| *from != path)
            .and_then(|from| self.id_of(from).map(|id| (from, id)));

        let id = match source {
            Some((from, source_id)) => self.relocate(from, source_id, path)?,
            None => match self.id_of(path) {
                Some(existing) => existing,
                None => {
                    let parent = self.ensure_path(&path.parent());
                    self.insert_child(parent, path.clone())
                }
            },
        };

        self.apply(id, attrs);
        Ok(id)
    }

    fn apply(&mut self, id: BoardId, attrs: BoardAttrs) {
        let node = &mut self.nodes[id.0];
        node.board.url = attrs.url;
        node.board.origin = attrs.origin;
        node.board.title = attrs.title;
        node.board.data = attrs.data;
        if let Some(fetched) = attrs.subboards_fetched {
            node.subboards_fetched = fetched;
        }
    }

    fn relocate(&mut self, from: &NodePath, source: BoardId, to: &NodePath) -> Result<BoardId> {
        if from.is_root() || to.is_root() || to.starts_with(from) {
            return Err(ForumError::InvalidRelocation {
                from: from.clone(),
                to: to.clone(),
            });
        }

        let parent = self.ensure_path(&to.parent());

        let id = match self.id_of(to) {
            Some(target) => {
                tracing::debug!("Merging board {} into {}", from, to);
                self.merge_into(source, target);
                target
            }
            None => {
                tracing::debug!("Moving board {} to {}", from, to);
                self.detach(source);
                self.attach(source, parent, to);
                source
            }
        };

        Ok(id)
    }

    /// Moves every child of `source` under `target` (recursively merging clashes),
    /// then detaches `source` for good
    fn merge_into(&mut self, source: BoardId, target: BoardId) {
        let children = self.nodes[source.0].children.clone();

        for child in children {
            let segment = self.get(child).path.last().unwrap_or_default().to_string();

            match self.child(target, &segment) {
                Some(existing) => self.merge_into(child, existing),
                None => {
                    let new_path = self.get(target).path.child(segment);
                    self.detach(child);
                    self.attach(child, target, &new_path);
                }
            }
        }

        let fetched = self.nodes[source.0].subboards_fetched;
        self.nodes[target.0].subboards_fetched |= fetched;

        self.detach(source);
        self.by_path.retain(|_, id| *id != source);
        self.nodes[source.0].detached = true;
    }

    fn detach(&mut self, id: BoardId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&child| child != id);
            self.by_segment.retain(|_, child| *child != id);
        }
    }

    /// Hangs `id` under `parent` at `path`, rewriting the paths of its subtree
    fn attach(&mut self, id: BoardId, parent: BoardId, path: &NodePath) {
        let old_path = self.get(id).path.clone();
        let subtree = self.subtree(id);

        for &node in &subtree {
            let old = self.get(node).path.clone();
            self.by_path.remove(&old);
        }
        for &node in &subtree {
            let rebased = self.get(node).path.rebase(&old_path, path);
            if let Some(new_path) = rebased {
                self.by_path.insert(new_path.clone(), node);
                self.nodes[node.0].board.path = new_path;
            }
        }

        let segment = path.last().unwrap_or_default().to_string();
        self.nodes[id.0].parent = Some(parent);
        self.nodes[parent.0].children.push(id);
        self.by_segment.insert((parent, segment), id);
    }

    /// `id` followed by all of its descendants, breadth first
    fn subtree(&self, id: BoardId) -> Vec<BoardId> {
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            out.extend(self.children(out[i]).iter().copied());
            i += 1;
        }
        out
    }

    /// Returns the board at `path`, creating placeholders along the way
    fn ensure_path(&mut self, path: &NodePath) -> BoardId {
        let mut current = self.root();
        let mut walked = NodePath::root();

        for segment in path.segments() {
            walked = walked.child(segment.clone());
            current = match self.child(current, segment) {
                Some(child) => child,
                None => {
                    tracing::debug!("Creating placeholder board {}", walked);
                    self.insert_child(current, walked.clone())
                }
            };
        }

        current
    }

    fn insert_child(&mut self, parent: BoardId, path: NodePath) -> BoardId {
        let id = BoardId(self.nodes.len());
        let segment = path.last().unwrap_or_default().to_string();

        self.nodes.push(BoardNode {
            board: Board {
                path: path.clone(),
                ..Board::default()
            },
            parent: Some(parent),
            children: Vec::new(),
            subboards_fetched: false,
            detached: false,
        });
        self.nodes[parent.0].children.push(id);
        self.by_segment.insert((parent, segment), id);
        self.by_path.insert(path, id);

        id
    }
}
