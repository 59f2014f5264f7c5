use crate::model::NodePath;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Free-form attributes carried over from the site (JSON objects, scraped fields)
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// A forum or category node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub path: NodePath,
    pub url: String,
    /// Page the board was found on
    pub origin: String,
    #[serde(default)]
    pub data: Attributes,
    pub title: String,
}

/// A discussion thread; its parent board lives at `path.parent()`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub path: NodePath,
    pub url: String,
    pub origin: String,
    #[serde(default)]
    pub data: Attributes,
    pub title: String,
}

/// A message within a thread
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Path of the enclosing thread
    pub path: NodePath,
    /// Reply nesting local to the thread; empty for the thread's root post
    pub subpath: NodePath,
    pub url: String,
    pub origin: String,
    #[serde(default)]
    pub data: Attributes,
    pub author: String,
    pub creation_time: String,
    pub content: String,
}

/// An embedded asset found on a board, thread or post page
///
/// `path`/`subpath` anchor the file to the smallest enclosing context; both empty
/// means the file belongs to the page rather than to one post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub path: NodePath,
    pub subpath: NodePath,
    pub url: String,
    pub origin: String,
    #[serde(default)]
    pub data: Attributes,
    pub content_type: Option<String>,
    /// Raw bytes, present for inline assets and after download
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
    /// Location on disk once materialized
    pub os_path: Option<PathBuf>,
}

/// Any crawled object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Item {
    Board(Board),
    Thread(Thread),
    Post(Post),
    File(File),
}

impl Item {
    pub fn path(&self) -> &NodePath {
        match self {
            Item::Board(board) => &board.path,
            Item::Thread(thread) => &thread.path,
            Item::Post(post) => &post.path,
            Item::File(file) => &file.path,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Item::Board(board) => &board.url,
            Item::Thread(thread) => &thread.url,
            Item::Post(post) => &post.url,
            Item::File(file) => &file.url,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Item::Board(_) => "board",
            Item::Thread(_) => "thread",
            Item::Post(_) => "post",
            Item::File(_) => "file",
        }
    }
}

/// Items yielded while paging through a board
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadEntry {
    Thread(Thread),
    File(File),
}

/// Items yielded while paging through a thread
#[derive(Debug, Clone, PartialEq)]
pub enum PostEntry {
    Post(Post),
    File(File),
}

/// Common view over the two page entry kinds
pub trait PageEntry: Into<Item> + Send + 'static {
    /// The embedded file, if this entry is one
    fn as_file(&self) -> Option<&File>;

    fn is_file(&self) -> bool {
        self.as_file().is_some()
    }
}

impl PageEntry for ThreadEntry {
    fn as_file(&self) -> Option<&File> {
        match self {
            ThreadEntry::File(file) => Some(file),
            ThreadEntry::Thread(_) => None,
        }
    }
}

impl PageEntry for PostEntry {
    fn as_file(&self) -> Option<&File> {
        match self {
            PostEntry::File(file) => Some(file),
            PostEntry::Post(_) => None,
        }
    }
}

impl From<ThreadEntry> for Item {
    fn from(entry: ThreadEntry) -> Self {
        match entry {
            ThreadEntry::Thread(thread) => Item::Thread(thread),
            ThreadEntry::File(file) => Item::File(file),
        }
    }
}

impl From<PostEntry> for Item {
    fn from(entry: PostEntry) -> Self {
        match entry {
            PostEntry::Post(post) => Item::Post(post),
            PostEntry::File(file) => Item::File(file),
        }
    }
}

impl From<File> for ThreadEntry {
    fn from(file: File) -> Self {
        ThreadEntry::File(file)
    }
}

impl From<File> for PostEntry {
    fn from(file: File) -> Self {
        PostEntry::File(file)
    }
}
