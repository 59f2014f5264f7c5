//! Maildir++ writer
//!
//! The root board maps to the maildir itself; every other board gets a folder
//! named `.<seg>.<seg>` directly under the root. Messages are written into the
//! folder's `tmp/` and then renamed into `new/`.
//!
//! The writer asks for the whole board tree upfront so that a board first seen
//! under a provisional path does not leave a stray folder behind.

use crate::model::{Board, File, NodePath, Post, Thread};
use crate::output::message;
use crate::output::reconstruct::{BoardGroups, ThreadReconstructor};
use crate::output::traits::{OutputHandler, OutputResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const SUBDIRS: [&str; 3] = ["cur", "new", "tmp"];

pub struct MaildirWriter {
    root: PathBuf,
    folders: BoardGroups<PathBuf>,
    threads: ThreadReconstructor,
    content_as_title: bool,
    delivered: u64,
}

impl MaildirWriter {
    /// Creates (or reopens) the maildir at `root`
    pub fn create(root: impl Into<PathBuf>, domain: &str, content_as_title: bool) -> OutputResult<Self> {
        let root = root.into();
        create_maildir(&root)?;

        Ok(Self {
            root,
            folders: BoardGroups::new(),
            threads: ThreadReconstructor::new(domain),
            content_as_title,
            delivered: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Folder name for a board path; `None` for the root board
    pub fn folder_name(path: &NodePath) -> Option<String> {
        if path.is_root() {
            return None;
        }

        let segments: Vec<String> = path
            .segments()
            .iter()
            .map(|segment| segment.replace(['.', '/', '\\'], "_"))
            .collect();

        Some(format!(".{}", segments.join(".")))
    }

    fn folder(&mut self, board: &NodePath) -> OutputResult<PathBuf> {
        let root = &self.root;
        let folder = self.folders.get_or_create(board, |path| {
            let dir = match Self::folder_name(path) {
                Some(name) => root.join(name),
                None => root.clone(),
            };
            create_maildir(&dir)?;
            if !path.is_root() {
                fs::write(dir.join("maildirfolder"), b"")?;
            }
            tracing::debug!("Maildir folder for {} at {}", path, dir.display());
            Ok::<_, io::Error>(dir)
        })?;

        Ok(folder.clone())
    }

    fn deliver(&mut self, folder: &Path, content: &str) -> OutputResult<PathBuf> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let name = format!(
            "{}.M{}P{}Q{}.forum-dl",
            now.as_secs(),
            now.subsec_micros(),
            std::process::id(),
            self.delivered
        );

        let tmp = folder.join("tmp").join(&name);
        let new = folder.join("new").join(&name);
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &new)?;

        self.delivered += 1;
        Ok(new)
    }
}

fn create_maildir(dir: &Path) -> io::Result<()> {
    for sub in SUBDIRS {
        fs::create_dir_all(dir.join(sub))?;
    }
    Ok(())
}

impl OutputHandler for MaildirWriter {
    /// Folders are named after board paths, which must be final before the first one is made
    fn wants_all_boards(&self) -> bool {
        true
    }

    fn record_board(&mut self, board: &Board) -> OutputResult<()> {
        self.folder(&board.path)?;
        Ok(())
    }

    fn record_thread(&mut self, thread: &Thread) -> OutputResult<()> {
        self.threads.start_thread(thread);
        Ok(())
    }

    fn record_post(&mut self, thread: &Thread, post: &Post) -> OutputResult<()> {
        let folder = self.folder(&thread.path.parent())?;
        let links = self.threads.link(post);
        let content = message::render(thread, post, &links, self.content_as_title);
        self.deliver(&folder, &content)?;
        Ok(())
    }

    fn record_file(&mut self, _file: &File) -> OutputResult<()> {
        Ok(())
    }

    fn finalize(&mut self) -> OutputResult<()> {
        Ok(())
    }
}
