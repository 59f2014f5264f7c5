//! Output pipeline
//!
//! This module handles:
//! - Walking a resolved URL (board, thread, post or file) through the extractor
//! - Handing the resulting item stream to a format writer
//! - Materializing embedded files next to the output

mod download;
mod jsonl;
mod maildir;
mod mbox;
pub mod message;
pub mod reconstruct;
pub mod stats;
mod traits;

pub use download::FileStore;
pub use jsonl::JsonlWriter;
pub use maildir::MaildirWriter;
pub use mbox::MboxWriter;
pub use reconstruct::{BoardGroups, PostLinks, ThreadReconstructor};
pub use stats::{print_statistics, WriteStats};
pub use traits::{OutputError, OutputHandler, OutputResult};

use crate::board::BoardId;
use crate::config::{OutputConfig, OutputFormat};
use crate::crawler::{Extractor, Target};
use crate::model::{Board, File, Post, PostEntry, Thread, ThreadEntry};
use crate::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// What `write_url` emits
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    pub write_boards: bool,
    pub write_threads: bool,
    pub write_posts: bool,
    pub write_files: bool,
    /// Where downloaded files go when `write_files` is set
    pub files_dir: PathBuf,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            write_boards: true,
            write_threads: true,
            write_posts: true,
            write_files: false,
            files_dir: PathBuf::from("files"),
        }
    }
}

impl WriteOptions {
    pub fn from_config(config: &OutputConfig) -> Self {
        Self {
            write_boards: config.write_boards,
            write_threads: config.write_threads,
            write_posts: config.write_posts,
            write_files: config.download_files,
            files_dir: files_dir(config),
        }
    }
}

/// `files/` inside a maildir, or next to a single-file output
pub fn files_dir(config: &OutputConfig) -> PathBuf {
    let output = Path::new(&config.path);
    let base = match config.format {
        OutputFormat::Maildir => output.to_path_buf(),
        OutputFormat::Jsonl | OutputFormat::Mbox => output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    base.join("files")
}

/// Opens the writer selected by `config`
///
/// # Arguments
///
/// * `config` - Output section of the configuration
/// * `domain` - Host name used in generated message ids
pub fn create_handler(config: &OutputConfig, domain: &str) -> OutputResult<Box<dyn OutputHandler>> {
    if config.path == "-" && config.format != OutputFormat::Jsonl {
        return Err(OutputError::Format(format!(
            "{} output needs a file or directory path",
            config.format
        )));
    }

    let handler: Box<dyn OutputHandler> = match config.format {
        OutputFormat::Jsonl => Box::new(JsonlWriter::create(&config.path)?),
        OutputFormat::Mbox => Box::new(MboxWriter::create(&config.path, domain, config.content_as_title)?),
        OutputFormat::Maildir => Box::new(MaildirWriter::create(&config.path, domain, config.content_as_title)?),
    };
    Ok(handler)
}

/// Resolves `url` and writes everything below it
///
/// A board is written with its threads (each followed by its posts), then its
/// subboards depth-first. A thread is written with its posts; a post or file on
/// its own. Listings that fail part-way are counted in `failed_chains` and the
/// walk continues with the next container.
///
/// # Errors
///
/// Fails if the URL cannot be resolved or the writer cannot write.
pub async fn write_url(
    extractor: &mut Extractor,
    url: &str,
    handler: &mut dyn OutputHandler,
    options: &WriteOptions,
) -> Result<WriteStats> {
    let target = extractor.node_from_url(url).await?;
    tracing::info!("Writing {} from {}", describe(&target), url);

    let mut walk = Walk {
        handler,
        options,
        stats: WriteStats::new(),
        store: options.write_files.then(|| FileStore::new(&options.files_dir)),
    };

    match target {
        Target::Board(board) => {
            if walk.handler.wants_all_boards() {
                let root = extractor.tree().root();
                extractor.fetch_all_lower_boards(root).await;
            }
            walk.boards(extractor, board).await?;
        }
        Target::Thread(thread) => walk.thread(extractor, &thread).await?,
        Target::Post(post) => {
            let thread = Thread {
                path: post.path.clone(),
                url: post.url.clone(),
                origin: post.origin.clone(),
                ..Thread::default()
            };
            walk.post(&thread, &post)?;
        }
        Target::File(file) if options.write_files => walk.file(extractor, file).await?,
        Target::File(file) => {
            tracing::warn!("Skipping file {}: file output is off (use --files)", file.url);
        }
    }

    walk.handler.finalize()?;
    Ok(walk.stats)
}

fn describe(target: &Target) -> &'static str {
    match target {
        Target::Board(_) => "board",
        Target::Thread(_) => "thread",
        Target::Post(_) => "post",
        Target::File(_) => "file",
    }
}

struct Walk<'h, 'o> {
    handler: &'h mut dyn OutputHandler,
    options: &'o WriteOptions,
    stats: WriteStats,
    store: Option<FileStore>,
}

impl Walk<'_, '_> {
    /// `start` and every board below it, depth-first
    async fn boards(&mut self, extractor: &mut Extractor, start: BoardId) -> Result<()> {
        let mut stack = vec![start];
        let mut visited = HashSet::new();

        while let Some(id) = stack.pop() {
            // Relocation can leave stale or merged ids in earlier child lists
            if !extractor.tree().is_live(id) || !visited.insert(id) {
                continue;
            }
            let board = extractor.board(id).clone();

            if self.options.write_boards {
                self.handler.record_board(&board)?;
                self.stats.boards += 1;
            }

            if self.options.write_threads || self.options.write_posts {
                self.threads(extractor, &board).await?;
            }

            let children = extractor.subboards(id).await;
            stack.extend(children.into_iter().rev());
        }

        Ok(())
    }

    async fn threads(&mut self, extractor: &Extractor, board: &Board) -> Result<()> {
        let mut traversal = extractor.threads(board, None);

        loop {
            let entry = if self.options.write_files {
                traversal.next().await
            } else {
                traversal.next_primary().await
            };

            match entry {
                Some(ThreadEntry::Thread(thread)) => self.thread(extractor, &thread).await?,
                Some(ThreadEntry::File(file)) => self.file(extractor, file).await?,
                None => break,
            }
        }

        if traversal.take_error().is_some() {
            self.stats.failed_chains += 1;
        }
        Ok(())
    }

    async fn thread(&mut self, extractor: &Extractor, thread: &Thread) -> Result<()> {
        if self.options.write_threads {
            self.handler.record_thread(thread)?;
            self.stats.threads += 1;
        }

        if !self.options.write_posts {
            return Ok(());
        }

        let mut traversal = extractor.posts(thread, None);

        loop {
            let entry = if self.options.write_files {
                traversal.next().await
            } else {
                traversal.next_primary().await
            };

            match entry {
                Some(PostEntry::Post(post)) => self.post(thread, &post)?,
                Some(PostEntry::File(file)) => self.file(extractor, file).await?,
                None => break,
            }
        }

        if traversal.take_error().is_some() {
            self.stats.failed_chains += 1;
        }
        Ok(())
    }

    fn post(&mut self, thread: &Thread, post: &Post) -> Result<()> {
        if self.options.write_posts {
            self.handler.record_post(thread, post)?;
            self.stats.posts += 1;
        }
        Ok(())
    }

    async fn file(&mut self, extractor: &Extractor, mut file: File) -> Result<()> {
        if !self.options.write_files {
            return Ok(());
        }

        if let Some(store) = self.store.as_mut() {
            let session = extractor.adapter().session();
            if let Err(e) = store.materialize(session, &mut file).await {
                tracing::warn!("Failed to download {}: {}", file.url, e);
                self.stats.files_failed += 1;
            }
        }

        self.handler.record_file(&file)?;
        self.stats.files += 1;
        Ok(())
    }
}
