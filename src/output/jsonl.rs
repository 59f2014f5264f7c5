//! JSON Lines writer: one tagged record per item

use crate::model::{Board, File, Item, Post, Thread};
use crate::output::traits::{OutputHandler, OutputResult};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Streams every item as `{"type": ..., ...}` on its own line
pub struct JsonlWriter<W: Write> {
    out: W,
    records: u64,
}

impl JsonlWriter<Box<dyn Write>> {
    /// Opens `path` for appending; `-` writes to stdout
    pub fn create(path: &str) -> OutputResult<Self> {
        let out: Box<dyn Write> = if path == "-" {
            Box::new(BufWriter::new(io::stdout()))
        } else {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
            Box::new(BufWriter::new(file))
        };

        Ok(Self::new(out))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, records: 0 }
    }

    /// Number of records written
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_item(&mut self, item: Item) -> OutputResult<()> {
        serde_json::to_writer(&mut self.out, &item)?;
        self.out.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }
}

impl<W: Write> OutputHandler for JsonlWriter<W> {
    fn record_board(&mut self, board: &Board) -> OutputResult<()> {
        self.write_item(Item::Board(board.clone()))
    }

    fn record_thread(&mut self, thread: &Thread) -> OutputResult<()> {
        self.write_item(Item::Thread(thread.clone()))
    }

    fn record_post(&mut self, _thread: &Thread, post: &Post) -> OutputResult<()> {
        self.write_item(Item::Post(post.clone()))
    }

    fn record_file(&mut self, file: &File) -> OutputResult<()> {
        self.write_item(Item::File(file.clone()))
    }

    fn finalize(&mut self) -> OutputResult<()> {
        self.out.flush()?;
        Ok(())
    }
}
