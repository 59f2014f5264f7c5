//! mbox writer (mboxrd quoting)
//!
//! Every post becomes one message preceded by a `From ` separator line. Body
//! lines that could be mistaken for a separator get one more `>`.

use crate::model::{Board, File, Post, Thread};
use crate::output::message::{self, post_date};
use crate::output::reconstruct::ThreadReconstructor;
use crate::output::traits::{OutputHandler, OutputResult};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

const ENVELOPE_SENDER: &str = "forum-dl";

/// `asctime` date used when a post has no parseable timestamp
const EPOCH_ASCTIME: &str = "Thu Jan  1 00:00:00 1970";

pub struct MboxWriter<W: Write> {
    out: W,
    threads: ThreadReconstructor,
    content_as_title: bool,
    messages: u64,
}

impl MboxWriter<BufWriter<fs::File>> {
    /// Opens the mailbox at `path`, appending to it if it exists
    pub fn create(path: &str, domain: &str, content_as_title: bool) -> OutputResult<Self> {
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file), domain, content_as_title))
    }
}

impl<W: Write> MboxWriter<W> {
    pub fn new(out: W, domain: &str, content_as_title: bool) -> Self {
        Self {
            out,
            threads: ThreadReconstructor::new(domain),
            content_as_title,
            messages: 0,
        }
    }

    pub fn messages(&self) -> u64 {
        self.messages
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Quotes lines matching `>*From `
fn escape_from_lines(message: &str) -> String {
    let mut escaped = String::with_capacity(message.len());

    for line in message.split_inclusive('\n') {
        if line.trim_start_matches('>').starts_with("From ") {
            escaped.push('>');
        }
        escaped.push_str(line);
    }

    escaped
}

impl<W: Write> OutputHandler for MboxWriter<W> {
    fn record_board(&mut self, _board: &Board) -> OutputResult<()> {
        Ok(())
    }

    fn record_thread(&mut self, thread: &Thread) -> OutputResult<()> {
        self.threads.start_thread(thread);
        Ok(())
    }

    fn record_post(&mut self, thread: &Thread, post: &Post) -> OutputResult<()> {
        let links = self.threads.link(post);
        let body = message::render(thread, post, &links, self.content_as_title);

        let date = post_date(&post.creation_time)
            .map(|date| date.format("%a %b %e %H:%M:%S %Y").to_string())
            .unwrap_or_else(|| EPOCH_ASCTIME.to_string());

        writeln!(self.out, "From {} {}", ENVELOPE_SENDER, date)?;
        self.out.write_all(escape_from_lines(&body).as_bytes())?;
        self.out.write_all(b"\n")?;
        self.messages += 1;

        Ok(())
    }

    fn record_file(&mut self, _file: &File) -> OutputResult<()> {
        Ok(())
    }

    fn finalize(&mut self) -> OutputResult<()> {
        self.out.flush()?;
        Ok(())
    }
}
