//! Per-URL write statistics

use std::fmt;

/// Counts of what one `write_url` call produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub boards: u64,
    pub threads: u64,
    pub posts: u64,
    pub files: u64,

    /// Files that could not be downloaded; their records are still written
    pub files_failed: u64,

    /// Pagination chains that ended on an error
    pub failed_chains: u64,
}

impl WriteStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records handed to the writer
    pub fn total_records(&self) -> u64 {
        self.boards + self.threads + self.posts + self.files
    }

    /// Returns true if some part of the forum could not be reached
    pub fn is_partial(&self) -> bool {
        self.failed_chains > 0
    }

    /// Adds the counts of `other` into `self`
    pub fn merge(&mut self, other: &WriteStats) {
        self.boards += other.boards;
        self.threads += other.threads;
        self.posts += other.posts;
        self.files += other.files;
        self.files_failed += other.files_failed;
        self.failed_chains += other.failed_chains;
    }
}

impl fmt::Display for WriteStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} boards, {} threads, {} posts, {} files",
            self.boards, self.threads, self.posts, self.files
        )
    }
}

/// Prints statistics for one URL to stderr
///
/// # Arguments
///
/// * `url` - The URL that was written
/// * `stats` - The statistics to display
pub fn print_statistics(url: &str, stats: &WriteStats) {
    eprintln!("=== {} ===", url);
    eprintln!("  Boards:  {}", stats.boards);
    eprintln!("  Threads: {}", stats.threads);
    eprintln!("  Posts:   {}", stats.posts);
    eprintln!("  Files:   {}", stats.files);

    if stats.files_failed > 0 {
        eprintln!("  Files not downloaded: {}", stats.files_failed);
    }
    if stats.is_partial() {
        eprintln!(
            "  Incomplete: {} listing(s) stopped early, see warnings above",
            stats.failed_chains
        );
    }
}
