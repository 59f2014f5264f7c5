use serde::Deserialize;
use std::fmt;

/// Main configuration structure for forum-dl
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
}

/// HTTP session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Total attempts per request, first try included
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between attempts (milliseconds)
    #[serde(rename = "backoff-ms", default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Per-request timeout
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Print each requested URL to stdout instead of logging it
    #[serde(rename = "print-urls", default)]
    pub print_urls: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            print_urls: false,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Output file or directory; `-` means stdout (JSONL only)
    #[serde(default = "default_output_path")]
    pub path: String,

    #[serde(rename = "write-boards", default = "enabled")]
    pub write_boards: bool,

    #[serde(rename = "write-threads", default = "enabled")]
    pub write_threads: bool,

    #[serde(rename = "write-posts", default = "enabled")]
    pub write_posts: bool,

    /// Download embedded files next to the output
    #[serde(rename = "download-files", default)]
    pub download_files: bool,

    /// Use the start of the post content as mail subject
    #[serde(rename = "content-as-title", default)]
    pub content_as_title: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            path: default_output_path(),
            write_boards: true,
            write_threads: true,
            write_posts: true,
            download_files: false,
            content_as_title: false,
        }
    }
}

/// Pagination limits
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraversalConfig {
    /// Maximum pages per board or thread; 0 means unlimited
    #[serde(rename = "max-pages", default)]
    pub max_pages: u32,
}

impl TraversalConfig {
    pub fn page_limit(&self) -> Option<u32> {
        (self.max_pages > 0).then_some(self.max_pages)
    }
}

/// Supported output formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jsonl,
    Mbox,
    Maildir,
}

impl OutputFormat {
    pub fn all() -> &'static [OutputFormat] {
        &[Self::Jsonl, Self::Mbox, Self::Maildir]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Mbox => "mbox",
            Self::Maildir => "maildir",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|format| format.as_str() == name)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_user_agent() -> String {
    format!("forum-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_ms() -> u64 {
    5000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_output_path() -> String {
    "-".to_string()
}

fn enabled() -> bool {
    true
}
