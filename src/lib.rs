//! forum-dl: a forum crawler and archiver
//!
//! This crate crawls hierarchical discussion forums (boards, threads, posts and
//! embedded files) through per-site adapters and re-emits what it finds as
//! structured records or threaded mail archives.

pub mod adapters;
pub mod board;
pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for forum-dl operations
#[derive(Debug, Error)]
pub enum ForumError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No extractor matches {url}")]
    ExtractorNotFound { url: String },

    #[error("Board not found: {path}")]
    BoardNotFound { path: model::NodePath },

    #[error("Unexpected page shape at {url}: missing {expected}")]
    MarkupShape { url: String, expected: String },

    #[error("Request already served without caching: {url}")]
    CycleDetected { url: String },

    #[error("Giving up on {url} after {attempts} attempts: {message}")]
    Transport {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Cannot move board {from} to {to}")]
    InvalidRelocation {
        from: model::NodePath,
        to: model::NodePath,
    },

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForumError {
    /// Returns true for the "nothing matches" class of errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ExtractorNotFound { .. } | Self::BoardNotFound { .. }
        )
    }

    /// Shorthand for a missing structural element on a fetched page
    pub fn markup(url: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::MarkupShape {
            url: url.into(),
            expected: expected.into(),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("{url} is not below {base}")]
    NotRelative { url: String, base: String },
}

/// Result type alias for forum-dl operations
pub type Result<T> = std::result::Result<T, ForumError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use board::{BoardId, BoardTree};
pub use config::Config;
pub use adapters::{adapter_names, detect};
pub use crawler::{Extractor, Session, Traversal};
pub use model::{Board, File, Item, NodePath, Post, Thread};
pub use state::PageState;
