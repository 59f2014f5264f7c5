//! Configuration module for forum-dl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; command-line flags are layered on top in `main`.
//!
//! # Example
//!
//! ```no_run
//! use forum_dl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("forum-dl.toml")).unwrap();
//! println!("Retry budget: {}", config.session.max_attempts);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, OutputConfig, OutputFormat, SessionConfig, TraversalConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
