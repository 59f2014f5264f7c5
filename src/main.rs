//! forum-dl main entry point
//!
//! This is the command-line interface for the forum-dl forum archiver.

use anyhow::Context;
use clap::Parser;
use forum_dl::config::{load_config_with_hash, validate, Config, OutputFormat};
use forum_dl::output::{create_handler, print_statistics, write_url, WriteOptions, WriteStats};
use forum_dl::{adapter_names, detect, Extractor, Session};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

/// forum-dl: download forums into JSON Lines or mail archives
///
/// Each URL may point at a whole forum, a board, a thread or a single post.
/// The forum engine is detected automatically.
#[derive(Parser, Debug)]
#[command(name = "forum-dl")]
#[command(version)]
#[command(about = "Archive discussion forums", long_about = None)]
struct Cli {
    /// Forum, board, thread or post URLs
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Path to TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format (jsonl, mbox, maildir)
    #[arg(short = 'f', long, value_name = "FORMAT")]
    output_format: Option<String>,

    /// Output file or directory; `-` is stdout (jsonl only)
    #[arg(short, long, value_name = "PATH")]
    output: Option<String>,

    /// Do not write board records
    #[arg(long)]
    no_boards: bool,

    /// Do not write thread records
    #[arg(long)]
    no_threads: bool,

    /// Do not write post records
    #[arg(long)]
    no_posts: bool,

    /// Download embedded files and write file records
    #[arg(long)]
    files: bool,

    /// Use the start of each post as the message subject
    #[arg(long)]
    content_as_title: bool,

    /// User agent sent with every request
    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    /// Print every requested URL to stdout
    #[arg(long)]
    get_urls: bool,

    /// Stop each listing after this many pages (0 = unlimited)
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// List supported forum engines and exit
    #[arg(long)]
    list_extractors: bool,

    /// List output formats and exit
    #[arg(long)]
    list_output_formats: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.list_extractors {
        for name in adapter_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    if cli.list_output_formats {
        for format in OutputFormat::all() {
            println!("{}", format);
        }
        return Ok(());
    }

    setup_logging(cli.verbose, cli.quiet);

    let config = build_config(&cli)?;

    if cli.urls.is_empty() {
        anyhow::bail!("no URLs given");
    }

    let mut failed = 0;
    let mut total = WriteStats::new();

    for url in &cli.urls {
        match handle_url(&config, url).await {
            Ok(stats) => {
                if !cli.quiet {
                    print_statistics(url, &stats);
                }
                total.merge(&stats);
            }
            Err(e) => {
                tracing::error!("Failed to download {}: {:#}", url, e);
                failed += 1;
            }
        }
    }

    if cli.urls.len() > 1 {
        tracing::info!("Done: {} ({} of {} URLs failed)", total, failed, cli.urls.len());
    }

    if failed > 0 {
        anyhow::bail!("{} of {} URLs failed", failed, cli.urls.len());
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("forum_dl=info,warn"),
            1 => EnvFilter::new("forum_dl=debug,info"),
            2 => EnvFilter::new("forum_dl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // stdout may carry JSON Lines output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the configuration file, if any, and applies command-line overrides
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    if let Some(name) = &cli.output_format {
        config.output.format = OutputFormat::from_name(name)
            .with_context(|| format!("unknown output format '{}'", name))?;
    }
    if let Some(path) = &cli.output {
        config.output.path = path.clone();
    }
    if cli.no_boards {
        config.output.write_boards = false;
    }
    if cli.no_threads {
        config.output.write_threads = false;
    }
    if cli.no_posts {
        config.output.write_posts = false;
    }
    if cli.files {
        config.output.download_files = true;
    }
    if cli.content_as_title {
        config.output.content_as_title = true;
    }
    if let Some(user_agent) = &cli.user_agent {
        config.session.user_agent = user_agent.clone();
    }
    if cli.get_urls {
        config.session.print_urls = true;
    }
    if let Some(max_pages) = cli.max_pages {
        config.traversal.max_pages = max_pages;
    }

    validate(&config)?;
    Ok(config)
}

/// Detects the forum behind `url` and writes it out
async fn handle_url(config: &Config, url: &str) -> anyhow::Result<WriteStats> {
    let session = Arc::new(Session::new(&config.session)?);
    let adapter = detect(session, url).await?;
    tracing::info!("Using {} extractor for {}", adapter.name(), adapter.base_url());

    let mut extractor = Extractor::new(adapter).with_page_limit(config.traversal.page_limit());
    extractor
        .fetch()
        .await
        .with_context(|| format!("failed to list boards of {}", extractor.base_url()))?;

    let domain = Url::parse(extractor.base_url())
        .ok()
        .and_then(|base| base.host_str().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string());

    let mut handler = create_handler(&config.output, &domain)?;
    let options = WriteOptions::from_config(&config.output);

    let stats = write_url(&mut extractor, url, handler.as_mut(), &options).await?;
    Ok(stats)
}
