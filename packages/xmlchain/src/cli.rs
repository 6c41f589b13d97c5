//! Command-line interface for xmlchain.

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{validate_reference_url, ResolverConfig};
use crate::error::{ResolveError, Result};
use crate::http::HttpFetcher;
use crate::mapping::Structural;
use crate::report::ResolutionReport;
use crate::resolver::Resolver;
use crate::response::RootItem;
use crate::xml::to_xml;

/// xmlchain - Resolve XML responses that wrap other responses.
#[derive(Parser)]
#[command(name = "xmlchain")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a response document and every document it chains to.
    Resolve {
        /// Path of a local document, or an http(s)/file URL to fetch
        source: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,

        /// Deepest chain level to follow (0 for no limit)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Timeout per fetch attempt in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

/// How the resolved tree is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable overview
    Summary,
    /// The terminal documents as XML
    Xml,
    /// Resolution report as JSON
    Json,
}

/// Run the CLI.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            source,
            format,
            max_depth,
            timeout,
        } => resolve_command(&source, format, max_depth, timeout).await,
    }
}

/// Execute the resolve command.
async fn resolve_command(
    source: &str,
    format: OutputFormat,
    max_depth: Option<usize>,
    timeout: Option<u64>,
) -> Result<()> {
    let mut config = ResolverConfig::from_env()?;
    if let Some(depth) = max_depth {
        config = config.with_max_chain_depth((depth > 0).then_some(depth));
    }
    if let Some(secs) = timeout {
        config = config.with_fetch_timeout(Duration::from_secs(secs));
    }

    let root = load_source(source).await?;
    let fetcher =
        HttpFetcher::from_config(&config).map_err(|e| ResolveError::Config(e.to_string()))?;
    let resolver = Resolver::new(fetcher).with_config(config);

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message(format!("Resolving {source}..."));
    pb.enable_steady_tick(Duration::from_millis(100));

    let tree = resolver.resolve(root).await;
    pb.finish_and_clear();

    match format {
        OutputFormat::Summary => print_summary(&tree),
        OutputFormat::Xml => {
            for terminal in tree.terminal_trees() {
                if terminal.tag().is_empty() {
                    continue;
                }
                println!("{}", to_xml(terminal, true)?);
            }
        }
        OutputFormat::Json => println!("{}", ResolutionReport::from_tree(&tree).to_json_pretty()?),
    }

    match tree.first_error() {
        Some(error) => Err(error.clone()),
        None => Ok(()),
    }
}

/// Build the top-level root from a URL or a local file.
async fn load_source(source: &str) -> Result<RootItem> {
    if source.contains("://") {
        return Ok(RootItem::wrapping(validate_reference_url(source)?));
    }
    let bytes = tokio::fs::read(source).await.map_err(|e| ResolveError::Io {
        path: source.to_string(),
        message: e.to_string(),
    })?;
    Ok(RootItem::new(bytes))
}

fn print_summary(tree: &RootItem) {
    let tag = if tree.tag().is_empty() { "?" } else { tree.tag() };
    println!(
        "{} <{}> (resolution {})",
        style("Resolved").bold(),
        style(tag).cyan(),
        tree.id()
    );
    if let Some(version) = tree.version() {
        println!("  Version: {}", style(version).green());
    }
    println!("  Chained documents: {}", tree.chained_document_count());
    for chain in tree.chain_nodes() {
        let reference = chain
            .reference_url()
            .map_or_else(|| "(no reference)".to_string(), ToString::to_string);
        println!("    - {} {}", chain.kind(), reference);
    }

    let terminal = tree.terminal_trees();
    println!("  Terminal documents: {}", terminal.len());
    for document in terminal {
        let origin = document
            .source_url()
            .map_or_else(|| "(inline)".to_string(), ToString::to_string);
        println!(
            "    - depth {} {}: {} child nodes",
            document.depth(),
            origin,
            document.child_nodes().len()
        );
        if let Some(error) = document.server_error() {
            println!(
                "      {} {} {}",
                style("Server error").yellow(),
                error.code().unwrap_or("-"),
                error.message().unwrap_or_default()
            );
        }
    }

    if let Some(error) = tree.first_error() {
        println!("  {} {}", style("Error:").red().bold(), error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_resolve() {
        let cli = Cli::parse_from(["xmlchain", "resolve", "response.xml"]);

        let Commands::Resolve {
            source,
            format,
            max_depth,
            timeout,
        } = cli.command;
        assert_eq!(source, "response.xml");
        assert_eq!(format, OutputFormat::Summary);
        assert!(max_depth.is_none());
        assert!(timeout.is_none());
    }

    #[test]
    fn test_cli_parse_resolve_with_options() {
        let cli = Cli::parse_from([
            "xmlchain",
            "resolve",
            "https://ads.example.com/vast.xml",
            "--format",
            "json",
            "--max-depth",
            "4",
            "--timeout",
            "5",
        ]);

        let Commands::Resolve {
            format,
            max_depth,
            timeout,
            ..
        } = cli.command;
        assert_eq!(format, OutputFormat::Json);
        assert_eq!(max_depth, Some(4));
        assert_eq!(timeout, Some(5));
    }

    #[tokio::test]
    async fn test_load_source_url() {
        let root = load_source("https://ads.example.com/vast.xml").await.unwrap();
        assert!(root.reference_url().is_some());
    }

    #[tokio::test]
    async fn test_load_source_unsupported_url() {
        assert!(matches!(
            load_source("ftp://ads.example.com/vast.xml").await,
            Err(ResolveError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_load_source_missing_file() {
        assert!(matches!(
            load_source("/definitely/not/here.xml").await,
            Err(ResolveError::Io { .. })
        ));
    }
}
