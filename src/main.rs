//! seo-crawl: crawl a website and emit SEO page facts as JSON

use anyhow::Result;
use clap::{Parser, Subcommand};
use seo_crawl::config::{Config, LogFormat, LoggingConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "seo-crawl")]
#[command(about = "Crawl a website and extract structured SEO page facts")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "seo-crawl.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a website starting from its homepage
    Crawl {
        /// Homepage URL (scheme optional)
        url: String,

        /// Maximum pages to fetch, homepage included
        #[arg(long)]
        max_pages: Option<usize>,

        /// Maximum link depth from the homepage
        #[arg(long)]
        max_depth: Option<usize>,

        /// Never render pages in the headless browser
        #[arg(long)]
        no_javascript: bool,

        /// Do not seed the crawl from sitemaps
        #[arg(long)]
        no_sitemaps: bool,

        /// Write the JSON report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON
        #[arg(long)]
        pretty: bool,

        /// Keep raw HTML in the report
        #[arg(long)]
        include_html: bool,
    },

    /// Discover sitemap URLs for a site
    Sitemap {
        /// Site URL
        url: String,

        /// Pretty-print JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Fingerprint a site's CMS and JavaScript footprint from its homepage
    Detect {
        /// Homepage URL
        url: String,
    },

    /// Write a default configuration file
    Init {
        /// Directory to write seo-crawl.toml into
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(logging: &LoggingConfig, verbosity: u8) -> Result<()> {
    let level = logging.level.raised_by(verbosity);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,seo_crawl={}", level)));

    // Logs go to stderr so JSON reports on stdout stay clean
    match logging.format {
        LogFormat::Json => {
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_target(logging.with_target)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Text => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(logging.with_target)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { path, force } = &cli.command {
        return commands::init_config(path, *force);
    }

    let config = Config::load_or_default(&cli.config)?;
    init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Crawl {
            url,
            max_pages,
            max_depth,
            no_javascript,
            no_sitemaps,
            output,
            pretty,
            include_html,
        } => {
            let args = commands::CrawlArgs {
                url,
                max_pages,
                max_depth,
                use_javascript: !no_javascript,
                follow_sitemaps: !no_sitemaps,
                output,
                pretty,
                include_html,
            };
            commands::crawl_site(config, args).await
        }
        Commands::Sitemap { url, pretty } => commands::discover_sitemaps(config, &url, pretty).await,
        Commands::Detect { url } => commands::detect_site(config, &url).await,
        Commands::Init { .. } => Ok(()),
    }
}
