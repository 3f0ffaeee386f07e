//! CLI entry point for folio

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio::Site;

#[derive(Parser)]
#[command(name = "folio")]
#[command(version)]
#[command(about = "A static publishing pipeline for multilingual Markdown posts", long_about = None)]
struct Cli {
    /// Set the site directory (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the site into the public directory
    #[command(alias = "b")]
    Build {
        /// Rebuild whenever content or config changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Parse every post and report problems without writing output
    Check,

    /// Remove the public directory
    Clean,

    /// List site information
    List {
        /// Type of content to list (post, tag, category)
        #[arg(default_value = "post")]
        r#type: String,
    },

    /// Create a new post
    New {
        /// Title of the new post
        title: String,

        /// Language of the file; defaults to the site language
        #[arg(short, long)]
        lang: Option<String>,
    },

    /// Display version information
    Version,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "folio=debug,info"
    } else {
        "folio=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine base directory
    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot read current directory")?,
    };

    match cli.command {
        Commands::Build { watch } => {
            let site = Site::new(&base_dir)?;
            tracing::info!("Building site in {:?}", site.base_dir);

            let report = site.build()?;
            report.print_summary();

            if watch {
                folio::commands::build::watch(&site).await?;
            }
        }

        Commands::Check => {
            let site = Site::new(&base_dir)?;
            let report = site.check()?;
            report.print_summary();
            if !report.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Clean => {
            let site = Site::new(&base_dir)?;
            site.clean()?;
            println!("Cleaned successfully!");
        }

        Commands::List { r#type } => {
            let site = Site::new(&base_dir)?;
            folio::commands::list::run(&site, &r#type)?;
        }

        Commands::New { title, lang } => {
            let site = Site::new(&base_dir)?;
            let path = site.new_post(&title, lang.as_deref())?;
            println!("Created: {}", path.display());
        }

        Commands::Version => {
            println!("folio version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(ExitCode::SUCCESS)
}
