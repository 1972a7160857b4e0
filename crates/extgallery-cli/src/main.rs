//! extgallery CLI - search, inspect and download extensions from a gallery

use clap::{Parser, Subcommand, ValueEnum};
use extgallery_client::GalleryClient;
use extgallery_client::search::SEARCH_PAGE_SIZE;
use extgallery_core::SortBy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::config::ConfigAction;
use error::Result;

#[derive(Parser)]
#[command(name = "extgallery")]
#[command(version)]
#[command(about = "Search, inspect and download extensions from an extension gallery", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "EXTGALLERY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the gallery
    ///
    /// The text may contain `category:NAME`, `tag:NAME` and `featured`.
    Search {
        /// Search text
        text: Vec<String>,

        /// Page to show, starting at 1
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Results per page
        #[arg(long, default_value_t = SEARCH_PAGE_SIZE)]
        page_size: u32,

        /// Sort order of the results
        #[arg(long, value_enum)]
        sort: Option<SortKey>,

        /// Consider pre-release versions
        #[arg(long)]
        pre_release: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show extension details
    Show {
        /// Extension (publisher.name[@version])
        extension: String,

        /// Consider pre-release versions
        #[arg(long)]
        pre_release: bool,

        /// Target platform (defaults to this machine)
        #[arg(long)]
        platform: Option<String>,

        /// Only accept versions this product can run
        #[arg(long)]
        compatible: bool,

        /// Print the readme
        #[arg(long)]
        readme: bool,

        /// Print the changelog
        #[arg(long)]
        changelog: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the versions this product can run
    Versions {
        /// Extension (publisher.name)
        extension: String,

        /// Include pre-release versions
        #[arg(long)]
        pre_release: bool,

        /// Target platform (defaults to this machine)
        #[arg(long)]
        platform: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download an extension package
    Download {
        /// Extension (publisher.name[@version])
        extension: String,

        /// Consider pre-release versions
        #[arg(long)]
        pre_release: bool,

        /// Target platform (defaults to this machine)
        #[arg(long)]
        platform: Option<String>,

        /// Output file (defaults to <id>-<version>.vsix)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also download the signature archive
        #[arg(long)]
        signature: bool,

        /// Count the download as an update rather than an install
        #[arg(long)]
        update: bool,
    },

    /// Report an install or uninstall to the gallery
    Report {
        /// Extension (publisher.name@version)
        extension: String,

        /// Report an uninstall instead of an install
        #[arg(long)]
        uninstall: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortKey {
    Relevance,
    Installs,
    Rating,
    Name,
    Publisher,
    Published,
    Updated,
}

impl From<SortKey> for SortBy {
    fn from(key: SortKey) -> Self {
        match key {
            SortKey::Relevance => SortBy::NoneOrRelevance,
            SortKey::Installs => SortBy::InstallCount,
            SortKey::Rating => SortBy::WeightedRating,
            SortKey::Name => SortBy::Title,
            SortKey::Publisher => SortBy::PublisherName,
            SortKey::Published => SortBy::PublishedDate,
            SortKey::Updated => SortBy::LastUpdatedDate,
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let command = match cli.command {
        Commands::Config { action } => {
            return commands::config::run(&action, cli.config.as_deref());
        }
        command => command,
    };

    let config = commands::load_config(cli.config.as_deref())?;
    let client = GalleryClient::new(config)?;
    let token = commands::cancel_on_interrupt();

    let result = match command {
        Commands::Search {
            text,
            page,
            page_size,
            sort,
            pre_release,
            json,
        } => {
            commands::search::run(
                &client,
                &text,
                page,
                page_size,
                sort.map(SortBy::from),
                pre_release,
                json,
                &token,
            )
            .await
        }

        Commands::Show {
            extension,
            pre_release,
            platform,
            compatible,
            readme,
            changelog,
            json,
        } => {
            commands::show::run(
                &client,
                &extension,
                commands::show::ShowOptions {
                    pre_release,
                    platform: platform.as_deref(),
                    compatible,
                    readme,
                    changelog,
                    json,
                },
                &token,
            )
            .await
        }

        Commands::Versions {
            extension,
            pre_release,
            platform,
            json,
        } => {
            commands::versions::run(
                &client,
                &extension,
                pre_release,
                platform.as_deref(),
                json,
                &token,
            )
            .await
        }

        Commands::Download {
            extension,
            pre_release,
            platform,
            output,
            signature,
            update,
        } => {
            commands::download::run(
                &client,
                &extension,
                commands::download::DownloadOptions {
                    pre_release,
                    platform: platform.as_deref(),
                    output: output.as_deref(),
                    signature,
                    update,
                },
                &token,
            )
            .await
        }

        Commands::Report {
            extension,
            uninstall,
        } => commands::report::run(&client, &extension, uninstall).await,

        Commands::Config { .. } => Ok(()),
    };

    // Flush queued statistics before exiting
    client.close().await;
    result
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(error) = run(cli).await {
        let code = error.exit_code();
        eprintln!("{:?}", miette::Report::new(error));
        std::process::exit(code);
    }
}
