// ABOUTME: CLI entry point for bluespice-farm
// ABOUTME: Parses commands and routes to appropriate handlers

use bluespice_farm::commands::{self, DeployProfile};
use bluespice_farm::commands::oauth::OauthPrefill;
use bluespice_farm::config::FarmConfig;
use bluespice_farm::dump::ImportOptions;
use bluespice_farm::wizard::InitPrefill;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bluespice-farm")]
#[command(about = "Deploy and maintain farms of BlueSpice MediaWiki instances", long_about = None)]
struct Cli {
    /// Path to farm.toml (defaults to ./farm.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the shared services stack (database, search, cache, proxy)
    Services {
        #[command(subcommand)]
        command: ServicesCommands,
    },
    /// Initialize a new wiki instance (interactive wizard)
    Init {
        /// Wiki name (skips the prompt)
        #[arg(long)]
        wiki_name: Option<String>,
        /// Display title (skips the prompt)
        #[arg(long)]
        sitename: Option<String>,
        /// Public domain (skips the prompt)
        #[arg(long)]
        domain: Option<String>,
        /// Content language code (skips the prompt)
        #[arg(long)]
        language: Option<String>,
        /// Administrator email (skips the prompt)
        #[arg(long)]
        admin_mail: Option<String>,
        /// Skip confirmation and optional prompts
        #[arg(short = 'y', long)]
        yes: bool,
        /// Write state files but do not deploy
        #[arg(long)]
        no_deploy: bool,
    },
    /// Deploy (or resume deploying) an initialized wiki
    Deploy {
        #[arg(long)]
        wiki_name: String,
        /// Deployment profile
        #[arg(long, value_enum, default_value = "fresh")]
        profile: DeployProfile,
        /// Discard the deploy checkpoint and force a reinstall
        #[arg(long)]
        fresh_install: bool,
    },
    /// Import a legacy SQL dump into a wiki's database
    ImportDb {
        #[arg(long)]
        wiki_name: String,
        /// Dump file (.sql, .sql.gz, .sql.bz2, or .sql.xz)
        #[arg(long)]
        dump: PathBuf,
        /// Accept prefix removal without prompting
        #[arg(short = 'y', long)]
        yes: bool,
        /// Keep a detected table prefix without prompting
        #[arg(long, conflicts_with = "yes")]
        keep_prefix: bool,
        /// Disable the decompression progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Import a zip archive of media files into a wiki
    ImportImages {
        #[arg(long)]
        wiki_name: String,
        #[arg(long)]
        images_archive: PathBuf,
    },
    /// Install OpenID Connect login extensions for a wiki
    InstallOauth {
        #[arg(long)]
        wiki_name: String,
        /// OIDC provider URL (skips the prompt)
        #[arg(long)]
        provider_url: Option<String>,
        /// OIDC client ID (skips the prompt)
        #[arg(long)]
        client_id: Option<String>,
        /// OIDC client secret (skips the prompt)
        #[arg(long)]
        client_secret: Option<String>,
        /// MediaWiki release branch for the extension tarballs
        #[arg(long)]
        branch: Option<String>,
    },
}

#[derive(Subcommand)]
enum ServicesCommands {
    /// Start the shared services and bootstrap credentials
    Up,
    /// Show the state of every shared service container
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Sweep working directories left behind by killed runs (24h threshold)
    if let Err(e) = bluespice_farm::utils::cleanup_stale_temp_dirs(86_400) {
        tracing::warn!("Stale temp dir sweep failed: {:#}", e);
    }

    let cli = Cli::parse();
    let farm = FarmConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Services { command } => match command {
            ServicesCommands::Up => commands::services_up(&farm).await,
            ServicesCommands::Status => commands::services_status(&farm).await,
        },
        Commands::Init {
            wiki_name,
            sitename,
            domain,
            language,
            admin_mail,
            yes,
            no_deploy,
        } => {
            let prefill = InitPrefill {
                wiki_name,
                sitename,
                domain,
                language,
                admin_mail,
                assume_yes: yes,
            };
            commands::init(&farm, prefill, no_deploy).await
        }
        Commands::Deploy {
            wiki_name,
            profile,
            fresh_install,
        } => commands::deploy(&farm, &wiki_name, profile, fresh_install).await,
        Commands::ImportDb {
            wiki_name,
            dump,
            yes,
            keep_prefix,
            no_progress,
        } => {
            let options = ImportOptions {
                assume_yes: yes,
                keep_prefix,
                show_progress: !no_progress,
            };
            commands::import_db(&farm, &wiki_name, &dump, options).await
        }
        Commands::ImportImages {
            wiki_name,
            images_archive,
        } => commands::import_images(&farm, &wiki_name, &images_archive).await,
        Commands::InstallOauth {
            wiki_name,
            provider_url,
            client_id,
            client_secret,
            branch,
        } => {
            let prefill = OauthPrefill {
                provider_url,
                client_id,
                client_secret,
                branch,
            };
            commands::install_oauth(&farm, &wiki_name, prefill).await
        }
    }
}
