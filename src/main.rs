//! syncops - deploy and sync web projects over SSH.
//!
//! Usage:
//!   syncops project-deploy production --composer --migrate
//!   syncops project-pull staging --no-merge
//!   syncops db-pull production --no-import
//!   syncops validate --connect

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;

use syncops::backup::BackupOptions;
use syncops::config::Settings;
use syncops::db::DbPullOptions;
use syncops::deploy::DeployOptions;
use syncops::error::Result;
use syncops::media::MediaPullOptions;
use syncops::project::PullOptions;
use syncops::{commands, console};

#[derive(Parser)]
#[command(name = "syncops", version)]
#[command(about = "Deploy and sync web projects over SSH", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $SYNCOPS_CONFIG, then ./syncops.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the project to a remote server
    ProjectDeploy {
        server: String,
        /// Skip maintenance mode and cache flushes
        #[arg(long)]
        fast: bool,
        /// Force `composer install`
        #[arg(long)]
        composer: bool,
        /// Run database migrations
        #[arg(long)]
        migrate: bool,
        /// Prefix ownership and maintenance commands with sudo
        #[arg(long)]
        sudo: bool,
        /// Push target overriding `project.branch_prod`
        #[arg(long)]
        branch: Option<String>,
    },

    /// Commit changes made on the server and bring them into the local project
    ProjectPull {
        server: String,
        /// Push the server commit without merging it locally
        #[arg(long)]
        no_merge: bool,
        /// Run `git pull` on the server before pushing
        #[arg(long)]
        pull: bool,
        /// Commit message for the server changes
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Commit and push local changes
    ProjectPush {
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Dump the remote database and import it locally
    DbPull {
        server: String,
        /// Keep the dump file instead of importing it
        #[arg(long)]
        no_import: bool,
    },

    /// Download remote media files into storage/app
    MediaPull {
        server: String,
        /// Keep files that already exist locally
        #[arg(long)]
        no_overwrite: bool,
    },

    /// Archive the local project into a tar.gz file
    ProjectBackup {
        /// Destination folder, relative to the project root
        #[arg(long)]
        folder: Option<String>,
        /// strftime format for the archive name
        #[arg(long)]
        timestamp: Option<String>,
        /// Additional comma-separated paths to exclude
        #[arg(long)]
        exclude: Option<String>,
    },

    /// Run `php artisan` on a remote server
    RemoteArtisan {
        server: String,
        /// Arguments passed to artisan
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Check the runtime, database client and project on a remote server
    RemoteHealth {
        server: String,
        /// Include PHP modules and a database connectivity check
        #[arg(long)]
        full: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the configuration file
    Validate {
        /// Only validate this server
        #[arg(long)]
        server: Option<String>,
        /// Also open SSH and SFTP sessions
        #[arg(long)]
        connect: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            console::failure(format!("failed to start async runtime: {e}"));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("command failed: {e:?}");
            console::failure(e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();
    let load = || Settings::load(config).map(|(settings, _)| settings);

    match cli.command {
        Commands::ProjectDeploy {
            server,
            fast,
            composer,
            migrate,
            sudo,
            branch,
        } => {
            let options = DeployOptions {
                fast,
                composer,
                migrate,
                sudo,
                branch,
            };
            commands::project_deploy(&load()?, &server, options).await
        }
        Commands::ProjectPull {
            server,
            no_merge,
            pull,
            message,
        } => {
            let options = PullOptions {
                no_merge,
                pull,
                message,
            };
            commands::project_pull(&load()?, &server, options).await
        }
        Commands::ProjectPush { message } => {
            let settings = Settings::load_optional(config)?;
            commands::project_push(&settings, message.as_deref()).await
        }
        Commands::DbPull { server, no_import } => {
            commands::db_pull(&load()?, &server, DbPullOptions { no_import }).await
        }
        Commands::MediaPull {
            server,
            no_overwrite,
        } => commands::media_pull(&load()?, &server, MediaPullOptions { no_overwrite }).await,
        Commands::ProjectBackup {
            folder,
            timestamp,
            exclude,
        } => {
            let settings = Settings::load_optional(config)?;
            let options = BackupOptions {
                folder,
                timestamp,
                exclude,
            };
            commands::project_backup(&settings, options).await
        }
        Commands::RemoteArtisan { server, args } => {
            commands::remote_artisan(&load()?, &server, &args).await
        }
        Commands::RemoteHealth { server, full, json } => {
            commands::remote_health(&load()?, &server, full, json).await
        }
        Commands::Validate { server, connect } => {
            let (settings, origin) = Settings::load(config)?;
            commands::validate(&settings, &origin, server.as_deref(), connect).await
        }
    }
}
