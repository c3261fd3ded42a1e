//! # Repo Sync CLI (`reposync`)
//!
//! The `reposync` binary is the primary interface for Repo Sync. It provides
//! commands for database initialization, repository syncs, and inspecting
//! the stored sync state.
//!
//! ## Usage
//!
//! ```bash
//! reposync --config ./config/reposync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reposync init` | Create the SQLite database and run schema migrations |
//! | `reposync sync <owner/repo>` | Incrementally sync and enrich a repository |
//! | `reposync status <owner/repo>` | Show sync status, counts and recent runs |
//! | `reposync files <owner/repo>` | List stored file records |
//! | `reposync get <owner/repo> <path>` | Print one stored file record as JSON |
//! | `reposync purge <owner/repo> --yes` | Hard-delete every stored file record |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! reposync init
//!
//! # Sync from GitHub using the token of a named account
//! reposync sync acme/app --account work
//!
//! # Sync a local checkout, at most 200 files, skipping lockfiles
//! reposync sync acme/app --local ../app --max-files 200 --skip-types lock,svg
//!
//! # See what would change without writing anything
//! reposync sync acme/app --dry-run
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use repo_sync::progress::ProgressMode;
use repo_sync::sync::SyncRequest;
use repo_sync::{config, get, migrate, stats, sync};
use repo_sync_core::models::FileStatus;

/// Repo Sync CLI: incremental repository sync with AI enrichment.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/reposync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "reposync",
    about = "Repo Sync: incremental repository sync with AI enrichment",
    version,
    long_about = "Repo Sync lists a repository's files, reconciles them against the previous \
    run, enriches only new or changed files with an AI summarizer, and stores the result in a \
    local SQLite sync state store."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/reposync.toml`.
    #[arg(long, global = true, default_value = "./config/reposync.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the repositories, files and
    /// sync_metrics tables. Running it multiple times is safe.
    Init,

    /// Sync one repository.
    ///
    /// Lists the repository, reconciles against stored records, enriches
    /// new and changed files, and commits the result.
    Sync {
        /// Repository as `owner/repo`.
        repo: String,

        /// Account whose token is used (see `[accounts.<id>]`).
        #[arg(long)]
        account: Option<String>,

        /// Cap on the number of listed files (after sorting by path).
        #[arg(long)]
        max_files: Option<usize>,

        /// Extra file extensions to skip, comma separated (e.g. `lock,svg`).
        #[arg(long, value_delimiter = ',')]
        skip_types: Vec<String>,

        /// Read files from a local checkout instead of GitHub.
        #[arg(long)]
        local: Option<PathBuf>,

        /// Reconcile and report counts without enriching or writing.
        #[arg(long)]
        dry_run: bool,

        /// Progress output: `off`, `human` or `json` (stderr).
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Show sync status, file counts and recent runs for a repository.
    Status {
        /// Repository as `owner/repo`.
        repo: String,
    },

    /// List stored file records.
    Files {
        /// Repository as `owner/repo`.
        repo: String,

        /// Only show records with this status (e.g. `active`, `deleted`).
        #[arg(long)]
        status: Option<FileStatus>,
    },

    /// Print one stored file record as JSON.
    Get {
        /// Repository as `owner/repo`.
        repo: String,

        /// Repository-relative file path.
        path: String,
    },

    /// Hard-delete every stored file record of a repository.
    ///
    /// Syncs only soft-delete; this is the only way to remove records.
    Purge {
        /// Repository as `owner/repo`.
        repo: String,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Wait for the next Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancel `token` on the first Ctrl-C or SIGTERM; exit immediately on the second.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("shutdown requested, cancelling sync (press Ctrl-C again to force)");
        token.cancel();

        shutdown_signal().await;
        tracing::warn!("second shutdown signal, exiting");
        std::process::exit(130);
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync {
            repo,
            account,
            max_files,
            skip_types,
            local,
            dry_run,
            progress,
        } => {
            let request = SyncRequest {
                repo,
                account,
                local,
                max_files,
                skip_types,
                dry_run,
            };
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let cancel = CancellationToken::new();
            spawn_signal_handler(cancel.clone());
            sync::run_sync(&cfg, &request, mode, &cancel).await?;
        }
        Commands::Status { repo } => {
            stats::run_status(&cfg, &repo).await?;
        }
        Commands::Files { repo, status } => {
            get::run_files(&cfg, &repo, status).await?;
        }
        Commands::Get { repo, path } => {
            get::run_get(&cfg, &repo, &path).await?;
        }
        Commands::Purge { repo, yes } => {
            get::run_purge(&cfg, &repo, yes).await?;
        }
    }

    Ok(())
}
