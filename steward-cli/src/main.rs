mod output;
mod prompt;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use steward_core::config::{CliOverrides, StewardConfig};
use steward_core::error::StewardError;
use steward_core::{BackupOptions, Scenario, StatusReport, Steward};

#[derive(Parser)]
#[command(
    name = "steward",
    about = "Lifecycle operations for the organization database",
    version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_HASH"), " ", env!("BUILD_TIME"), ")"
    ),
    propagate_version = true
)]
struct Cli {
    /// Config file path
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<String>,

    /// Database URL (overrides DATABASE_URL and config)
    #[arg(long, value_name = "URL", global = true)]
    url: Option<String>,

    /// SSL/TLS mode: disable, prefer, require
    #[arg(long, value_name = "MODE", global = true)]
    ssl_mode: Option<String>,

    /// Connection timeout in seconds (default: 30, 0 = no timeout)
    #[arg(long, value_name = "SECS", global = true)]
    connect_timeout: Option<u32>,

    /// Migration locations, comma-separated (overrides config)
    #[arg(long, value_name = "PATHS", global = true)]
    locations: Option<String>,

    /// Backup directory (overrides config)
    #[arg(long, value_name = "DIR", global = true)]
    backup_dir: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable verbose/debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create managed schemas and apply all migrations
    InitDb,

    /// Inspect or advance the migration chain
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },

    /// Populate reference data
    SeedData {
        /// Scenario to run: basic or complete
        #[arg(long, value_name = "NAME", default_value = "basic")]
        scenario: String,

        /// Add the extended organizational structure
        #[arg(long)]
        extended_org: bool,
    },

    /// Show connectivity and migration position (never fails)
    Status {
        /// Include per-entity row counts and the latest backup
        #[arg(long)]
        detailed: bool,
    },

    /// Dump the database to a backup artifact
    Backup {
        /// Gzip the artifact
        #[arg(long)]
        compress: bool,

        /// Schema only, without data
        #[arg(long)]
        no_data: bool,

        /// Write to this path instead of the backup directory
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Replay a backup artifact into the database
    Restore {
        /// Artifact to restore
        path: PathBuf,
    },

    /// Drop and recreate every managed schema (destructive)
    ResetDb {
        /// Skip the interactive confirmation
        #[arg(long)]
        force: bool,

        /// Re-run initialization and the default seed afterwards
        #[arg(long)]
        reinit: bool,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending revisions
    Upgrade,

    /// Show the revision applied to the database
    Current,

    /// List revisions from root to head
    History,

    /// Create a new empty revision parented at head
    Revision {
        /// What the revision does
        #[arg(short, long, value_name = "TEXT")]
        message: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let dotenv = dotenvy::dotenv();

    // Set up logging (suppress when JSON output is requested)
    let filter = if cli.json {
        "error"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .without_time()
        .init();

    if let Err(e) = dotenv {
        if !e.not_found() {
            tracing::warn!(error = %e, "Ignoring unreadable .env file");
        }
    }

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            print_error(&e);
            exit_code(&e)
        }
    };

    process::exit(code);
}

/// Map error types to differentiated exit codes.
fn exit_code(error: &StewardError) -> i32 {
    match error {
        StewardError::ConfigError(_) => 2,
        StewardError::ValidationError(_) | StewardError::UnknownScenario(_) => 3,
        StewardError::DatabaseError(_) => 4,
        StewardError::MigrationFailed { .. } | StewardError::BrokenChain(_) => 5,
        StewardError::LockError(_) => 6,
        StewardError::BackupError(_) | StewardError::BackupToolFailed { .. } => 7,
        StewardError::RestoreError { .. } | StewardError::RestoreToolFailed { .. } => 8,
        StewardError::SeedFailed { .. } => 9,
        StewardError::WipeFailed(_) => 10,
        StewardError::IoError(_) => 1,
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("{} failed to serialize output: {}", "ERROR:".red().bold(), e),
    }
}

async fn run(cli: Cli) -> Result<(), StewardError> {
    let json_output = cli.json;

    let overrides = CliOverrides {
        url: cli.url,
        ssl_mode: cli.ssl_mode,
        connect_timeout: cli.connect_timeout,
        locations: cli.locations.map(|l| {
            l.split(',')
                .map(|s| PathBuf::from(s.trim()))
                .filter(|p| !p.as_os_str().is_empty())
                .collect()
        }),
        backup_dir: cli.backup_dir,
    };

    // Status reports configuration problems instead of failing
    if let Commands::Status { detailed } = cli.command {
        let (report, target) = match StewardConfig::load(cli.config.as_deref(), &overrides)
            .and_then(Steward::new)
        {
            Ok(steward) => (
                steward.status(detailed).await,
                Some(steward.descriptor().to_string()),
            ),
            Err(e) => (StatusReport::disconnected(e.to_string()), None),
        };
        if json_output {
            print_json(&report);
        } else {
            output::print_status(&report, target.as_deref());
        }
        return Ok(());
    }

    let config = StewardConfig::load(cli.config.as_deref(), &overrides)?;
    let steward = Steward::new(config)?;

    match cli.command {
        Commands::InitDb => {
            let report = steward.init_db().await?;
            if json_output {
                print_json(&report);
            } else {
                output::print_init_report(&report);
            }
        }
        Commands::Migrate { action } => match action {
            MigrateAction::Upgrade => {
                let report = steward.upgrade().await?;
                if json_output {
                    print_json(&report);
                } else {
                    output::print_upgrade_summary(&report);
                }
            }
            MigrateAction::Current => {
                let current = steward.current().await?;
                if json_output {
                    print_json(&serde_json::json!({ "current": current }));
                } else {
                    output::print_current(current.as_ref());
                }
            }
            MigrateAction::History => {
                let chain = steward.history().await?;
                let current = steward.current().await?;
                if json_output {
                    print_json(&serde_json::json!({ "current": current, "revisions": chain }));
                } else {
                    output::print_history(&chain, current.as_ref());
                }
            }
            MigrateAction::Revision { message } => {
                let created = steward
                    .new_revision(message.as_deref().unwrap_or_default())
                    .await?;
                if json_output {
                    print_json(&created);
                } else {
                    output::print_new_revision(&created);
                }
            }
        },
        Commands::SeedData {
            scenario,
            extended_org,
        } => {
            let scenario: Scenario = scenario.parse()?;
            let summary = steward.seed(scenario, extended_org).await?;
            if json_output {
                print_json(&summary);
            } else {
                output::print_seed_summary(&summary);
            }
        }
        Commands::Status { .. } => {}
        Commands::Backup {
            compress,
            no_data,
            output: out,
        } => {
            let artifact = steward
                .backup(&BackupOptions {
                    include_data: !no_data,
                    compress,
                    output: out,
                })
                .await?;
            if json_output {
                print_json(&artifact);
            } else {
                output::print_backup(&artifact);
            }
        }
        Commands::Restore { path } => {
            let report = steward.restore(&path).await?;
            if json_output {
                print_json(&report);
            } else {
                output::print_restore(&report);
            }
        }
        Commands::ResetDb { force, reinit } => {
            let report = steward
                .reset(prompt::confirmation_source(force), reinit)
                .await?;
            if json_output {
                print_json(&report);
            } else {
                output::print_reset(&report);
            }
        }
    }

    Ok(())
}

fn print_error(error: &StewardError) {
    eprintln!("{} {}", "ERROR:".red().bold(), error);

    // Provide actionable guidance
    match error {
        StewardError::ConfigError(_) => {
            eprintln!(
                "{}",
                "Hint: Set DATABASE_URL (environment or .env), pass --url, or check steward.toml."
                    .dimmed()
            );
        }
        StewardError::DatabaseError(_) => {
            eprintln!(
                "{}",
                "Hint: Verify the database is running and connection details are correct. 'steward status' reports connectivity."
                    .dimmed()
            );
        }
        StewardError::MigrationFailed { .. } => {
            eprintln!(
                "{}",
                "Hint: Fix the failing delta and rerun 'steward migrate upgrade'; applied revisions are kept."
                    .dimmed()
            );
        }
        StewardError::BrokenChain(_) => {
            eprintln!(
                "{}",
                "Hint: Check the '-- steward:parent' headers and revision numbers of the delta files."
                    .dimmed()
            );
        }
        StewardError::UnknownScenario(_) => {
            eprintln!("{}", "Hint: Use --scenario basic or --scenario complete.".dimmed());
        }
        StewardError::BackupToolFailed { .. } | StewardError::RestoreToolFailed { .. } => {
            eprintln!(
                "{}",
                "Hint: Check that pg_dump/psql are installed and match the server version.".dimmed()
            );
        }
        StewardError::WipeFailed(_) => {
            eprintln!(
                "{}",
                "Hint: The database may be partially wiped. Restore a backup or rerun 'steward reset-db --force --reinit'."
                    .dimmed()
            );
        }
        _ => {}
    }
}
