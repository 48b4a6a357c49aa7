//! Operator entry point for the residency registry.
//!
//! # Responsibility
//! - Initialize or migrate a registry database file.
//! - Trigger the daily reconciliation passes from an external scheduler.
//! - Report invariant violations and household history for operators.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use log::error;
use residency_core::{
    check_invariants, default_log_level, init_logging, open_db, DbError, LifecycleError,
    LoggingError, ReconcileService, RegistryService, RepoError,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "residency",
    about = "Maintain a residency registry database",
    version
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Registry database file
    #[arg(long, env = "RESIDENCY_DB", default_value = "residency.sqlite3")]
    db: PathBuf,
    /// Log level (trace|debug|info|warn|error)
    #[arg(long, env = "RESIDENCY_LOG_LEVEL")]
    log_level: Option<String>,
    /// Absolute directory for rotating log files; logging is off when unset
    #[arg(long, env = "RESIDENCY_LOG_DIR")]
    log_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database or apply pending migrations
    Init,
    /// Run the expired-membership sweep and the absence reversion
    Reconcile(ReconcileArgs),
    /// Report household head and membership invariant violations
    Check,
    /// Print the change history of one household
    History(HistoryArgs),
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Reference date (YYYY-MM-DD); defaults to the local date
    #[arg(long)]
    today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// Household id
    household_id: Uuid,
}

#[derive(Debug)]
enum CliError {
    Logging(LoggingError),
    Db(DbError),
    Repo(RepoError),
    Lifecycle(LifecycleError),
    /// Command ran but found problems to report.
    Failed(String),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logging(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "database: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Lifecycle(err) => write!(f, "{err}"),
            Self::Failed(message) => write!(f, "{message}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Logging(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Lifecycle(err) => Some(err),
            Self::Failed(_) => None,
        }
    }
}

impl From<LoggingError> for CliError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for CliError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<LifecycleError> for CliError {
    fn from(value: LifecycleError) -> Self {
        Self::Lifecycle(value)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_exit module=cli status=error error={}", err);
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Some(log_dir) = cli.global.log_dir.as_deref() {
        let level = cli
            .global
            .log_level
            .as_deref()
            .unwrap_or_else(|| default_log_level());
        init_logging(level, log_dir)?;
    }

    let mut conn = open_db(&cli.global.db)?;
    match cli.command {
        Command::Init => {
            let version = residency_core::db::migrations::current_user_version(&conn)?;
            println!(
                "registry ready at {} (schema version {version})",
                cli.global.db.display()
            );
            Ok(())
        }
        Command::Reconcile(args) => {
            let today = args
                .today
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            let report = ReconcileService::new(&mut conn).run_daily(today);
            match &report.sweep {
                Ok(sweep) => println!(
                    "sweep: purged {} persons, {} memberships",
                    sweep.purged_persons.len(),
                    sweep.purged_memberships
                ),
                Err(err) => eprintln!("sweep failed: {err}"),
            }
            match &report.reversion {
                Ok(reversion) => println!(
                    "reversion: expired {} records, reverted {} persons",
                    reversion.expired_records,
                    reversion.reverted_persons.len()
                ),
                Err(err) => eprintln!("reversion failed: {err}"),
            }
            if report.is_ok() {
                Ok(())
            } else {
                Err(CliError::Failed(format!("reconciliation for {today} incomplete")))
            }
        }
        Command::Check => {
            let violations = check_invariants(&conn)?;
            for violation in &violations {
                println!("{violation}");
            }
            if violations.is_empty() {
                println!("no invariant violations");
                Ok(())
            } else {
                Err(CliError::Failed(format!(
                    "{} invariant violation(s)",
                    violations.len()
                )))
            }
        }
        Command::History(args) => {
            let events = RegistryService::new(&mut conn).household_history(args.household_id)?;
            for event in events {
                println!(
                    "{}\t{}\t{}\t{} -> {}\t{}\t{}",
                    event.changed_at,
                    event.event_type.as_str(),
                    event.field_changed.as_deref().unwrap_or("-"),
                    event.old_value.as_deref().unwrap_or("null"),
                    event.new_value.as_deref().unwrap_or("null"),
                    event.changed_by.as_deref().unwrap_or("-"),
                    event.note.as_deref().unwrap_or(""),
                );
            }
            Ok(())
        }
    }
}
