use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::error::StoreError;
use crate::notify::{Level, Notifier};

pub mod commands;
mod render;
mod rows;

use self::commands::{
    AuthCommand, BudgetCommand, CategoryCommand, EventCommand, ExpenseCommand,
    InvestmentCommand, NoteCommand, ReferenceCommand, ReportCommand, TodoCommand,
};

#[derive(Parser, Debug)]
#[command(
    name = "lifeboard",
    version,
    about = "Notes, todos, calendar, references and personal finances in one place"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file location (takes precedence over LIFEBOARD_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over LIFEBOARD_DATA)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign up, sign in and out
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Free-form notes with optional categories
    #[command(subcommand)]
    Note(NoteCommand),
    /// Todo items with optional due dates
    #[command(subcommand)]
    Todo(TodoCommand),
    /// Calendar events
    #[command(subcommand)]
    Event(EventCommand),
    /// Saved links
    #[command(subcommand)]
    Ref(ReferenceCommand),
    /// Expenses
    #[command(subcommand)]
    Expense(ExpenseCommand),
    /// Investment purchase lots
    #[command(subcommand)]
    Invest(InvestmentCommand),
    /// Monthly budget lines
    #[command(subcommand)]
    Budget(BudgetCommand),
    /// Expense and note categories
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Summaries over the stored data
    #[command(subcommand)]
    Report(ReportCommand),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let app = App::new(Arc::new(config), loader.paths())?;

    let outcome = commands::dispatch(&app, cli.command);
    flush_notifications(app.notifier());
    let output = outcome?;
    print!("{output}");
    Ok(())
}

/// Whether the error was already shown to the user as a notification.
pub fn already_reported(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::Validation(_) | StoreError::Remote { .. })
    )
}

/// Status messages go to stderr so stdout stays parseable.
fn flush_notifications(notifier: &Notifier) {
    for notification in notifier.drain() {
        match notification.level {
            Level::Info => eprintln!("{}", notification.message),
            Level::Error => eprintln!("error: {}", notification.message),
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err))
    })
    .map(|_| ())
}
