//! Shale CLI - Command line interface for the migration engine

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{completions, database, migrate, scaffold};
use config::{Config, CONFIG_FILE};
use output::OutputFormat;
use shale_storage::{Repository, SqliteDialect};

#[derive(Parser)]
#[command(name = "shale")]
#[command(author, version, about = "Versioned schema migrations for SQL databases")]
pub struct Cli {
    /// Config file
    #[arg(short, long, env = "SHALE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Database to migrate (overrides the config file)
    #[arg(short, long, env = "SHALE_DATABASE", global = true)]
    pub database: Option<String>,

    /// Migrations directory (overrides the config file)
    #[arg(short, long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Tracking table name (overrides the config file)
    #[arg(short, long, global = true)]
    pub table: Option<String>,

    /// Output format: table, json
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::from(self.format.as_str())
    }

    /// Config file contents with command line overrides applied
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(&self.config_path())?;
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(dir) = &self.migrations_dir {
            config.migrations_dir = dir.clone();
        }
        if let Some(table) = &self.table {
            config.table_name = table.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the state of every migration
    Status,
    /// Apply pending migrations (next one only by default)
    Up(migrate::UpArgs),
    /// Revert applied migrations (last one only by default)
    Down(migrate::DownArgs),
    /// Apply a single migration
    Apply {
        /// Migration version
        version: String,
    },
    /// Revert a single migration
    Revert {
        /// Migration version
        version: String,
    },
    /// Record a migration as applied without running it
    Mark {
        /// Migration version
        version: String,
    },
    /// Create empty up/down scripts for a new migration
    New(scaffold::NewArgs),
    /// Manage the target database
    Db(database::DbArgs),
    /// Manage the tracking table
    Table(database::TableArgs),
    /// Print a SQL script of the current schema
    Script(database::ScriptArgs),
    /// Manage the config file
    Config(commands::config::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Application context with the migration repository
pub struct AppContext {
    pub config: Config,
    pub repository: Repository<SqliteDialect>,
}

impl AppContext {
    pub fn new(cli: &Cli) -> anyhow::Result<Self> {
        let config = cli.load_config()?;
        if config.dialect != "sqlite" {
            anyhow::bail!(
                "Unsupported dialect '{}'; this build supports: sqlite",
                config.dialect
            );
        }

        tracing::debug!(
            "Using database {} with migrations from {}",
            config.database,
            config.migrations_dir.display()
        );

        let dialect = SqliteDialect::new(&config.database);
        let repository = Repository::new(dialect, config.repository_config())?;

        Ok(Self { config, repository })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting shale CLI");

    // Commands that never touch the database
    match &cli.command {
        Commands::Config(args) => return commands::config::run(args, &cli),
        Commands::Completions(args) => return completions::run(args),
        Commands::New(args) => return scaffold::run(args, &cli),
        _ => {}
    }

    let ctx = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Status => migrate::status(&cli, &ctx)?,
        Commands::Up(args) => migrate::up(args, &cli, &ctx)?,
        Commands::Down(args) => migrate::down(args, &cli, &ctx)?,
        Commands::Apply { version } => migrate::apply(version, &cli, &ctx)?,
        Commands::Revert { version } => migrate::revert(version, &cli, &ctx)?,
        Commands::Mark { version } => migrate::mark(version, &cli, &ctx)?,
        Commands::Db(args) => database::run_db(args, &ctx)?,
        Commands::Table(args) => database::run_table(args, &cli, &ctx)?,
        Commands::Script(args) => database::run_script(args, &ctx)?,
        Commands::New(_) | Commands::Config(_) | Commands::Completions(_) => {}
    }

    Ok(())
}
