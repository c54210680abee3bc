//! Database, tracking table and schema script commands

use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::output::{format_state, OutputFormat};
use crate::{AppContext, Cli};

#[derive(Args)]
pub struct DbArgs {
    #[command(subcommand)]
    pub command: DbCommands,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Create the database
    Create,
    /// Drop the database
    Drop {
        /// Required to confirm the drop
        #[arg(long)]
        force: bool,
    },
    /// Exit with status 0 if the database exists, 1 otherwise
    Exists,
    /// Check that the database accepts connections
    Check,
}

#[derive(Args)]
pub struct TableArgs {
    #[command(subcommand)]
    pub command: TableCommands,
}

#[derive(Subcommand)]
pub enum TableCommands {
    /// Create the tracking table
    Init,
    /// Drop the tracking table, keeping the schema it describes
    Drop {
        /// Required to confirm the drop
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
pub struct ScriptArgs {
    /// Include INSERT statements for table rows
    #[arg(long)]
    pub data: bool,
    /// Write the script to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run_db(args: &DbArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let name = &ctx.config.database;

    match &args.command {
        DbCommands::Create => {
            if ctx.repository.database_exists() {
                anyhow::bail!("Database {} already exists", name);
            }
            ctx.repository.create_database()?;
            println!("Created database {}", name);
        }
        DbCommands::Drop { force } => {
            if !force {
                anyhow::bail!("Refusing to drop database {} without --force", name);
            }
            ctx.repository.drop_database()?;
            println!("Dropped database {}", name);
        }
        DbCommands::Exists => {
            if ctx.repository.database_exists() {
                println!("Database {} exists", name);
            } else {
                println!("Database {} does not exist", name);
                std::process::exit(1);
            }
        }
        DbCommands::Check => {
            if !ctx.repository.check_connection() {
                anyhow::bail!("Cannot connect to database {}", name);
            }
            println!("Connection to {} OK", name);
        }
    }
    Ok(())
}

pub fn run_table(args: &TableArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let table = ctx.repository.table_name();

    match &args.command {
        TableCommands::Init => {
            let state = ctx.repository.init()?;
            match cli.output_format() {
                OutputFormat::Json => println!("{}", format_state(&state, OutputFormat::Json)),
                OutputFormat::Table => println!("Created tracking table {}", table),
            }
        }
        TableCommands::Drop { force } => {
            if !force {
                anyhow::bail!("Refusing to drop tracking table {} without --force", table);
            }
            ctx.repository.drop_migration_table()?;
            println!("Dropped tracking table {}", table);
        }
    }
    Ok(())
}

pub fn run_script(args: &ScriptArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let script = ctx.repository.generate_sql_script(args.data)?;

    match &args.output {
        Some(path) => {
            fs::write(path, &script)?;
            tracing::info!("Wrote schema script to {}", path.display());
        }
        None => println!("{}", script),
    }
    Ok(())
}
