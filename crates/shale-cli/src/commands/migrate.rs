//! Migration commands: status, up, down, apply, revert, mark

use clap::Args;

use crate::output::{format_state, OutputFormat};
use crate::{AppContext, Cli};
use shale_core::{Migration, MigrationSet, Version};

#[derive(Args)]
pub struct UpArgs {
    /// Apply pending migrations up to and including this version
    #[arg(long, conflicts_with = "all")]
    pub to: Option<String>,
    /// Apply every pending migration
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct DownArgs {
    /// Revert applied migrations newer than this version
    #[arg(long, conflicts_with = "all")]
    pub to: Option<String>,
    /// Revert every applied migration
    #[arg(long)]
    pub all: bool,
}

pub fn status(cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let state = ctx.repository.get_state()?;
    println!("{}", format_state(&state, cli.output_format()));
    Ok(())
}

pub fn up(args: &UpArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let before = ctx.repository.get_state()?;

    let target = match (&args.to, args.all) {
        (Some(to), _) => Some(Version::new(to.as_str())?),
        (None, true) => None,
        (None, false) => match before.next_pending() {
            Some(next) => Some(next.version().clone()),
            None => {
                report(&before, &before, cli);
                return Ok(());
            }
        },
    };

    let after = ctx.repository.migrate_up(target.as_ref())?;
    report(&before, &after, cli);
    Ok(())
}

pub fn down(args: &DownArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let before = ctx.repository.get_state()?;

    let target = match (&args.to, args.all) {
        (Some(to), _) => Some(Version::new(to.as_str())?),
        (None, true) => None,
        (None, false) => {
            let applied = before.applied();
            if applied.is_empty() {
                report(&before, &before, cli);
                return Ok(());
            }
            // Keep everything up to the second newest applied migration
            applied
                .len()
                .checked_sub(2)
                .map(|i| applied[i].version().clone())
        }
    };

    let after = ctx.repository.migrate_down(target.as_ref())?;
    report(&before, &after, cli);
    Ok(())
}

pub fn apply(version: &str, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let before = ctx.repository.get_state()?;
    let migration = find(&before, version)?;
    if before.status(migration.version()).is_some_and(|s| s.is_applied()) {
        anyhow::bail!("Migration {} is already applied", migration.version());
    }

    let after = ctx.repository.execute_up(migration)?;
    report(&before, &after, cli);
    Ok(())
}

pub fn revert(version: &str, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let before = ctx.repository.get_state()?;
    let migration = find(&before, version)?;
    if !before.status(migration.version()).is_some_and(|s| s.is_applied()) {
        anyhow::bail!("Migration {} is not applied", migration.version());
    }

    let after = ctx.repository.execute_down(migration)?;
    report(&before, &after, cli);
    Ok(())
}

pub fn mark(version: &str, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let before = ctx.repository.get_state()?;
    let migration = find(&before, version)?;

    let after = ctx.repository.record_migration(migration)?;
    match cli.output_format() {
        OutputFormat::Json => println!("{}", format_state(&after, OutputFormat::Json)),
        OutputFormat::Table if !cli.quiet => println!(
            "Recorded {} {} without running it",
            migration.version(),
            migration.name()
        ),
        OutputFormat::Table => {}
    }
    Ok(())
}

fn find<'a>(state: &'a MigrationSet, version: &str) -> anyhow::Result<&'a Migration> {
    let version = Version::new(version)?;
    state
        .get(&version)
        .ok_or_else(|| anyhow::anyhow!("Unknown migration version: {}", version))
}

/// Print what changed between two states
fn report(before: &MigrationSet, after: &MigrationSet, cli: &Cli) {
    if cli.output_format() == OutputFormat::Json {
        println!("{}", format_state(after, OutputFormat::Json));
        return;
    }
    if cli.quiet {
        return;
    }

    let is_applied = |state: &MigrationSet, m: &Migration| {
        state.status(m.version()).is_some_and(|s| s.is_applied())
    };

    let mut changed = 0;
    for migration in after.migrations() {
        let was = is_applied(before, migration);
        let now = is_applied(after, migration);
        if was != now {
            let verb = if now { "Applied" } else { "Reverted" };
            println!("{} {} {}", verb, migration.version(), migration.name());
            changed += 1;
        }
    }

    if changed == 0 {
        println!("Nothing to do");
    }
}
