//! `shale new`: scaffold an empty migration

use std::fs;

use chrono::Utc;
use clap::Args;

use crate::Cli;
use shale_core::source::{down_file_name, up_file_name};
use shale_core::Version;

#[derive(Args)]
pub struct NewArgs {
    /// Short description, used in the file names
    pub name: String,
    /// Use this version instead of the current UTC timestamp
    #[arg(long)]
    pub version: Option<String>,
}

pub fn run(args: &NewArgs, cli: &Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;

    let version = match &args.version {
        Some(v) => Version::new(v.as_str())?,
        None => Version::new(Utc::now().format("%Y%m%d%H%M%S").to_string())?,
    };
    let name = sanitize_name(&args.name);

    let dir = &config.migrations_dir;
    fs::create_dir_all(dir)?;

    let up = dir.join(up_file_name(&version, &name));
    let down = dir.join(down_file_name(&version, &name));
    for path in [&up, &down] {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
    }

    fs::write(&up, format!("-- {} {}: up\n", version, name))?;
    fs::write(&down, format!("-- {} {}: down\n", version, name))?;
    tracing::info!("Scaffolded migration {} in {}", version, dir.display());

    if !cli.quiet {
        println!("Created {}", up.display());
        println!("Created {}", down.display());
    }
    Ok(())
}

/// Lowercase, with runs of anything but ASCII alphanumerics collapsed to `_`
fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Create Users"), "create_users");
        assert_eq!(sanitize_name("  add--index! "), "add_index");
        assert_eq!(sanitize_name("v2_posts"), "v2_posts");
        assert_eq!(sanitize_name("!!!"), "");
    }
}
