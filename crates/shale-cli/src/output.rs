//! Output formatting utilities

use serde::Serialize;
use shale_core::{MigrationSet, MigrationStatus};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Pretty JSON for any serializable value
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// Render the reconciled state
pub fn format_state(state: &MigrationSet, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(state),
        OutputFormat::Table => state_table(state),
    }
}

fn state_table(state: &MigrationSet) -> String {
    if state.is_empty() && state.orphaned().is_empty() {
        return "No migrations found".to_string();
    }

    let width = state
        .migrations()
        .iter()
        .map(|m| m.version().as_str().len())
        .max()
        .unwrap_or(0);

    let mut lines = vec![format!(
        "Migrations ({} total, {} applied, {} pending, {} drifted):",
        state.len(),
        state.applied().len(),
        state.pending().len(),
        state.drifted().len()
    )];

    for entry in state.entries() {
        let mut line = format!(
            "  {:<9} {:<width$}  {}",
            format!("[{}]", entry.status.label()),
            entry.version.as_str(),
            entry.name,
            width = width
        );
        if let MigrationStatus::Drifted { recorded } = &entry.status {
            line.push_str(&format!(
                "  (recorded {}, current {})",
                short_hash(recorded),
                short_hash(entry.hash)
            ));
        }
        lines.push(line.trim_end().to_string());
    }

    let orphans = state.orphaned();
    if !orphans.is_empty() {
        let list: Vec<&str> = orphans.iter().map(|v| v.as_str()).collect();
        lines.push(String::new());
        lines.push(format!(
            "Applied but missing on disk: {}",
            list.join(", ")
        ));
    }

    lines.join("\n")
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
