//! CLI command implementations

pub mod completions;
pub mod config;
pub mod database;
pub mod migrate;
pub mod scaffold;
