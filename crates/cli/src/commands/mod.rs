//! Subcommand implementations

pub mod health;
pub mod plan;
pub mod status;
