//! Subcommand implementations.

pub mod cache;
pub mod extract;
pub mod identify;
