//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Strata - schema migrations for Rust applications
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "Strata - schema migrations for Rust applications", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect changes and create a migration file
    Add(AddArgs),

    /// Apply pending migration files
    Apply(ApplyArgs),

    /// Revert the most recently applied migration
    Revert,

    /// Show applied, pending, and undetected changes
    Status,

    /// Create a migration file without ever executing it
    Generate(AddArgs),

    /// Create a migration file allowing destructive changes
    Force(AddArgs),
}

/// Arguments for commands that create a migration file
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Name for the migration
    pub name: String,
}

/// Arguments for the `apply` command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Unattended mode: refuse destructive or review-required changes
    #[arg(long, conflicts_with = "force")]
    pub auto: bool,

    /// Apply everything, destructive changes included
    #[arg(long)]
    pub force: bool,
}
