//! # strata-cli
//!
//! The command-line surface of the Strata migration engine.
//!
//! Models are registered in application code, so this crate ships as a
//! library: the embedding application builds a [`Migrator`] with its own
//! entities and hands it to [`run`] from its `main`:
//!
//! ```rust,ignore
//! use clap::Parser;
//! use strata_cli::{cli::Cli, run};
//!
//! #[tokio::main]
//! async fn main() {
//!     let cli = Cli::parse();
//!     let mut migrator = /* build migrator, register models */;
//!
//!     if let Err(e) = run(&cli, &migrator).await {
//!         strata_cli::output::error(&e.to_string());
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod output;

use cli::{Cli, Command};
use error::CliResult;
use strata_migrate::{MigrationMode, Migrator};

/// Execute one CLI command against a fully wired migrator.
///
/// Progress goes to standard output; the caller turns an `Err` into a
/// non-zero process exit.
pub async fn run(cli: &Cli, migrator: &Migrator) -> CliResult<()> {
    match &cli.command {
        Command::Add(args) => add(migrator, &args.name, MigrationMode::Interactive).await,
        Command::Generate(args) => add(migrator, &args.name, MigrationMode::GenerateOnly).await,
        Command::Force(args) => add(migrator, &args.name, MigrationMode::ForceDestructive).await,
        Command::Apply(args) => {
            let mode = if args.auto {
                MigrationMode::Automatic
            } else if args.force {
                MigrationMode::ForceDestructive
            } else {
                MigrationMode::Interactive
            };
            apply(migrator, mode).await
        }
        Command::Revert => revert(migrator).await,
        Command::Status => status(migrator).await,
    }
}

async fn add(migrator: &Migrator, name: &str, mode: MigrationMode) -> CliResult<()> {
    output::header("Add Migration");
    migrator.initialize().await?;

    let file = migrator.add_migration(name, mode).await?;
    for warning in &file.warnings {
        output::warn(warning);
    }
    output::kv("File", &file.path.display().to_string());
    output::kv("Checksum", &file.checksum);
    if file.has_destructive {
        output::warn("This migration contains destructive changes; review before applying.");
    }
    output::success(&format!("Created migration '{}'", file.id()));
    Ok(())
}

async fn apply(migrator: &Migrator, mode: MigrationMode) -> CliResult<()> {
    output::header("Apply Migrations");
    migrator.initialize().await?;

    let report = migrator.apply_migrations(mode).await?;
    for id in &report.applied {
        output::list_item(&format!("applied {}", id));
    }
    for id in &report.would_apply {
        output::list_item(&format!("would apply {}", id));
    }
    output::success(&report.summary());
    Ok(())
}

async fn revert(migrator: &Migrator) -> CliResult<()> {
    output::header("Revert Migration");
    migrator.initialize().await?;

    match migrator.revert_migration().await? {
        Some(id) => output::success(&format!("Reverted '{}'", id)),
        None => output::info("No applied migrations to revert."),
    }
    Ok(())
}

async fn status(migrator: &Migrator) -> CliResult<()> {
    output::header("Migration Status");
    migrator.initialize().await?;

    let status = migrator.status().await?;
    if !status.applied.is_empty() {
        output::info(&format!("Applied ({}):", status.applied.len()));
        for record in &status.applied {
            output::list_item(&format!(
                "{} ({}ms)",
                record.name, record.execution_time_ms
            ));
        }
    }
    if !status.pending.is_empty() {
        output::info(&format!("Pending ({}):", status.pending.len()));
        for id in &status.pending {
            output::list_item(id);
        }
    }
    if !status.undetected_changes.is_empty() {
        output::warn(&format!(
            "Undetected changes ({}) - run `strata add <name>`:",
            status.undetected_changes.len()
        ));
        for change in &status.undetected_changes {
            output::list_item(change);
        }
    }
    output::newline();
    output::success(&status.summary());
    Ok(())
}
