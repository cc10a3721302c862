//! # strata-migrate
//!
//! A hybrid schema-migration engine: it compares registered application
//! models against a live database's actual schema, computes the minimal
//! ordered set of structural changes to reconcile them, renders
//! reviewable up/down DDL per dialect, and tracks what has been applied
//! in a database-resident ledger.
//!
//! ```text
//! ┌───────────────┐     ┌───────────────┐
//! │ ModelRegistry │     │   Inspector   │
//! └───────┬───────┘     └───────┬───────┘
//!         │   desired state     │   actual state
//!         └─────────┬───────────┘
//!                   ▼
//!           ┌────────────────┐      ┌──────────────┐
//!           │ ChangeDetector │─────▶│ SqlGenerator │
//!           └────────────────┘      └──────┬───────┘
//!                MigrationPlan             │
//!                                          ▼
//!           ┌────────────────┐      ┌──────────────┐
//!           │ HistoryLedger  │◀─────│  Migrator    │──▶ .sql files
//!           └────────────────┘      └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_migrate::{Migrator, MigratorConfig, MigrationMode, PostgresExecutor};
//! use strata_schema::Dialect;
//! use std::sync::Arc;
//!
//! # async fn run() -> strata_migrate::MigrateResult<()> {
//! let executor = Arc::new(PostgresExecutor::connect("postgres://localhost/app").await?);
//! let config = MigratorConfig::new().migrations_dir("./migrations");
//! let mut migrator = Migrator::new(config, Dialect::Postgres, executor);
//!
//! migrator.register_model::<User>();
//! migrator.initialize().await?;
//!
//! migrator.add_migration("create users", MigrationMode::Interactive).await?;
//! let report = migrator.apply_migrations(MigrationMode::Interactive).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Migration files
//!
//! Migrations are single `.sql` files named
//! `<YYYYMMDDHHMMSS>_<slug>.sql`, carrying a metadata header and the two
//! script sections:
//!
//! ```text
//! -- Migration: create users
//! -- Created: 2024-01-01T00:00:00Z
//! -- Checksum: 3f1a...
//! -- Mode: Interactive
//! -- Has Destructive: false
//! -- Requires Review: false
//!
//! -- +migrate Up
//! CREATE TABLE "users" (...);
//!
//! -- +migrate Down
//! DROP TABLE IF EXISTS "users" CASCADE;
//! ```
//!
//! One migrator process per database and migrations directory at a time
//! is a hard requirement; there is no cross-process lock.

pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod file;
pub mod history;
pub mod inspect;
pub mod sqlgen;

// Re-exports
pub use diff::{ChangeDetector, ChangeKind, MigrationChange, MigrationPlan};
pub use engine::{ApplyReport, MigrationStatus, Migrator, MigratorConfig};
pub use error::{MigrateResult, MigrationError};
pub use executor::{SqlExecutor, SqlRow, SqlValue, Statement};
pub use file::{MigrationFile, MigrationFileStore, MigrationMode};
pub use history::{MigrationHistoryLedger, MigrationOutcome, MigrationRecord};
pub use inspect::{
    inspector_for, is_system_table, Inspector, MysqlInspector, PostgresInspector, SqliteInspector,
};
pub use sqlgen::{MigrationScript, SqlGenerator};

#[cfg(feature = "postgres")]
pub use executor::PostgresExecutor;
#[cfg(feature = "sqlite")]
pub use executor::SqliteExecutor;
