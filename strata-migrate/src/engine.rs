//! The migrator: orchestrates registry, inspector, detector, generator,
//! file store and ledger.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use strata_schema::{Dialect, Entity, EntityDescriptor, ModelRegistry};

use crate::diff::{ChangeDetector, MigrationPlan};
use crate::error::{MigrateResult, MigrationError};
use crate::executor::{SqlExecutor, Statement};
use crate::file::{MigrationFile, MigrationFileStore, MigrationMode};
use crate::history::{MigrationHistoryLedger, MigrationRecord};
use crate::inspect::{inspector_for, Inspector};
use crate::sqlgen::SqlGenerator;

/// Configuration for the migrator.
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Directory holding `.sql` migration files.
    pub migrations_dir: PathBuf,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("./migrations"),
        }
    }
}

impl MigratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }
}

/// Result of one apply run.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Identifiers applied in this run.
    pub applied: Vec<String>,
    /// Identifiers that would run under `GenerateOnly`.
    pub would_apply: Vec<String>,
    /// Total wall time, in milliseconds.
    pub duration_ms: i64,
    /// Non-fatal notes.
    pub warnings: Vec<String>,
}

impl ApplyReport {
    pub fn summary(&self) -> String {
        if !self.would_apply.is_empty() {
            return format!("{} migrations pending (not executed)", self.would_apply.len());
        }
        if self.applied.is_empty() {
            "No migrations applied".to_string()
        } else {
            format!("{} applied in {}ms", self.applied.len(), self.duration_ms)
        }
    }
}

/// Migration status for reporting.
#[derive(Debug)]
pub struct MigrationStatus {
    /// Applied ledger records.
    pub applied: Vec<MigrationRecord>,
    /// On-disk files not yet applied.
    pub pending: Vec<String>,
    /// Live differences not covered by any file.
    pub undetected_changes: Vec<String>,
}

impl MigrationStatus {
    pub fn summary(&self) -> String {
        format!(
            "{} applied, {} pending, {} undetected changes",
            self.applied.len(),
            self.pending.len(),
            self.undetected_changes.len()
        )
    }
}

/// The migration engine's orchestrator.
///
/// Owns the model registry and every collaborator, wired explicitly at
/// construction. A single migrator process per database and migrations
/// directory is a hard requirement; concurrent migrators may race.
pub struct Migrator {
    config: MigratorConfig,
    dialect: Dialect,
    registry: ModelRegistry,
    executor: Arc<dyn SqlExecutor>,
    inspector: Box<dyn Inspector>,
    ledger: MigrationHistoryLedger,
    store: MigrationFileStore,
    generator: SqlGenerator,
}

impl Migrator {
    /// Wire a migrator with the default inspector for the dialect.
    pub fn new(config: MigratorConfig, dialect: Dialect, executor: Arc<dyn SqlExecutor>) -> Self {
        let inspector = inspector_for(dialect, executor.clone());
        Self::with_inspector(config, dialect, executor, inspector)
    }

    /// Wire a migrator with a caller-provided inspector.
    pub fn with_inspector(
        config: MigratorConfig,
        dialect: Dialect,
        executor: Arc<dyn SqlExecutor>,
        inspector: Box<dyn Inspector>,
    ) -> Self {
        let ledger = MigrationHistoryLedger::new(executor.clone(), dialect);
        let store = MigrationFileStore::new(&config.migrations_dir);
        let generator = SqlGenerator::new(dialect);
        Self {
            config,
            dialect,
            registry: ModelRegistry::new(dialect),
            executor,
            inspector,
            ledger,
            store,
            generator,
        }
    }

    /// Register an entity type with the model registry.
    pub fn register_model<E: Entity>(&mut self) {
        self.registry.register::<E>();
    }

    /// Register a descriptor directly.
    pub fn register_entity(&mut self, descriptor: EntityDescriptor) {
        self.registry.register_entity(descriptor);
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Create the migrations directory and tracking tables.
    pub async fn initialize(&self) -> MigrateResult<()> {
        self.store.ensure_dir().await?;
        self.ledger.initialize().await
    }

    /// Diff the registered models against the live schema.
    pub async fn detect_changes(&self) -> MigrateResult<MigrationPlan> {
        let database = self.inspector.current_schema().await?;
        ChangeDetector::new(&self.registry, self.dialect).detect(&database)
    }

    /// Detect changes, render SQL, and persist a migration file.
    pub async fn add_migration(
        &self,
        name: &str,
        mode: MigrationMode,
    ) -> MigrateResult<MigrationFile> {
        let plan = self.detect_changes().await?;
        if plan.is_empty() {
            return Err(MigrationError::NoChanges);
        }
        check_mode(mode, plan.has_destructive(), plan.requires_review())?;

        let script = self.generator.generate(&plan)?;
        let warnings = plan.warnings.clone();
        let changes = plan.changes.clone();
        let mut file = MigrationFile::from_script(name, mode, script, changes, warnings);

        for warning in &file.warnings {
            warn!(migration = %file.id(), "{}", warning);
        }

        let path = self.store.write(&file).await?;
        info!(migration = %file.id(), path = %path.display(), "created migration file");
        file.path = path;
        Ok(file)
    }

    /// Apply every on-disk migration file not yet in the ledger.
    ///
    /// Each file runs in its own transaction; a failure halts the run,
    /// leaving earlier files committed and a `failed` ledger record for
    /// the offender.
    pub async fn apply_migrations(&self, mode: MigrationMode) -> MigrateResult<ApplyReport> {
        let start = Instant::now();
        self.ledger.initialize().await?;

        let files = self.store.list().await?;
        let applied: std::collections::HashSet<String> = self
            .ledger
            .get_applied()
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();

        let pending: Vec<&MigrationFile> = files
            .iter()
            .filter(|f| !applied.contains(&f.id()))
            .collect();

        if pending.is_empty() {
            // Nothing on disk to run. If live differences still exist, the
            // caller has to generate files; silently auto-applying is
            // never an option.
            let plan = self.detect_changes().await?;
            if !plan.is_empty() {
                return Err(MigrationError::NoMigrationFiles);
            }
            return Ok(ApplyReport {
                duration_ms: start.elapsed().as_millis() as i64,
                ..Default::default()
            });
        }

        // Gate every file before any DDL executes. The persisted header
        // flags are the canonical destructiveness source here.
        for file in &pending {
            check_mode(mode, file.has_destructive, file.requires_review)?;
        }

        let mut report = ApplyReport::default();
        for file in pending {
            let id = file.id();

            if mode == MigrationMode::GenerateOnly {
                report.would_apply.push(id);
                continue;
            }
            if self.ledger.is_applied(&id).await? {
                continue;
            }

            self.ledger.insert_pending(file).await?;

            let mut statements: Vec<Statement> = file
                .executable_up()
                .into_iter()
                .map(Statement::new)
                .collect();
            statements.extend(self.ledger.mark_applied_statements(&id));

            let file_start = Instant::now();
            match self.executor.execute_transaction(&statements).await {
                Ok(()) => {
                    let millis = file_start.elapsed().as_millis() as i64;
                    self.ledger.set_execution_time(&id, millis).await?;
                    info!(migration = %id, millis, "applied migration");
                    report.applied.push(id);
                }
                Err(e) => {
                    warn!(migration = %id, error = %e, "migration failed; rolled back");
                    self.ledger.mark_failed(&id, &e.to_string()).await?;
                    return Err(e);
                }
            }
        }

        if !report.applied.is_empty() {
            self.ledger.record_snapshots(&self.registry).await?;
        }
        report.duration_ms = start.elapsed().as_millis() as i64;
        Ok(report)
    }

    /// Revert the most recently applied migration.
    ///
    /// Returns the reverted identifier, or `None` when nothing is
    /// applied.
    pub async fn revert_migration(&self) -> MigrateResult<Option<String>> {
        self.ledger.initialize().await?;

        let Some(record) = self.ledger.get_last_applied().await? else {
            return Ok(None);
        };

        let files = self.store.list().await?;
        let file = files
            .iter()
            .find(|f| f.id() == record.name)
            .ok_or_else(|| {
                MigrationError::invalid_migration(format!(
                    "migration file for '{}' not found in {}",
                    record.name,
                    self.config.migrations_dir.display()
                ))
            })?;

        let down = file.executable_down();
        if down.is_empty() {
            return Err(MigrationError::invalid_migration(format!(
                "migration '{}' has no down script",
                record.name
            )));
        }

        let mut statements: Vec<Statement> = down.into_iter().map(Statement::new).collect();
        statements.extend(self.ledger.mark_rolled_back_statements(&record.name));
        self.executor.execute_transaction(&statements).await?;

        info!(migration = %record.name, "reverted migration");
        Ok(Some(record.name))
    }

    /// Applied records, pending files, and undetected live differences.
    pub async fn status(&self) -> MigrateResult<MigrationStatus> {
        self.ledger.initialize().await?;

        let applied = self.ledger.get_applied().await?;
        let applied_ids: std::collections::HashSet<&str> =
            applied.iter().map(|r| r.name.as_str()).collect();

        let files = self.store.list().await?;
        let pending: Vec<String> = files
            .iter()
            .map(|f| f.id())
            .filter(|id| !applied_ids.contains(id.as_str()))
            .collect();

        let plan = self.detect_changes().await?;
        let undetected_changes = if pending.is_empty() {
            plan.changes.iter().map(|c| c.description.clone()).collect()
        } else {
            // Pending files may already cover the live differences.
            Vec::new()
        };

        Ok(MigrationStatus {
            applied,
            pending,
            undetected_changes,
        })
    }
}

/// The per-mode policy gate.
fn check_mode(mode: MigrationMode, has_destructive: bool, requires_review: bool) -> MigrateResult<()> {
    match mode {
        MigrationMode::Automatic => {
            if has_destructive {
                return Err(MigrationError::mode_violation(
                    mode.as_str(),
                    "plan contains destructive changes",
                ));
            }
            if requires_review {
                return Err(MigrationError::mode_violation(
                    mode.as_str(),
                    "plan contains changes that require review",
                ));
            }
            Ok(())
        }
        MigrationMode::Interactive
        | MigrationMode::GenerateOnly
        | MigrationMode::ForceDestructive => Ok(()),
    }
}
