//! The database-resident migration history ledger.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use strata_schema::{Dialect, ModelRegistry};

use crate::error::{MigrateResult, MigrationError};
use crate::executor::{SqlExecutor, SqlRow, SqlValue, Statement};
use crate::file::MigrationFile;

/// Compact applied-ids table, compatible with common external tooling.
pub const APPLIED_TABLE: &str = "schema_migrations";
/// Detailed history table.
pub const HISTORY_TABLE: &str = "_strata_migration_history";
/// Model snapshot table.
pub const SNAPSHOT_TABLE: &str = "_strata_model_snapshots";

/// Execution outcome of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// Inserted before execution begins.
    Pending,
    /// The file's transaction committed.
    Applied,
    /// Execution failed; the transaction rolled back. Retry permitted.
    Failed,
    /// Explicitly reverted after being applied.
    RolledBack,
}

impl MigrationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationOutcome::Pending => "pending",
            MigrationOutcome::Applied => "applied",
            MigrationOutcome::Failed => "failed",
            MigrationOutcome::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MigrationOutcome::Pending),
            "applied" => Some(MigrationOutcome::Applied),
            "failed" => Some(MigrationOutcome::Failed),
            "rolled_back" => Some(MigrationOutcome::RolledBack),
            _ => None,
        }
    }
}

/// One row of the detailed history table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Ledger row id.
    pub id: i64,
    /// Migration identifier (`<timestamp>_<slug>`).
    pub name: String,
    /// Checksum recorded at apply time.
    pub checksum: String,
    /// When the migration was recorded.
    pub applied_at: DateTime<Utc>,
    /// Whether the file was flagged destructive.
    pub destructive: bool,
    /// When the migration was rolled back, if ever.
    pub rolled_back_at: Option<DateTime<Utc>>,
    /// Current outcome.
    pub outcome: MigrationOutcome,
    /// Captured error text for failed runs.
    pub error: Option<String>,
    /// Execution time of the up script, in milliseconds.
    pub execution_time_ms: i64,
}

/// Tracks applied migrations in the target database.
///
/// All DDL and placeholders are dialect-aware; every method surfaces
/// failures as [`MigrationError::Ledger`] since the engine cannot
/// guarantee correctness without its bookkeeping.
pub struct MigrationHistoryLedger {
    executor: Arc<dyn SqlExecutor>,
    dialect: Dialect,
}

impl MigrationHistoryLedger {
    pub fn new(executor: Arc<dyn SqlExecutor>, dialect: Dialect) -> Self {
        Self { executor, dialect }
    }

    fn auto_increment_id(&self) -> String {
        match self.dialect {
            Dialect::Postgres => "id BIGSERIAL PRIMARY KEY".to_string(),
            Dialect::MySql => "id BIGINT AUTO_INCREMENT PRIMARY KEY".to_string(),
            Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        }
    }

    fn timestamp_type(&self) -> &'static str {
        match self.dialect {
            Dialect::Postgres => "TIMESTAMP WITH TIME ZONE",
            Dialect::MySql => "DATETIME",
            Dialect::Sqlite => "TEXT",
        }
    }

    /// Idempotently create the tracking tables.
    pub async fn initialize(&self) -> MigrateResult<()> {
        let ts = self.timestamp_type();
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                 version VARCHAR(255) PRIMARY KEY,\n    \
                 applied_at {} \n)",
                APPLIED_TABLE, ts
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                 {},\n    \
                 name VARCHAR(255) NOT NULL UNIQUE,\n    \
                 checksum VARCHAR(64) NOT NULL,\n    \
                 applied_at {} ,\n    \
                 destructive BOOLEAN NOT NULL DEFAULT FALSE,\n    \
                 rolled_back_at {} ,\n    \
                 status VARCHAR(32) NOT NULL,\n    \
                 error TEXT,\n    \
                 execution_time_ms BIGINT NOT NULL DEFAULT 0,\n    \
                 up_sql TEXT,\n    \
                 down_sql TEXT\n)",
                HISTORY_TABLE,
                self.auto_increment_id(),
                ts,
                ts
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                 table_name VARCHAR(255) PRIMARY KEY,\n    \
                 checksum VARCHAR(64) NOT NULL,\n    \
                 definition TEXT NOT NULL,\n    \
                 updated_at {} \n)",
                SNAPSHOT_TABLE, ts
            ),
        ];

        for sql in statements {
            self.executor
                .execute(&Statement::new(sql))
                .await
                .map_err(|e| MigrationError::ledger(e.to_string()))?;
        }
        debug!(dialect = %self.dialect, "migration tracking tables ready");
        Ok(())
    }

    /// Whether a migration name is currently applied.
    pub async fn is_applied(&self, name: &str) -> MigrateResult<bool> {
        let sql = format!(
            "SELECT name FROM {} WHERE name = {} AND status = {}",
            HISTORY_TABLE,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        );
        let rows = self
            .executor
            .query(&Statement::with_params(
                sql,
                vec![SqlValue::from(name), SqlValue::from("applied")],
            ))
            .await
            .map_err(|e| MigrationError::ledger(e.to_string()))?;
        Ok(!rows.is_empty())
    }

    /// All applied migrations, oldest first.
    pub async fn get_applied(&self) -> MigrateResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT id, name, checksum, applied_at, destructive, rolled_back_at, \
             status, error, execution_time_ms \
             FROM {} WHERE status = {} ORDER BY name",
            HISTORY_TABLE,
            self.dialect.placeholder(1)
        );
        let rows = self
            .executor
            .query(&Statement::with_params(sql, vec![SqlValue::from("applied")]))
            .await
            .map_err(|e| MigrationError::ledger(e.to_string()))?;
        rows.iter().map(record_from_row).collect()
    }

    /// The most recently applied migration, if any.
    pub async fn get_last_applied(&self) -> MigrateResult<Option<MigrationRecord>> {
        Ok(self.get_applied().await?.into_iter().next_back())
    }

    /// Insert (or reset a failed row to) `pending` before execution.
    ///
    /// Applying an already-applied name is the caller's no-op to guard;
    /// this method assumes the prior existence check happened.
    pub async fn insert_pending(&self, file: &MigrationFile) -> MigrateResult<()> {
        let name = file.id();
        let existing_sql = format!(
            "SELECT id FROM {} WHERE name = {}",
            HISTORY_TABLE,
            self.dialect.placeholder(1)
        );
        let existing = self
            .executor
            .query(&Statement::with_params(
                existing_sql,
                vec![SqlValue::from(name.as_str())],
            ))
            .await
            .map_err(|e| MigrationError::ledger(e.to_string()))?;

        if existing.is_empty() {
            let sql = format!(
                "INSERT INTO {} (name, checksum, applied_at, destructive, status, \
                 execution_time_ms, up_sql, down_sql) VALUES ({}, {}, {}, {}, {}, 0, {}, {})",
                HISTORY_TABLE,
                self.dialect.placeholder(1),
                self.dialect.placeholder(2),
                self.dialect.placeholder(3),
                self.dialect.placeholder(4),
                self.dialect.placeholder(5),
                self.dialect.placeholder(6),
                self.dialect.placeholder(7),
            );
            self.executor
                .execute(&Statement::with_params(
                    sql,
                    vec![
                        SqlValue::from(name.as_str()),
                        SqlValue::from(file.checksum.as_str()),
                        SqlValue::from(now_text()),
                        SqlValue::from(file.has_destructive),
                        SqlValue::from("pending"),
                        SqlValue::from(file.up.join("\n\n")),
                        SqlValue::from(file.down.join("\n\n")),
                    ],
                ))
                .await
                .map_err(|e| MigrationError::ledger(e.to_string()))?;
        } else {
            // A failed run left a row behind; retry resets it.
            let sql = format!(
                "UPDATE {} SET status = {}, error = NULL, checksum = {} WHERE name = {}",
                HISTORY_TABLE,
                self.dialect.placeholder(1),
                self.dialect.placeholder(2),
                self.dialect.placeholder(3),
            );
            self.executor
                .execute(&Statement::with_params(
                    sql,
                    vec![
                        SqlValue::from("pending"),
                        SqlValue::from(file.checksum.as_str()),
                        SqlValue::from(name.as_str()),
                    ],
                ))
                .await
                .map_err(|e| MigrationError::ledger(e.to_string()))?;
        }
        Ok(())
    }

    /// Statements that flip a pending record to `applied` and insert the
    /// compact row. Returned (not executed) so they can join the same
    /// transaction as the migration's own statements.
    pub fn mark_applied_statements(&self, name: &str) -> Vec<Statement> {
        let update = format!(
            "UPDATE {} SET status = {}, applied_at = {} WHERE name = {}",
            HISTORY_TABLE,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3),
        );
        let insert = format!(
            "INSERT INTO {} (version, applied_at) VALUES ({}, {})",
            APPLIED_TABLE,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
        );
        vec![
            Statement::with_params(
                update,
                vec![
                    SqlValue::from("applied"),
                    SqlValue::from(now_text()),
                    SqlValue::from(name),
                ],
            ),
            Statement::with_params(
                insert,
                vec![SqlValue::from(name), SqlValue::from(now_text())],
            ),
        ]
    }

    /// Record the up script's execution time after a successful apply.
    pub async fn set_execution_time(&self, name: &str, millis: i64) -> MigrateResult<()> {
        let sql = format!(
            "UPDATE {} SET execution_time_ms = {} WHERE name = {}",
            HISTORY_TABLE,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
        );
        self.executor
            .execute(&Statement::with_params(
                sql,
                vec![SqlValue::Int(millis), SqlValue::from(name)],
            ))
            .await
            .map_err(|e| MigrationError::ledger(e.to_string()))?;
        Ok(())
    }

    /// Record a failed run. Deliberately issued outside the migration's
    /// transaction so the failure survives its rollback.
    pub async fn mark_failed(&self, name: &str, error: &str) -> MigrateResult<()> {
        let sql = format!(
            "UPDATE {} SET status = {}, error = {} WHERE name = {}",
            HISTORY_TABLE,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3),
        );
        self.executor
            .execute(&Statement::with_params(
                sql,
                vec![
                    SqlValue::from("failed"),
                    SqlValue::from(error),
                    SqlValue::from(name),
                ],
            ))
            .await
            .map_err(|e| MigrationError::ledger(e.to_string()))?;
        Ok(())
    }

    /// Statements that mark a record rolled back and remove it from the
    /// compact table; they join the down script's transaction.
    pub fn mark_rolled_back_statements(&self, name: &str) -> Vec<Statement> {
        let update = format!(
            "UPDATE {} SET status = {}, rolled_back_at = {} WHERE name = {}",
            HISTORY_TABLE,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3),
        );
        let delete = format!(
            "DELETE FROM {} WHERE version = {}",
            APPLIED_TABLE,
            self.dialect.placeholder(1),
        );
        vec![
            Statement::with_params(
                update,
                vec![
                    SqlValue::from("rolled_back"),
                    SqlValue::from(now_text()),
                    SqlValue::from(name),
                ],
            ),
            Statement::with_params(delete, vec![SqlValue::from(name)]),
        ]
    }

    /// Upsert the registry's snapshots into the snapshot table.
    pub async fn record_snapshots(&self, registry: &ModelRegistry) -> MigrateResult<()> {
        for snapshot in registry.models().values() {
            let definition = serde_json::to_string(snapshot)
                .map_err(|e| MigrationError::ledger(format!("snapshot serialization: {}", e)))?;
            let sql = format!(
                "INSERT INTO {table} (table_name, checksum, definition, updated_at) \
                 VALUES ({p1}, {p2}, {p3}, {p4}) \
                 ON CONFLICT (table_name) DO UPDATE SET \
                 checksum = excluded.checksum, definition = excluded.definition, \
                 updated_at = excluded.updated_at",
                table = SNAPSHOT_TABLE,
                p1 = self.dialect.placeholder(1),
                p2 = self.dialect.placeholder(2),
                p3 = self.dialect.placeholder(3),
                p4 = self.dialect.placeholder(4),
            );
            self.executor
                .execute(&Statement::with_params(
                    sql,
                    vec![
                        SqlValue::from(snapshot.table_name.as_str()),
                        SqlValue::from(snapshot.checksum.as_str()),
                        SqlValue::from(definition),
                        SqlValue::from(now_text()),
                    ],
                ))
                .await
                .map_err(|e| MigrationError::ledger(e.to_string()))?;
        }
        Ok(())
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn record_from_row(row: &SqlRow) -> MigrateResult<MigrationRecord> {
    let name = row
        .text("name")
        .ok_or_else(|| MigrationError::ledger("history row missing name"))?
        .to_string();
    let outcome = row
        .text("status")
        .and_then(MigrationOutcome::parse)
        .ok_or_else(|| MigrationError::ledger(format!("bad status for '{}'", name)))?;
    let applied_at = row
        .text("applied_at")
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default();
    let rolled_back_at = row
        .text("rolled_back_at")
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));

    Ok(MigrationRecord {
        id: row.int("id").unwrap_or_default(),
        name,
        checksum: row.text("checksum").unwrap_or_default().to_string(),
        applied_at,
        destructive: row.flag("destructive"),
        rolled_back_at,
        outcome,
        error: row.text("error").map(str::to_string),
        execution_time_ms: row.int("execution_time_ms").unwrap_or_default(),
    })
}
