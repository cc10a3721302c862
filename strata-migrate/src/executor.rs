//! SQL execution abstraction.
//!
//! The engine never talks to a driver directly: introspection queries,
//! DDL, and ledger writes all go through [`SqlExecutor`]. The trait is the
//! seam that lets the history ledger's applied-update join the same
//! transaction as a migration's own statements, and lets tests script the
//! database side entirely in memory.

use async_trait::async_trait;

use crate::error::{MigrateResult, MigrationError};

/// A parameter or column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Truthiness across the representations drivers actually return:
    /// booleans, integers, and `YES`/`true`/`1` strings.
    pub fn as_bool(&self) -> bool {
        match self {
            SqlValue::Bool(b) => *b,
            SqlValue::Int(i) => *i != 0,
            SqlValue::Text(s) => {
                matches!(s.to_ascii_lowercase().as_str(), "yes" | "true" | "1" | "t")
            }
            _ => false,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Int(i)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One row of a query result, with by-name access.
#[derive(Debug, Clone, Default)]
pub struct SqlRow {
    values: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.values.push((name.into(), value.into()));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: SqlValue) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Text column, `None` when missing or NULL.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(SqlValue::as_str)
    }

    /// Integer column, `None` when missing or NULL.
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(SqlValue::as_i64)
    }

    /// Flag column, `false` when missing or NULL.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).map(SqlValue::as_bool).unwrap_or(false)
    }
}

/// A SQL statement plus its bind parameters.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Executes SQL against the target database.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a single statement, returning the affected row count.
    async fn execute(&self, statement: &Statement) -> MigrateResult<u64>;

    /// Run a query and return its rows.
    async fn query(&self, statement: &Statement) -> MigrateResult<Vec<SqlRow>>;

    /// Run statements inside a single transaction.
    ///
    /// The first failure rolls back everything already executed in the
    /// batch and surfaces as [`MigrationError::Application`] with the
    /// failing statement attached.
    async fn execute_transaction(&self, statements: &[Statement]) -> MigrateResult<()>;
}

#[cfg(feature = "postgres")]
pub use postgres::PostgresExecutor;

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
    use sqlx::{Column, Row, TypeInfo};

    /// [`SqlExecutor`] backed by a sqlx PostgreSQL pool.
    pub struct PostgresExecutor {
        pool: PgPool,
    }

    impl PostgresExecutor {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        pub async fn connect(url: &str) -> MigrateResult<Self> {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .map_err(|e| MigrationError::database(e.to_string()))?;
            Ok(Self { pool })
        }

        pub fn pool(&self) -> &PgPool {
            &self.pool
        }
    }

    fn bind_params<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        params: &[SqlValue],
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        for param in params {
            query = match param {
                SqlValue::Null => query.bind(Option::<String>::None),
                SqlValue::Bool(b) => query.bind(*b),
                SqlValue::Int(i) => query.bind(*i),
                SqlValue::Float(f) => query.bind(*f),
                SqlValue::Text(s) => query.bind(s.clone()),
                SqlValue::Bytes(b) => query.bind(b.clone()),
            };
        }
        query
    }

    fn decode_row(row: &PgRow) -> SqlRow {
        let mut out = SqlRow::new();
        for (i, column) in row.columns().iter().enumerate() {
            let value = match column.type_info().name() {
                "BOOL" => row
                    .try_get::<Option<bool>, _>(i)
                    .ok()
                    .flatten()
                    .map(SqlValue::Bool),
                "INT2" => row
                    .try_get::<Option<i16>, _>(i)
                    .ok()
                    .flatten()
                    .map(|v| SqlValue::Int(v.into())),
                "INT4" => row
                    .try_get::<Option<i32>, _>(i)
                    .ok()
                    .flatten()
                    .map(|v| SqlValue::Int(v.into())),
                "INT8" => row
                    .try_get::<Option<i64>, _>(i)
                    .ok()
                    .flatten()
                    .map(SqlValue::Int),
                "FLOAT4" => row
                    .try_get::<Option<f32>, _>(i)
                    .ok()
                    .flatten()
                    .map(|v| SqlValue::Float(v.into())),
                "FLOAT8" => row
                    .try_get::<Option<f64>, _>(i)
                    .ok()
                    .flatten()
                    .map(SqlValue::Float),
                "TIMESTAMPTZ" => row
                    .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
                    .ok()
                    .flatten()
                    .map(|v| SqlValue::Text(v.to_rfc3339())),
                "TIMESTAMP" => row
                    .try_get::<Option<chrono::NaiveDateTime>, _>(i)
                    .ok()
                    .flatten()
                    .map(|v| SqlValue::Text(v.and_utc().to_rfc3339())),
                "BYTEA" => row
                    .try_get::<Option<Vec<u8>>, _>(i)
                    .ok()
                    .flatten()
                    .map(SqlValue::Bytes),
                _ => row
                    .try_get::<Option<String>, _>(i)
                    .ok()
                    .flatten()
                    .map(SqlValue::Text),
            };
            out.push(column.name(), value.unwrap_or(SqlValue::Null));
        }
        out
    }

    #[async_trait]
    impl SqlExecutor for PostgresExecutor {
        async fn execute(&self, statement: &Statement) -> MigrateResult<u64> {
            let query = bind_params(sqlx::query(&statement.sql), &statement.params);
            let result = query
                .execute(&self.pool)
                .await
                .map_err(|e| MigrationError::application(&statement.sql, e.to_string()))?;
            Ok(result.rows_affected())
        }

        async fn query(&self, statement: &Statement) -> MigrateResult<Vec<SqlRow>> {
            let query = bind_params(sqlx::query(&statement.sql), &statement.params);
            let rows = query
                .fetch_all(&self.pool)
                .await
                .map_err(|e| MigrationError::application(&statement.sql, e.to_string()))?;
            Ok(rows.iter().map(decode_row).collect())
        }

        async fn execute_transaction(&self, statements: &[Statement]) -> MigrateResult<()> {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| MigrationError::database(e.to_string()))?;
            for statement in statements {
                let query = bind_params(sqlx::query(&statement.sql), &statement.params);
                query
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| MigrationError::application(&statement.sql, e.to_string()))?;
            }
            tx.commit()
                .await
                .map_err(|e| MigrationError::database(e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutor;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
    use sqlx::{Column, Row, TypeInfo};

    /// [`SqlExecutor`] backed by a sqlx SQLite pool.
    pub struct SqliteExecutor {
        pool: SqlitePool,
    }

    impl SqliteExecutor {
        pub fn new(pool: SqlitePool) -> Self {
            Self { pool }
        }

        pub async fn connect(url: &str) -> MigrateResult<Self> {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await
                .map_err(|e| MigrationError::database(e.to_string()))?;
            Ok(Self { pool })
        }

        pub fn pool(&self) -> &SqlitePool {
            &self.pool
        }
    }

    fn bind_params<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        params: &[SqlValue],
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        for param in params {
            query = match param {
                SqlValue::Null => query.bind(Option::<String>::None),
                SqlValue::Bool(b) => query.bind(*b),
                SqlValue::Int(i) => query.bind(*i),
                SqlValue::Float(f) => query.bind(*f),
                SqlValue::Text(s) => query.bind(s.clone()),
                SqlValue::Bytes(b) => query.bind(b.clone()),
            };
        }
        query
    }

    fn decode_row(row: &SqliteRow) -> SqlRow {
        let mut out = SqlRow::new();
        for (i, column) in row.columns().iter().enumerate() {
            // SQLite typing is dynamic; match the declared affinity first
            // and fall back through the value representations.
            let value = match column.type_info().name() {
                "INTEGER" | "BOOLEAN" => row
                    .try_get::<Option<i64>, _>(i)
                    .ok()
                    .flatten()
                    .map(SqlValue::Int),
                "REAL" => row
                    .try_get::<Option<f64>, _>(i)
                    .ok()
                    .flatten()
                    .map(SqlValue::Float),
                "BLOB" => row
                    .try_get::<Option<Vec<u8>>, _>(i)
                    .ok()
                    .flatten()
                    .map(SqlValue::Bytes),
                _ => None,
            }
            .or_else(|| {
                row.try_get::<Option<String>, _>(i)
                    .ok()
                    .flatten()
                    .map(SqlValue::Text)
            })
            .or_else(|| {
                row.try_get::<Option<i64>, _>(i)
                    .ok()
                    .flatten()
                    .map(SqlValue::Int)
            });
            out.push(column.name(), value.unwrap_or(SqlValue::Null));
        }
        out
    }

    #[async_trait]
    impl SqlExecutor for SqliteExecutor {
        async fn execute(&self, statement: &Statement) -> MigrateResult<u64> {
            let query = bind_params(sqlx::query(&statement.sql), &statement.params);
            let result = query
                .execute(&self.pool)
                .await
                .map_err(|e| MigrationError::application(&statement.sql, e.to_string()))?;
            Ok(result.rows_affected())
        }

        async fn query(&self, statement: &Statement) -> MigrateResult<Vec<SqlRow>> {
            let query = bind_params(sqlx::query(&statement.sql), &statement.params);
            let rows = query
                .fetch_all(&self.pool)
                .await
                .map_err(|e| MigrationError::application(&statement.sql, e.to_string()))?;
            Ok(rows.iter().map(decode_row).collect())
        }

        async fn execute_transaction(&self, statements: &[Statement]) -> MigrateResult<()> {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| MigrationError::database(e.to_string()))?;
            for statement in statements {
                let query = bind_params(sqlx::query(&statement.sql), &statement.params);
                query
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| MigrationError::application(&statement.sql, e.to_string()))?;
            }
            tx.commit()
                .await
                .map_err(|e| MigrationError::database(e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// In-memory executor for tests: scripted query results, a statement
    /// log, and an optional failure trigger.
    #[derive(Default)]
    pub struct ScriptedExecutor {
        /// (sql substring, rows) pairs; the first match wins.
        results: Mutex<Vec<(String, Vec<SqlRow>)>>,
        /// Every statement handed to `execute` or committed in a
        /// transaction.
        pub executed: Mutex<Vec<Statement>>,
        /// Committed transactions, in order.
        pub transactions: Mutex<Vec<Vec<Statement>>>,
        /// Any statement containing this substring fails.
        fail_on: Mutex<Option<String>>,
    }

    impl ScriptedExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script_query(&self, sql_contains: &str, rows: Vec<SqlRow>) {
            self.results
                .lock()
                .unwrap()
                .push((sql_contains.to_string(), rows));
        }

        pub fn fail_on(&self, sql_contains: &str) {
            *self.fail_on.lock().unwrap() = Some(sql_contains.to_string());
        }

        pub fn executed_sql(&self) -> Vec<String> {
            self.executed
                .lock()
                .unwrap()
                .iter()
                .map(|s| s.sql.clone())
                .collect()
        }

        fn check_failure(&self, sql: &str) -> MigrateResult<()> {
            if let Some(trigger) = self.fail_on.lock().unwrap().as_deref() {
                if sql.contains(trigger) {
                    return Err(MigrationError::application(sql, "scripted failure"));
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SqlExecutor for ScriptedExecutor {
        async fn execute(&self, statement: &Statement) -> MigrateResult<u64> {
            self.check_failure(&statement.sql)?;
            self.executed.lock().unwrap().push(statement.clone());
            Ok(1)
        }

        async fn query(&self, statement: &Statement) -> MigrateResult<Vec<SqlRow>> {
            self.check_failure(&statement.sql)?;
            let results = self.results.lock().unwrap();
            for (pattern, rows) in results.iter() {
                if statement.sql.contains(pattern.as_str()) {
                    return Ok(rows.clone());
                }
            }
            Ok(Vec::new())
        }

        async fn execute_transaction(&self, statements: &[Statement]) -> MigrateResult<()> {
            for statement in statements {
                // A failing statement rolls back the whole batch.
                self.check_failure(&statement.sql)?;
            }
            let mut executed = self.executed.lock().unwrap();
            executed.extend(statements.iter().cloned());
            self.transactions
                .lock()
                .unwrap()
                .push(statements.to_vec());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_flags() {
        assert!(SqlValue::Bool(true).as_bool());
        assert!(SqlValue::Int(1).as_bool());
        assert!(SqlValue::Text("YES".into()).as_bool());
        assert!(!SqlValue::Text("NO".into()).as_bool());
        assert!(!SqlValue::Null.as_bool());
    }

    #[test]
    fn test_row_access() {
        let row = SqlRow::new()
            .with("name", "users")
            .with("ordinal", 3i64)
            .with("is_nullable", true);
        assert_eq!(row.text("name"), Some("users"));
        assert_eq!(row.int("ordinal"), Some(3));
        assert!(row.flag("is_nullable"));
        assert!(row.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_scripted_executor_rolls_back_batch() {
        let executor = testing::ScriptedExecutor::new();
        executor.fail_on("DROP TABLE");

        let statements = vec![
            Statement::new("CREATE TABLE a (id INTEGER);"),
            Statement::new("DROP TABLE b;"),
        ];
        let err = executor.execute_transaction(&statements).await.unwrap_err();
        assert!(matches!(err, MigrationError::Application { .. }));
        // Nothing from the failed batch is recorded as executed.
        assert!(executor.executed_sql().is_empty());
    }
}
