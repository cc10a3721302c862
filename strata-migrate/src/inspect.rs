//! Live schema introspection, per dialect.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use strata_schema::{
    ColumnInfo, ConstraintInfo, ConstraintKind, Dialect, ForeignKeyRef, IndexInfo, LogicalType,
    TableSchema,
};

use crate::error::{MigrateResult, MigrationError};
use crate::executor::{SqlExecutor, SqlValue, Statement};

/// Tables the engine must never propose to drop: its own bookkeeping
/// plus well-known third-party migration trackers.
pub const SYSTEM_TABLES: &[&str] = &[
    "schema_migrations",
    "_strata_migration_history",
    "_strata_model_snapshots",
    "_prisma_migrations",
    "__diesel_schema_migrations",
    "_sqlx_migrations",
    "flyway_schema_history",
];

/// Whether a table belongs to a migration framework rather than the
/// application.
pub fn is_system_table(name: &str) -> bool {
    SYSTEM_TABLES.contains(&name)
}

/// Reads the live structural schema of the target database.
#[async_trait]
pub trait Inspector: Send + Sync {
    /// Table name -> schema, system tables excluded.
    async fn current_schema(&self) -> MigrateResult<BTreeMap<String, TableSchema>>;

    /// The dialect this inspector speaks.
    fn dialect(&self) -> Dialect;
}

/// Construct the default inspector for a dialect.
pub fn inspector_for(dialect: Dialect, executor: Arc<dyn SqlExecutor>) -> Box<dyn Inspector> {
    match dialect {
        Dialect::Postgres => Box::new(PostgresInspector::new(executor)),
        Dialect::Sqlite => Box::new(SqliteInspector::new(executor)),
        Dialect::MySql => Box::new(MysqlInspector),
    }
}

/// Introspection queries for PostgreSQL.
///
/// Everything is cast to plain types so rows decode without knowledge of
/// the `information_schema` domain types.
mod postgres_queries {
    pub const TABLES: &str = "\
        SELECT table_name::text AS table_name \
        FROM information_schema.tables \
        WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
        ORDER BY table_name";

    pub const COLUMNS: &str = "\
        SELECT \
            column_name::text AS column_name, \
            data_type::text AS data_type, \
            udt_name::text AS udt_name, \
            character_maximum_length::int4 AS character_maximum_length, \
            numeric_precision::int4 AS numeric_precision, \
            numeric_scale::int4 AS numeric_scale, \
            (is_nullable = 'YES') AS is_nullable, \
            column_default::text AS column_default \
        FROM information_schema.columns \
        WHERE table_schema = $1 AND table_name = $2 \
        ORDER BY ordinal_position";

    pub const CONSTRAINTS: &str = "\
        SELECT \
            tc.constraint_name::text AS constraint_name, \
            tc.constraint_type::text AS constraint_type, \
            kcu.column_name::text AS column_name, \
            ccu.table_name::text AS referenced_table, \
            ccu.column_name::text AS referenced_column \
        FROM information_schema.table_constraints tc \
        LEFT JOIN information_schema.key_column_usage kcu \
            ON tc.constraint_name = kcu.constraint_name \
            AND tc.table_schema = kcu.table_schema \
        LEFT JOIN information_schema.constraint_column_usage ccu \
            ON tc.constraint_name = ccu.constraint_name \
            AND tc.table_schema = ccu.table_schema \
            AND tc.constraint_type = 'FOREIGN KEY' \
        WHERE tc.table_schema = $1 AND tc.table_name = $2 \
        ORDER BY tc.constraint_name, kcu.ordinal_position";

    pub const INDEXES: &str = "\
        SELECT \
            i.relname::text AS index_name, \
            array_to_string(array_agg(a.attname ORDER BY array_position(ix.indkey, a.attnum)), ',') AS columns, \
            ix.indisunique AS is_unique, \
            ix.indisprimary AS is_primary, \
            am.amname::text AS index_method \
        FROM pg_index ix \
        JOIN pg_class i ON ix.indexrelid = i.oid \
        JOIN pg_class t ON ix.indrelid = t.oid \
        JOIN pg_namespace n ON t.relnamespace = n.oid \
        JOIN pg_am am ON i.relam = am.oid \
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
        WHERE n.nspname = $1 AND t.relname = $2 \
        GROUP BY i.relname, ix.indisunique, ix.indisprimary, am.amname \
        ORDER BY i.relname";
}

/// Catalog-view inspector for PostgreSQL.
pub struct PostgresInspector {
    executor: Arc<dyn SqlExecutor>,
    database_schema: String,
}

impl PostgresInspector {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            executor,
            database_schema: "public".to_string(),
        }
    }

    /// Inspect a schema other than `public`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.database_schema = schema.into();
        self
    }

    async fn table_schema(&self, table: &str) -> MigrateResult<TableSchema> {
        let mut schema = TableSchema::new(table);
        let schema_param = SqlValue::Text(self.database_schema.clone());
        let table_param = SqlValue::Text(table.to_string());

        let constraint_rows = self
            .executor
            .query(&Statement::with_params(
                postgres_queries::CONSTRAINTS,
                vec![schema_param.clone(), table_param.clone()],
            ))
            .await
            .map_err(|e| MigrationError::detection(e.to_string()))?;

        let mut primary_columns = Vec::new();
        let mut unique_columns = Vec::new();
        let mut unique_constraint_names = Vec::new();
        for row in &constraint_rows {
            let Some(name) = row.text("constraint_name") else {
                continue;
            };
            let kind = row.text("constraint_type").unwrap_or_default();
            let column = row.text("column_name").map(str::to_string);
            match kind {
                "PRIMARY KEY" => {
                    if let Some(col) = column {
                        primary_columns.push(col);
                    }
                }
                "UNIQUE" => {
                    unique_constraint_names.push(name.to_string());
                    if let Some(col) = column {
                        unique_columns.push(col);
                    }
                }
                "FOREIGN KEY" => {
                    if let Some(col) = column {
                        let entry = schema
                            .constraints
                            .entry(name.to_string())
                            .or_insert_with(|| ConstraintInfo {
                                name: name.to_string(),
                                kind: ConstraintKind::ForeignKey,
                                columns: Vec::new(),
                                referenced_table: row
                                    .text("referenced_table")
                                    .map(str::to_string),
                                referenced_columns: Vec::new(),
                                expression: None,
                            });
                        if !entry.columns.contains(&col) {
                            entry.columns.push(col);
                        }
                        if let Some(ref_col) = row.text("referenced_column") {
                            if !entry.referenced_columns.contains(&ref_col.to_string()) {
                                entry.referenced_columns.push(ref_col.to_string());
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        let column_rows = self
            .executor
            .query(&Statement::with_params(
                postgres_queries::COLUMNS,
                vec![schema_param.clone(), table_param.clone()],
            ))
            .await
            .map_err(|e| MigrationError::detection(e.to_string()))?;

        for row in &column_rows {
            let Some(name) = row.text("column_name") else {
                continue;
            };
            let udt = row.text("udt_name").unwrap_or_default();
            let data_type = row.text("data_type").unwrap_or(udt);
            let default = row.text("column_default").map(str::to_string);
            let auto_increment = default
                .as_deref()
                .is_some_and(|d| d.contains("nextval"));

            let column = ColumnInfo {
                name: name.to_string(),
                logical_type: logical_from_postgres(udt),
                sql_type: data_type.to_string(),
                nullable: row.flag("is_nullable"),
                // Serial defaults are an auto-increment artifact, not a
                // user default.
                default: default.filter(|d| !d.contains("nextval")),
                max_length: row
                    .int("character_maximum_length")
                    .and_then(|l| u32::try_from(l).ok()),
                precision: row
                    .int("numeric_precision")
                    .and_then(|p| u8::try_from(p).ok()),
                scale: row.int("numeric_scale").and_then(|s| u8::try_from(s).ok()),
                primary_key: primary_columns.iter().any(|c| c == name),
                auto_increment,
                unique: unique_columns.iter().any(|c| c == name),
                references: schema
                    .constraints
                    .values()
                    .find(|c| {
                        c.kind == ConstraintKind::ForeignKey
                            && c.columns.len() == 1
                            && c.columns[0] == name
                    })
                    .and_then(|c| {
                        Some(ForeignKeyRef {
                            table: c.referenced_table.clone()?,
                            column: c.referenced_columns.first()?.clone(),
                        })
                    }),
            };
            schema.columns.insert(column.name.clone(), column);
        }

        let index_rows = self
            .executor
            .query(&Statement::with_params(
                postgres_queries::INDEXES,
                vec![schema_param, table_param],
            ))
            .await
            .map_err(|e| MigrationError::detection(e.to_string()))?;

        for row in &index_rows {
            let Some(name) = row.text("index_name") else {
                continue;
            };
            if row.flag("is_primary") {
                continue;
            }
            // Indexes backing a unique constraint surface through the
            // column's unique flag instead.
            if unique_constraint_names.iter().any(|c| c == name) {
                continue;
            }
            let columns: Vec<String> = row
                .text("columns")
                .unwrap_or_default()
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            let mut index = IndexInfo::new(name, columns, row.flag("is_unique"));
            if let Some(method) = row.text("index_method") {
                index.kind = method.to_string();
            }
            schema.indexes.insert(index.name.clone(), index);
        }

        Ok(schema)
    }
}

#[async_trait]
impl Inspector for PostgresInspector {
    async fn current_schema(&self) -> MigrateResult<BTreeMap<String, TableSchema>> {
        let rows = self
            .executor
            .query(&Statement::with_params(
                postgres_queries::TABLES,
                vec![SqlValue::Text(self.database_schema.clone())],
            ))
            .await
            .map_err(|e| MigrationError::detection(e.to_string()))?;

        let mut schemas = BTreeMap::new();
        for row in &rows {
            let Some(table) = row.text("table_name") else {
                continue;
            };
            if is_system_table(table) {
                debug!(table, "excluding system table from inspection");
                continue;
            }
            schemas.insert(table.to_string(), self.table_schema(table).await?);
        }
        Ok(schemas)
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

/// Pragma-based inspector for SQLite.
pub struct SqliteInspector {
    executor: Arc<dyn SqlExecutor>,
}

impl SqliteInspector {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    async fn table_schema(&self, table: &str) -> MigrateResult<TableSchema> {
        let mut schema = TableSchema::new(table);
        let quoted = format!("\"{}\"", table);

        let fk_rows = self
            .executor
            .query(&Statement::new(format!(
                "PRAGMA foreign_key_list({})",
                quoted
            )))
            .await
            .map_err(|e| MigrationError::detection(e.to_string()))?;

        for row in &fk_rows {
            let (Some(from), Some(target)) = (row.text("from"), row.text("table")) else {
                continue;
            };
            let name = format!("fk_{}_{}", table, from);
            let to = row.text("to").unwrap_or("id");
            schema.constraints.insert(
                name.clone(),
                ConstraintInfo {
                    name,
                    kind: ConstraintKind::ForeignKey,
                    columns: vec![from.to_string()],
                    referenced_table: Some(target.to_string()),
                    referenced_columns: vec![to.to_string()],
                    expression: None,
                },
            );
        }

        let column_rows = self
            .executor
            .query(&Statement::new(format!("PRAGMA table_info({})", quoted)))
            .await
            .map_err(|e| MigrationError::detection(e.to_string()))?;

        for row in &column_rows {
            let Some(name) = row.text("name") else {
                continue;
            };
            let declared = row.text("type").unwrap_or("TEXT");
            let primary_key = row.int("pk").unwrap_or(0) > 0;
            let logical_type = logical_from_sqlite(declared);

            let column = ColumnInfo {
                name: name.to_string(),
                logical_type,
                sql_type: declared.to_string(),
                nullable: !row.flag("notnull") && !primary_key,
                default: row.text("dflt_value").map(str::to_string),
                max_length: None,
                precision: None,
                scale: None,
                primary_key,
                // An INTEGER PRIMARY KEY is a rowid alias.
                auto_increment: primary_key && logical_type.is_integer(),
                unique: false,
                references: schema
                    .constraints
                    .values()
                    .find(|c| c.columns.len() == 1 && c.columns[0] == name)
                    .and_then(|c| {
                        Some(ForeignKeyRef {
                            table: c.referenced_table.clone()?,
                            column: c.referenced_columns.first()?.clone(),
                        })
                    }),
            };
            schema.columns.insert(column.name.clone(), column);
        }

        let index_rows = self
            .executor
            .query(&Statement::new(format!("PRAGMA index_list({})", quoted)))
            .await
            .map_err(|e| MigrationError::detection(e.to_string()))?;

        for row in &index_rows {
            let Some(name) = row.text("name") else {
                continue;
            };
            let origin = row.text("origin").unwrap_or("c");
            let unique = row.flag("unique");

            let info_rows = self
                .executor
                .query(&Statement::new(format!(
                    "PRAGMA index_info(\"{}\")",
                    name
                )))
                .await
                .map_err(|e| MigrationError::detection(e.to_string()))?;
            let columns: Vec<String> = info_rows
                .iter()
                .filter_map(|r| r.text("name").map(str::to_string))
                .collect();

            // Constraint-backed indexes surface as column flags.
            if origin != "c" {
                if origin == "u" && columns.len() == 1 {
                    if let Some(column) = schema.columns.get_mut(&columns[0]) {
                        column.unique = true;
                    }
                }
                continue;
            }

            schema
                .indexes
                .insert(name.to_string(), IndexInfo::new(name, columns, unique));
        }

        Ok(schema)
    }
}

#[async_trait]
impl Inspector for SqliteInspector {
    async fn current_schema(&self) -> MigrateResult<BTreeMap<String, TableSchema>> {
        let rows = self
            .executor
            .query(&Statement::new(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            ))
            .await
            .map_err(|e| MigrationError::detection(e.to_string()))?;

        let mut schemas = BTreeMap::new();
        for row in &rows {
            let Some(table) = row.text("name") else {
                continue;
            };
            if is_system_table(table) {
                debug!(table, "excluding system table from inspection");
                continue;
            }
            schemas.insert(table.to_string(), self.table_schema(table).await?);
        }
        Ok(schemas)
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

/// Placeholder inspector for MySQL.
///
/// Schema inspection for MySQL is a deferred capability; surfacing an
/// explicit error beats silently reporting an empty schema (which would
/// diff as "create everything").
pub struct MysqlInspector;

#[async_trait]
impl Inspector for MysqlInspector {
    async fn current_schema(&self) -> MigrateResult<BTreeMap<String, TableSchema>> {
        Err(MigrationError::not_implemented(
            "MySQL schema inspection",
        ))
    }

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }
}

/// Map a PostgreSQL `udt_name` to a logical type.
fn logical_from_postgres(udt: &str) -> LogicalType {
    match udt {
        "int2" | "int4" | "integer" | "smallint" => LogicalType::Int,
        "int8" | "bigint" => LogicalType::Int64,
        "float4" | "float8" | "real" => LogicalType::Float64,
        "numeric" | "money" => LogicalType::Decimal,
        "varchar" | "bpchar" | "character varying" | "character" | "char" => LogicalType::String,
        "text" | "name" => LogicalType::Text,
        "bool" => LogicalType::Bool,
        "timestamp" | "timestamptz" | "date" => LogicalType::Timestamp,
        "bytea" => LogicalType::Bytes,
        _ => LogicalType::Text,
    }
}

/// Map a SQLite declared type to a logical type by affinity.
fn logical_from_sqlite(declared: &str) -> LogicalType {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("BIGINT") {
        LogicalType::Int64
    } else if upper.contains("INT") || upper.contains("BOOL") {
        if upper.contains("BOOL") {
            LogicalType::Bool
        } else {
            LogicalType::Int
        }
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        LogicalType::Float64
    } else if upper.contains("NUMERIC") || upper.contains("DECIMAL") {
        LogicalType::Decimal
    } else if upper.contains("BLOB") {
        LogicalType::Bytes
    } else if upper.contains("DATE") || upper.contains("TIME") {
        LogicalType::Timestamp
    } else {
        LogicalType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::ScriptedExecutor;
    use crate::executor::SqlRow;

    #[test]
    fn test_system_table_exclusion() {
        assert!(is_system_table("schema_migrations"));
        assert!(is_system_table("_strata_migration_history"));
        assert!(is_system_table("_prisma_migrations"));
        assert!(!is_system_table("users"));
    }

    #[test]
    fn test_logical_mapping() {
        assert_eq!(logical_from_postgres("int8"), LogicalType::Int64);
        assert_eq!(logical_from_postgres("varchar"), LogicalType::String);
        assert_eq!(logical_from_sqlite("INTEGER"), LogicalType::Int);
        assert_eq!(logical_from_sqlite("BOOLEAN"), LogicalType::Bool);
        assert_eq!(logical_from_sqlite("VARCHAR(80)"), LogicalType::Text);
    }

    #[tokio::test]
    async fn test_mysql_inspector_is_deferred() {
        let err = MysqlInspector.current_schema().await.unwrap_err();
        assert!(matches!(err, MigrationError::NotImplemented(_)));
    }

    #[tokio::test]
    async fn test_sqlite_inspector_reads_pragmas() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.script_query(
            "sqlite_master",
            vec![
                SqlRow::new().with("name", "users"),
                SqlRow::new().with("name", "schema_migrations"),
            ],
        );
        executor.script_query(
            "PRAGMA table_info(\"users\")",
            vec![
                SqlRow::new()
                    .with("name", "id")
                    .with("type", "INTEGER")
                    .with("notnull", 1i64)
                    .with("dflt_value", SqlValue::Null)
                    .with("pk", 1i64),
                SqlRow::new()
                    .with("name", "email")
                    .with("type", "TEXT")
                    .with("notnull", 1i64)
                    .with("dflt_value", SqlValue::Null)
                    .with("pk", 0i64),
            ],
        );
        executor.script_query(
            "PRAGMA index_list(\"users\")",
            vec![
                SqlRow::new()
                    .with("name", "sqlite_autoindex_users_1")
                    .with("unique", 1i64)
                    .with("origin", "u"),
                SqlRow::new()
                    .with("name", "idx_users_email")
                    .with("unique", 0i64)
                    .with("origin", "c"),
            ],
        );
        executor.script_query(
            "PRAGMA index_info(\"sqlite_autoindex_users_1\")",
            vec![SqlRow::new().with("name", "email")],
        );
        executor.script_query(
            "PRAGMA index_info(\"idx_users_email\")",
            vec![SqlRow::new().with("name", "email")],
        );

        let inspector = SqliteInspector::new(executor);
        let schema = inspector.current_schema().await.unwrap();

        // The tracking table is excluded.
        assert_eq!(schema.len(), 1);
        let users = &schema["users"];
        let id = &users.columns["id"];
        assert!(id.primary_key);
        assert!(id.auto_increment);
        let email = &users.columns["email"];
        assert!(!email.nullable);
        // The unique-constraint autoindex became a column flag...
        assert!(email.unique);
        assert!(!users.indexes.contains_key("sqlite_autoindex_users_1"));
        // ...while the created index is reported as an index.
        assert!(users.indexes.contains_key("idx_users_email"));
    }

    #[tokio::test]
    async fn test_postgres_inspector_excludes_system_tables() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.script_query(
            "information_schema.tables",
            vec![
                SqlRow::new().with("table_name", "_strata_model_snapshots"),
                SqlRow::new().with("table_name", "users"),
            ],
        );
        executor.script_query(
            "information_schema.columns",
            vec![
                SqlRow::new()
                    .with("column_name", "id")
                    .with("data_type", "bigint")
                    .with("udt_name", "int8")
                    .with("character_maximum_length", SqlValue::Null)
                    .with("numeric_precision", SqlValue::Null)
                    .with("numeric_scale", SqlValue::Null)
                    .with("is_nullable", false)
                    .with("column_default", "nextval('users_id_seq'::regclass)"),
            ],
        );
        executor.script_query(
            "information_schema.table_constraints",
            vec![
                SqlRow::new()
                    .with("constraint_name", "users_pkey")
                    .with("constraint_type", "PRIMARY KEY")
                    .with("column_name", "id")
                    .with("referenced_table", SqlValue::Null)
                    .with("referenced_column", SqlValue::Null),
            ],
        );
        executor.script_query("pg_index", vec![]);

        let inspector = PostgresInspector::new(executor);
        let schema = inspector.current_schema().await.unwrap();

        assert_eq!(schema.len(), 1);
        let id = &schema["users"].columns["id"];
        assert!(id.primary_key);
        assert!(id.auto_increment);
        assert!(id.default.is_none());
        assert_eq!(id.logical_type, LogicalType::Int64);
    }
}
