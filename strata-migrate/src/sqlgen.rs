//! DDL generation from migration plans.

use strata_schema::{ColumnInfo, ConstraintKind, Dialect, IndexInfo, ModelSnapshot};

use crate::diff::{ChangeKind, MigrationChange, MigrationPlan};
use crate::error::{MigrateResult, MigrationError};

/// Rendered scripts plus the metadata the migration file carries.
#[derive(Debug, Clone)]
pub struct MigrationScript {
    /// Forward statements, with section-header comments interleaved.
    pub up: Vec<String>,
    /// Inverse statements, in reverse change order.
    pub down: Vec<String>,
    /// Plan checksum this script was generated from.
    pub checksum: String,
    /// Whether the plan contained destructive changes.
    pub has_destructive: bool,
    /// Whether the plan required review.
    pub requires_review: bool,
    /// Number of changes rendered.
    pub change_count: usize,
}

/// Renders a [`MigrationPlan`] into dialect-specific DDL.
pub struct SqlGenerator {
    dialect: Dialect,
}

impl SqlGenerator {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Generate up and down scripts for a plan.
    pub fn generate(&self, plan: &MigrationPlan) -> MigrateResult<MigrationScript> {
        let mut up = Vec::new();
        let mut last_kind: Option<ChangeKind> = None;

        for change in &plan.changes {
            if last_kind != Some(change.kind) {
                up.push(format!("-- {}", section_header(change.kind)));
                last_kind = Some(change.kind);
            }
            up.extend(self.up_statements(plan, change)?);
        }

        let mut down = Vec::new();
        for change in plan.changes.iter().rev() {
            down.extend(self.down_statements(change)?);
        }

        Ok(MigrationScript {
            up,
            down,
            checksum: plan.checksum.clone(),
            has_destructive: plan.has_destructive(),
            requires_review: plan.requires_review(),
            change_count: plan.changes.len(),
        })
    }

    fn up_statements(
        &self,
        plan: &MigrationPlan,
        change: &MigrationChange,
    ) -> MigrateResult<Vec<String>> {
        match change.kind {
            ChangeKind::CreateTable => {
                let model = plan.models.get(&change.table).ok_or_else(|| {
                    MigrationError::generation(format!(
                        "no snapshot for table '{}' in plan",
                        change.table
                    ))
                })?;
                Ok(vec![self.create_table(model)])
            }
            ChangeKind::DropTable => Ok(vec![self.drop_table(&change.table)]),
            ChangeKind::AddColumn => {
                let column = change.new.as_ref().ok_or_else(|| {
                    MigrationError::generation("add-column change without a column definition")
                })?;
                Ok(vec![self.add_column(&change.table, column)])
            }
            ChangeKind::DropColumn => {
                let name = change.column.as_deref().ok_or_else(|| {
                    MigrationError::generation("drop-column change without a column name")
                })?;
                Ok(vec![self.drop_column(&change.table, name)])
            }
            ChangeKind::AlterColumn => {
                let (old, new) = match (&change.old, &change.new) {
                    (Some(old), Some(new)) => (old, new),
                    _ => {
                        return Err(MigrationError::generation(
                            "alter-column change without old and new definitions",
                        ));
                    }
                };
                self.alter_column(&change.table, old, new)
            }
            ChangeKind::CreateIndex => {
                let index = change.index_def.as_ref().ok_or_else(|| {
                    MigrationError::generation("create-index change without an index definition")
                })?;
                Ok(vec![self.create_index(&change.table, index)])
            }
            ChangeKind::DropIndex => {
                let name = change.index.as_deref().ok_or_else(|| {
                    MigrationError::generation("drop-index change without an index name")
                })?;
                Ok(vec![self.drop_index(&change.table, name)])
            }
        }
    }

    /// The structural inverse of a change. Changes with no well-defined
    /// inverse contribute nothing rather than guessing.
    fn down_statements(&self, change: &MigrationChange) -> MigrateResult<Vec<String>> {
        match change.kind {
            ChangeKind::CreateTable => Ok(vec![self.drop_table(&change.table)]),
            // Recreating a dropped table would need its full prior state.
            ChangeKind::DropTable => Ok(Vec::new()),
            ChangeKind::AddColumn => {
                let name = change
                    .column
                    .as_deref()
                    .or(change.new.as_ref().map(|c| c.name.as_str()));
                Ok(name
                    .map(|n| vec![self.drop_column(&change.table, n)])
                    .unwrap_or_default())
            }
            ChangeKind::DropColumn => Ok(change
                .old
                .as_ref()
                .map(|column| vec![self.add_column(&change.table, column)])
                .unwrap_or_default()),
            ChangeKind::AlterColumn => match (&change.old, &change.new) {
                (Some(old), Some(new)) => self.alter_column(&change.table, new, old),
                _ => Ok(Vec::new()),
            },
            ChangeKind::CreateIndex => {
                let name = change
                    .index
                    .as_deref()
                    .or(change.index_def.as_ref().map(|i| i.name.as_str()));
                Ok(name
                    .map(|n| vec![self.drop_index(&change.table, n)])
                    .unwrap_or_default())
            }
            ChangeKind::DropIndex => Ok(change
                .index_def
                .as_ref()
                .map(|index| vec![self.create_index(&change.table, index)])
                .unwrap_or_default()),
        }
    }

    fn create_table(&self, model: &ModelSnapshot) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut inline_pk = false;

        for column in model.columns.values() {
            let definition = self.column_definition(column);
            if self.dialect == Dialect::Sqlite
                && column.primary_key
                && column.auto_increment
                && column.logical_type.is_integer()
            {
                inline_pk = true;
            }
            parts.push(definition);
        }

        let primary_key = model.primary_key();
        if !primary_key.is_empty() && !inline_pk {
            let cols: Vec<String> = primary_key
                .iter()
                .map(|c| self.dialect.quote(c))
                .collect();
            parts.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }

        for constraint in model.constraints.values() {
            match constraint.kind {
                ConstraintKind::ForeignKey => {
                    let Some(table) = constraint.referenced_table.as_ref() else {
                        continue;
                    };
                    if constraint.referenced_columns.is_empty() {
                        continue;
                    }
                    let cols: Vec<String> = constraint
                        .columns
                        .iter()
                        .map(|c| self.dialect.quote(c))
                        .collect();
                    let ref_cols: Vec<String> = constraint
                        .referenced_columns
                        .iter()
                        .map(|c| self.dialect.quote(c))
                        .collect();
                    parts.push(format!(
                        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                        self.dialect.quote(&constraint.name),
                        cols.join(", "),
                        self.dialect.quote(table),
                        ref_cols.join(", ")
                    ));
                }
                ConstraintKind::Check => {
                    if let Some(expr) = &constraint.expression {
                        parts.push(format!(
                            "CONSTRAINT {} CHECK ({})",
                            self.dialect.quote(&constraint.name),
                            expr
                        ));
                    }
                }
                ConstraintKind::Unique => {
                    let cols: Vec<String> = constraint
                        .columns
                        .iter()
                        .map(|c| self.dialect.quote(c))
                        .collect();
                    parts.push(format!(
                        "CONSTRAINT {} UNIQUE ({})",
                        self.dialect.quote(&constraint.name),
                        cols.join(", ")
                    ));
                }
            }
        }

        let table_clause = match self.dialect {
            Dialect::MySql => " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            _ => "",
        };

        format!(
            "CREATE TABLE {} (\n    {}\n){};",
            self.dialect.quote(&model.table_name),
            parts.join(",\n    "),
            table_clause
        )
    }

    /// Compose one column definition: type, nullability, uniqueness,
    /// default, with the dialect's auto-increment placement.
    fn column_definition(&self, column: &ColumnInfo) -> String {
        let mut parts = vec![self.dialect.quote(&column.name)];

        if column.auto_increment && column.logical_type.is_integer() {
            parts.push(self.dialect.auto_increment_type(column.logical_type));
            // SQLite's idiom already carries the PRIMARY KEY clause and
            // NOT NULL semantics.
            if self.dialect == Dialect::Sqlite {
                return parts.join(" ");
            }
        } else {
            parts.push(column.sql_type.clone());
        }

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }

    fn drop_table(&self, table: &str) -> String {
        match self.dialect {
            Dialect::Postgres => {
                format!("DROP TABLE IF EXISTS {} CASCADE;", self.dialect.quote(table))
            }
            _ => format!("DROP TABLE IF EXISTS {};", self.dialect.quote(table)),
        }
    }

    fn add_column(&self, table: &str, column: &ColumnInfo) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {};",
            self.dialect.quote(table),
            self.column_definition(column)
        )
    }

    fn drop_column(&self, table: &str, column: &str) -> String {
        match self.dialect {
            Dialect::Postgres => format!(
                "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
                self.dialect.quote(table),
                self.dialect.quote(column)
            ),
            _ => format!(
                "ALTER TABLE {} DROP COLUMN {};",
                self.dialect.quote(table),
                self.dialect.quote(column)
            ),
        }
    }

    fn alter_column(
        &self,
        table: &str,
        old: &ColumnInfo,
        new: &ColumnInfo,
    ) -> MigrateResult<Vec<String>> {
        if !self.dialect.supports_alter_column() {
            return Err(MigrationError::generation(format!(
                "{} does not support altering column '{}.{}'; recreate the table instead",
                self.dialect, table, new.name
            )));
        }

        let quoted_table = self.dialect.quote(table);
        let quoted_column = self.dialect.quote(&new.name);
        let mut statements = Vec::new();

        match self.dialect {
            Dialect::Postgres => {
                if !self.dialect.types_compatible(&old.sql_type, &new.sql_type)
                    || old.max_length != new.max_length
                {
                    statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
                        quoted_table, quoted_column, new.sql_type, quoted_column, new.sql_type
                    ));
                }
                if old.nullable != new.nullable {
                    if new.nullable {
                        statements.push(format!(
                            "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL;",
                            quoted_table, quoted_column
                        ));
                    } else {
                        statements.push(format!(
                            "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL;",
                            quoted_table, quoted_column
                        ));
                    }
                }
                if old.default != new.default {
                    match &new.default {
                        Some(default) => statements.push(format!(
                            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                            quoted_table, quoted_column, default
                        )),
                        None => statements.push(format!(
                            "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;",
                            quoted_table, quoted_column
                        )),
                    }
                }
            }
            Dialect::MySql => {
                // MySQL restates the full definition.
                statements.push(format!(
                    "ALTER TABLE {} MODIFY COLUMN {};",
                    quoted_table,
                    self.column_definition(new)
                ));
            }
            Dialect::Sqlite => unreachable!("guarded by supports_alter_column"),
        }

        Ok(statements)
    }

    fn create_index(&self, table: &str, index: &IndexInfo) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        let cols: Vec<String> = index
            .columns
            .iter()
            .map(|c| self.dialect.quote(c))
            .collect();
        format!(
            "CREATE {}INDEX {} ON {} ({});",
            unique,
            self.dialect.quote(&index.name),
            self.dialect.quote(table),
            cols.join(", ")
        )
    }

    fn drop_index(&self, table: &str, name: &str) -> String {
        match self.dialect {
            Dialect::MySql => format!(
                "DROP INDEX {} ON {};",
                self.dialect.quote(name),
                self.dialect.quote(table)
            ),
            _ => format!("DROP INDEX IF EXISTS {};", self.dialect.quote(name)),
        }
    }
}

fn section_header(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::CreateTable => "Create tables",
        ChangeKind::AddColumn => "Add columns",
        ChangeKind::AlterColumn => "Alter columns",
        ChangeKind::CreateIndex => "Create indexes",
        ChangeKind::DropIndex => "Drop indexes",
        ChangeKind::DropColumn => "Drop columns",
        ChangeKind::DropTable => "Drop tables",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use strata_schema::{
        Dialect, Entity, EntityDescriptor, FieldDescriptor, LogicalType, ModelRegistry,
    };

    use crate::diff::ChangeDetector;

    struct User;
    impl Entity for User {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::new("User")
                .column(FieldDescriptor::new("id", LogicalType::Int64).primary_key())
                .column(
                    FieldDescriptor::new("email", LogicalType::String)
                        .max_length(255)
                        .unique(),
                )
        }
    }

    fn plan_for(dialect: Dialect) -> MigrationPlan {
        let mut registry = ModelRegistry::new(dialect);
        registry.register::<User>();
        ChangeDetector::new(&registry, dialect)
            .detect(&BTreeMap::new())
            .unwrap()
    }

    #[test]
    fn test_postgres_create_table() {
        let plan = plan_for(Dialect::Postgres);
        let script = SqlGenerator::new(Dialect::Postgres).generate(&plan).unwrap();

        let sql = script.up.join("\n");
        assert!(sql.contains("-- Create tables"));
        assert!(sql.contains("CREATE TABLE \"users\""));
        assert!(sql.contains("\"id\" BIGSERIAL"));
        assert!(sql.contains("\"email\" VARCHAR(255) NOT NULL UNIQUE"));
        assert!(sql.contains("PRIMARY KEY (\"id\")"));
        assert_eq!(script.checksum, plan.checksum);
        assert!(!script.has_destructive);
    }

    #[test]
    fn test_mysql_create_table() {
        let plan = plan_for(Dialect::MySql);
        let script = SqlGenerator::new(Dialect::MySql).generate(&plan).unwrap();

        let sql = script.up.join("\n");
        assert!(sql.contains("CREATE TABLE `users`"));
        assert!(sql.contains("`id` BIGINT AUTO_INCREMENT"));
        assert!(sql.contains("ENGINE=InnoDB"));
    }

    #[test]
    fn test_sqlite_create_table_inlines_primary_key() {
        let plan = plan_for(Dialect::Sqlite);
        let script = SqlGenerator::new(Dialect::Sqlite).generate(&plan).unwrap();

        let sql = script.up.join("\n");
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        // No duplicate table-level primary key clause.
        assert!(!sql.contains("PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn test_down_script_drops_created_table() {
        let plan = plan_for(Dialect::Postgres);
        let script = SqlGenerator::new(Dialect::Postgres).generate(&plan).unwrap();
        assert_eq!(script.down.len(), 1);
        assert!(script.down[0].contains("DROP TABLE IF EXISTS \"users\""));
    }

    #[test]
    fn test_foreign_key_clause() {
        let mut registry = ModelRegistry::new(Dialect::Postgres);
        registry.register::<User>();
        registry.register_entity(
            EntityDescriptor::new("Order")
                .column(FieldDescriptor::new("id", LogicalType::Int64).primary_key())
                .column(
                    FieldDescriptor::new("user_id", LogicalType::Int64).references("users", "id"),
                ),
        );
        let plan = ChangeDetector::new(&registry, Dialect::Postgres)
            .detect(&BTreeMap::new())
            .unwrap();
        let script = SqlGenerator::new(Dialect::Postgres).generate(&plan).unwrap();

        let sql = script.up.join("\n");
        assert!(sql.contains(
            "CONSTRAINT \"fk_orders_user_id\" FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\")"
        ));
        // Dependency order: users created before orders.
        let users_at = sql.find("CREATE TABLE \"users\"").unwrap();
        let orders_at = sql.find("CREATE TABLE \"orders\"").unwrap();
        assert!(users_at < orders_at);
    }

    #[test]
    fn test_sqlite_alter_column_is_unsupported() {
        use strata_schema::{ColumnInfo, TableSchema};

        let mut registry = ModelRegistry::new(Dialect::Sqlite);
        registry.register::<User>();

        let snapshot = registry.get("users").unwrap().clone();
        let mut drifted = TableSchema {
            name: snapshot.table_name.clone(),
            columns: snapshot.columns.clone(),
            indexes: snapshot.indexes.clone(),
            constraints: snapshot.constraints.clone(),
        };
        let email: &mut ColumnInfo = drifted.columns.get_mut("email").unwrap();
        email.nullable = true;

        let mut database = BTreeMap::new();
        database.insert("users".to_string(), drifted);

        let plan = ChangeDetector::new(&registry, Dialect::Sqlite)
            .detect(&database)
            .unwrap();
        let err = SqlGenerator::new(Dialect::Sqlite).generate(&plan).unwrap_err();
        assert!(matches!(err, MigrationError::Generation(_)));
        assert!(err.to_string().contains("sqlite"));
    }

    #[test]
    fn test_alter_column_down_swaps_old_and_new() {
        use strata_schema::{ColumnInfo, TableSchema};

        let mut registry = ModelRegistry::new(Dialect::Postgres);
        registry.register::<User>();

        let snapshot = registry.get("users").unwrap().clone();
        let mut drifted = TableSchema {
            name: snapshot.table_name.clone(),
            columns: snapshot.columns.clone(),
            indexes: snapshot.indexes.clone(),
            constraints: snapshot.constraints.clone(),
        };
        let email: &mut ColumnInfo = drifted.columns.get_mut("email").unwrap();
        email.nullable = true;

        let mut database = BTreeMap::new();
        database.insert("users".to_string(), drifted);

        let plan = ChangeDetector::new(&registry, Dialect::Postgres)
            .detect(&database)
            .unwrap();
        let script = SqlGenerator::new(Dialect::Postgres).generate(&plan).unwrap();

        // Up tightens to NOT NULL, down relaxes it again.
        assert!(script.up.iter().any(|s| s.contains("SET NOT NULL")));
        assert!(script.down.iter().any(|s| s.contains("DROP NOT NULL")));
    }

    #[test]
    fn test_drop_index_down_recreates_index() {
        let mut registry = ModelRegistry::new(Dialect::Postgres);
        registry.register::<User>();
        let snapshot = registry.get("users").unwrap().clone();
        let mut with_index = strata_schema::TableSchema {
            name: snapshot.table_name.clone(),
            columns: snapshot.columns.clone(),
            indexes: snapshot.indexes.clone(),
            constraints: snapshot.constraints.clone(),
        };
        with_index.indexes.insert(
            "idx_users_stale".to_string(),
            IndexInfo::new("idx_users_stale", vec!["email".to_string()], false),
        );
        let mut database = BTreeMap::new();
        database.insert("users".to_string(), with_index);

        let plan = ChangeDetector::new(&registry, Dialect::Postgres)
            .detect(&database)
            .unwrap();
        let script = SqlGenerator::new(Dialect::Postgres).generate(&plan).unwrap();

        assert!(script.up.iter().any(|s| s.contains("DROP INDEX IF EXISTS \"idx_users_stale\"")));
        assert!(script
            .down
            .iter()
            .any(|s| s.contains("CREATE INDEX \"idx_users_stale\" ON \"users\" (\"email\")")));
    }
}
