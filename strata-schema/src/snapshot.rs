//! Structural snapshots of tables, columns, indexes and constraints.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::checksum;
use crate::types::LogicalType;

/// A foreign-key target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
}

/// Structural description of a single column.
///
/// Produced by both the model registry (desired state) and the database
/// inspector (actual state); the two sides are compared field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Canonical logical type.
    pub logical_type: LogicalType,
    /// Dialect-rendered SQL type.
    pub sql_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default value expression, if any.
    pub default: Option<String>,
    /// Maximum character length, if bounded.
    pub max_length: Option<u32>,
    /// Numeric precision, if exact numeric.
    pub precision: Option<u8>,
    /// Numeric scale, if exact numeric.
    pub scale: Option<u8>,
    /// Whether the column is (part of) the primary key.
    pub primary_key: bool,
    /// Whether the column auto-increments.
    pub auto_increment: bool,
    /// Whether the column carries a single-column unique constraint.
    pub unique: bool,
    /// Foreign-key reference, if any.
    pub references: Option<ForeignKeyRef>,
}

impl ColumnInfo {
    /// Canonical one-line form used in checksums.
    pub fn fingerprint(&self) -> String {
        format!(
            "col:{}:{}:{}:null={}:default={}:len={}:pk={}:auto={}:unique={}:ref={}",
            self.name,
            self.logical_type,
            self.sql_type.to_ascii_lowercase(),
            self.nullable,
            self.default.as_deref().unwrap_or("-"),
            self.max_length.map(|l| l.to_string()).unwrap_or_else(|| "-".into()),
            self.primary_key,
            self.auto_increment,
            self.unique,
            self.references
                .as_ref()
                .map(|r| format!("{}.{}", r.table, r.column))
                .unwrap_or_else(|| "-".into()),
        )
    }
}

/// Structural description of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Ordered column list.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Index kind (access method), e.g. `btree`.
    pub kind: String,
}

impl IndexInfo {
    pub fn new(name: impl Into<String>, columns: Vec<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            columns,
            unique,
            kind: "btree".to_string(),
        }
    }

    /// Canonical one-line form used in checksums.
    pub fn fingerprint(&self) -> String {
        format!(
            "idx:{}:{}:unique={}:kind={}",
            self.name,
            self.columns.join(","),
            self.unique,
            self.kind
        )
    }
}

/// Constraint kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    ForeignKey,
    Unique,
    Check,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::ForeignKey => "foreign_key",
            ConstraintKind::Unique => "unique",
            ConstraintKind::Check => "check",
        }
    }
}

/// Structural description of a table constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintInfo {
    /// Constraint name.
    pub name: String,
    /// Constraint kind.
    pub kind: ConstraintKind,
    /// Owning columns.
    pub columns: Vec<String>,
    /// Referenced table, for foreign keys.
    pub referenced_table: Option<String>,
    /// Referenced columns, for foreign keys.
    pub referenced_columns: Vec<String>,
    /// Check expression, for check constraints.
    pub expression: Option<String>,
}

impl ConstraintInfo {
    /// Canonical one-line form used in checksums.
    pub fn fingerprint(&self) -> String {
        format!(
            "con:{}:{}:{}:ref={}:{}:expr={}",
            self.name,
            self.kind.as_str(),
            self.columns.join(","),
            self.referenced_table.as_deref().unwrap_or("-"),
            self.referenced_columns.join(","),
            self.expression.as_deref().unwrap_or("-"),
        )
    }
}

/// An immutable structural snapshot of one registered model.
///
/// Columns keep declaration order (it matters for rendered DDL); the
/// checksum is computed over name-sorted content so map order never
/// affects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Table name the model maps to.
    pub table_name: String,
    /// Columns in declaration order.
    pub columns: IndexMap<String, ColumnInfo>,
    /// Indexes by name.
    pub indexes: BTreeMap<String, IndexInfo>,
    /// Constraints by name.
    pub constraints: BTreeMap<String, ConstraintInfo>,
    /// Deterministic checksum of the snapshot contents.
    pub checksum: String,
}

impl ModelSnapshot {
    /// Build a snapshot, computing its checksum.
    pub fn new(
        table_name: impl Into<String>,
        columns: IndexMap<String, ColumnInfo>,
        indexes: BTreeMap<String, IndexInfo>,
        constraints: BTreeMap<String, ConstraintInfo>,
    ) -> Self {
        let table_name = table_name.into();
        let checksum = checksum::snapshot_checksum(&table_name, &columns, &indexes, &constraints);
        Self {
            table_name,
            columns,
            indexes,
            constraints,
            checksum,
        }
    }

    /// Primary-key column names, in declaration order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .values()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Foreign-key constraints of this model.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ConstraintInfo> {
        self.constraints
            .values()
            .filter(|c| c.kind == ConstraintKind::ForeignKey)
    }
}

/// The database inspector's mirror of [`ModelSnapshot`].
///
/// Built fresh on every inspection call; never persisted.
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: IndexMap<String, ColumnInfo>,
    /// Indexes by name.
    pub indexes: BTreeMap<String, IndexInfo>,
    /// Constraints by name.
    pub constraints: BTreeMap<String, ConstraintInfo>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            logical_type: LogicalType::Text,
            sql_type: "TEXT".to_string(),
            nullable: false,
            default: None,
            max_length: None,
            precision: None,
            scale: None,
            primary_key: false,
            auto_increment: false,
            unique: false,
            references: None,
        }
    }

    #[test]
    fn test_fingerprint_reflects_nullability() {
        let a = column("email");
        let mut b = column("email");
        b.nullable = true;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_snapshot_checksum_ignores_insertion_order() {
        let mut forward = IndexMap::new();
        forward.insert("a".to_string(), column("a"));
        forward.insert("b".to_string(), column("b"));

        let mut reverse = IndexMap::new();
        reverse.insert("b".to_string(), column("b"));
        reverse.insert("a".to_string(), column("a"));

        let s1 = ModelSnapshot::new("t", forward, BTreeMap::new(), BTreeMap::new());
        let s2 = ModelSnapshot::new("t", reverse, BTreeMap::new(), BTreeMap::new());
        assert_eq!(s1.checksum, s2.checksum);
    }

    #[test]
    fn test_primary_key_order() {
        let mut columns = IndexMap::new();
        let mut id = column("id");
        id.primary_key = true;
        columns.insert("id".to_string(), id);
        columns.insert("email".to_string(), column("email"));

        let snapshot = ModelSnapshot::new("users", columns, BTreeMap::new(), BTreeMap::new());
        assert_eq!(snapshot.primary_key(), vec!["id"]);
    }
}
