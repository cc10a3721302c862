//! The model registry.

use indexmap::IndexMap;
use std::collections::BTreeMap;
use tracing::debug;

use crate::descriptor::{Entity, EntityDescriptor, FieldDescriptor};
use crate::dialect::Dialect;
use crate::snapshot::{ColumnInfo, ConstraintInfo, ConstraintKind, IndexInfo, ModelSnapshot};

/// Holds one immutable [`ModelSnapshot`] per registered table.
///
/// Registries are plain values wired explicitly into whatever needs them
/// (change detector, migrator); there is no ambient global registry.
/// Re-registering a table supersedes its previous snapshot.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    dialect: Dialect,
    snapshots: IndexMap<String, ModelSnapshot>,
}

impl ModelRegistry {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            snapshots: IndexMap::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Register an entity type.
    pub fn register<E: Entity>(&mut self) -> &ModelSnapshot {
        self.register_entity(E::descriptor())
    }

    /// Register a descriptor directly.
    pub fn register_entity(&mut self, descriptor: EntityDescriptor) -> &ModelSnapshot {
        let table = descriptor.resolved_table_name();

        let mut columns = IndexMap::new();
        let mut indexes = BTreeMap::new();
        let mut constraints = BTreeMap::new();

        for field in descriptor.flattened_columns() {
            if field.skip {
                debug!(table = %table, field = %field.name, "skipping excluded field");
                continue;
            }
            let column = self.derive_column(field);

            if field.indexed {
                let name = format!("idx_{}_{}", table, field.name);
                indexes.insert(
                    name.clone(),
                    IndexInfo::new(name, vec![field.name.clone()], false),
                );
            }
            if field.unique_index {
                let name = format!("uidx_{}_{}", table, field.name);
                indexes.insert(
                    name.clone(),
                    IndexInfo::new(name, vec![field.name.clone()], true),
                );
            }
            if let Some(reference) = &field.references {
                let name = format!("fk_{}_{}", table, field.name);
                constraints.insert(
                    name.clone(),
                    ConstraintInfo {
                        name,
                        kind: ConstraintKind::ForeignKey,
                        columns: vec![field.name.clone()],
                        referenced_table: Some(reference.table.clone()),
                        referenced_columns: vec![reference.column.clone()],
                        expression: None,
                    },
                );
            }
            if let Some(expr) = &field.check {
                let name = format!("chk_{}_{}", table, field.name);
                constraints.insert(
                    name.clone(),
                    ConstraintInfo {
                        name,
                        kind: ConstraintKind::Check,
                        columns: vec![field.name.clone()],
                        referenced_table: None,
                        referenced_columns: Vec::new(),
                        expression: Some(expr.clone()),
                    },
                );
            }

            columns.insert(column.name.clone(), column);
        }

        let snapshot = ModelSnapshot::new(table.clone(), columns, indexes, constraints);
        debug!(table = %table, checksum = %snapshot.checksum, "registered model");
        self.snapshots.insert(table.clone(), snapshot);
        &self.snapshots[&table]
    }

    fn derive_column(&self, field: &FieldDescriptor) -> ColumnInfo {
        // Integer primary keys take the dialect's auto-increment idiom.
        let auto_increment =
            field.auto_increment || (field.primary_key && field.logical_type.is_integer());

        let sql_type = field.sql_type_override.clone().unwrap_or_else(|| {
            self.dialect
                .sql_type(field.logical_type, field.max_length, field.precision, field.scale)
        });

        ColumnInfo {
            name: field.name.clone(),
            logical_type: field.logical_type,
            sql_type,
            nullable: field.nullable && !field.primary_key,
            default: field.default.clone(),
            max_length: field.max_length,
            precision: field.precision,
            scale: field.scale,
            primary_key: field.primary_key,
            auto_increment,
            unique: field.unique,
            references: field.references.clone(),
        }
    }

    /// All snapshots, keyed by table name.
    pub fn models(&self) -> &IndexMap<String, ModelSnapshot> {
        &self.snapshots
    }

    /// Snapshot for one table.
    pub fn get(&self, table: &str) -> Option<&ModelSnapshot> {
        self.snapshots.get(table)
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }
}
