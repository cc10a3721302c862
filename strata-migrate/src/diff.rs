//! Change detection: diffing registered models against the live schema.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use strata_schema::{
    checksum, ColumnInfo, Dialect, IndexInfo, ModelRegistry, ModelSnapshot, TableSchema,
};

use crate::error::{MigrateResult, MigrationError};

/// The kind of a single structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    CreateTable,
    AddColumn,
    AlterColumn,
    CreateIndex,
    DropIndex,
    DropColumn,
    DropTable,
}

impl ChangeKind {
    /// Fixed ordering priority: creates before the objects that depend on
    /// them, drops in safe reverse order.
    pub fn priority(&self) -> u8 {
        match self {
            ChangeKind::CreateTable => 0,
            ChangeKind::AddColumn => 1,
            ChangeKind::AlterColumn => 2,
            ChangeKind::CreateIndex => 3,
            ChangeKind::DropIndex => 4,
            ChangeKind::DropColumn => 5,
            ChangeKind::DropTable => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::CreateTable => "create_table",
            ChangeKind::AddColumn => "add_column",
            ChangeKind::AlterColumn => "alter_column",
            ChangeKind::CreateIndex => "create_index",
            ChangeKind::DropIndex => "drop_index",
            ChangeKind::DropColumn => "drop_column",
            ChangeKind::DropTable => "drop_table",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single atomic structural operation.
#[derive(Debug, Clone)]
pub struct MigrationChange {
    pub kind: ChangeKind,
    /// Owning table.
    pub table: String,
    /// Column name, for column-level changes.
    pub column: Option<String>,
    /// Index name, for index-level changes.
    pub index: Option<String>,
    /// Column state before the change (drop/alter).
    pub old: Option<ColumnInfo>,
    /// Column state after the change (add/alter).
    pub new: Option<ColumnInfo>,
    /// Index definition (create, and drop for invertibility).
    pub index_def: Option<IndexInfo>,
    /// Whether the change can discard existing data.
    pub destructive: bool,
    /// Whether applying it safely needs a data migration.
    pub requires_data_migration: bool,
    /// Human-readable description.
    pub description: String,
}

impl MigrationChange {
    fn new(kind: ChangeKind, table: &str, description: String) -> Self {
        Self {
            kind,
            table: table.to_string(),
            column: None,
            index: None,
            old: None,
            new: None,
            index_def: None,
            destructive: false,
            requires_data_migration: false,
            description,
        }
    }

    /// Canonical one-line form; the plan checksum hashes these.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}->{}",
            self.kind,
            self.table,
            self.column.as_deref().unwrap_or("-"),
            self.index.as_deref().unwrap_or("-"),
            self.old
                .as_ref()
                .map(ColumnInfo::fingerprint)
                .unwrap_or_else(|| "-".into()),
            self.new
                .as_ref()
                .map(ColumnInfo::fingerprint)
                .unwrap_or_else(|| "-".into()),
        )
    }

    fn sort_key(&self) -> (u8, &str, &str) {
        (
            self.kind.priority(),
            self.table.as_str(),
            self.column
                .as_deref()
                .or(self.index.as_deref())
                .unwrap_or(""),
        )
    }
}

/// The output of one diff pass: ordered changes plus the states compared.
///
/// Transient and recomputed on demand; the plan is never the source of
/// truth for anything.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Changes in application order.
    pub changes: Vec<MigrationChange>,
    /// Desired state: registered snapshots by table.
    pub models: BTreeMap<String, ModelSnapshot>,
    /// Actual state: inspected schemas by table.
    pub database: BTreeMap<String, TableSchema>,
    /// Checksum over the ordered change fingerprints.
    pub checksum: String,
    /// Non-fatal findings (orphaned foreign keys, data-loss sites).
    pub warnings: Vec<String>,
    /// Fatal validation findings.
    pub errors: Vec<String>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether any change can discard data.
    pub fn has_destructive(&self) -> bool {
        self.changes.iter().any(|c| c.destructive)
    }

    /// Whether the plan needs human review before applying.
    pub fn requires_review(&self) -> bool {
        self.has_destructive()
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        if self.changes.is_empty() {
            return "No changes".to_string();
        }
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for change in &self.changes {
            *counts.entry(change.kind.as_str()).or_default() += 1;
        }
        let parts: Vec<String> = counts
            .iter()
            .map(|(kind, n)| format!("{} {}", n, kind))
            .collect();
        parts.join(", ")
    }
}

/// Type-change pairs that discard or mangle data.
const LOSSY_TYPE_CHANGES: &[(&str, &str)] = &[
    ("text", "integer"),
    ("text", "bigint"),
    ("text", "float"),
    ("text", "decimal"),
    ("text", "bool"),
    ("text", "timestamp"),
    ("bool", "timestamp"),
    ("bool", "bytes"),
    ("timestamp", "integer"),
    ("timestamp", "bool"),
    ("float", "integer"),
    ("float", "bigint"),
    ("decimal", "integer"),
    ("bigint", "integer"),
];

fn is_lossy_type_change(old_sql: &str, new_sql: &str) -> bool {
    let from = strata_schema::dialect::normalize_type(old_sql);
    let to = strata_schema::dialect::normalize_type(new_sql);
    LOSSY_TYPE_CHANGES.contains(&(from, to))
}

/// Diffs the registry's snapshots against an inspected schema.
pub struct ChangeDetector<'a> {
    registry: &'a ModelRegistry,
    dialect: Dialect,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(registry: &'a ModelRegistry, dialect: Dialect) -> Self {
        Self { registry, dialect }
    }

    /// Compute the ordered, checksummed plan reconciling models and
    /// database.
    pub fn detect(
        &self,
        database: &BTreeMap<String, TableSchema>,
    ) -> MigrateResult<MigrationPlan> {
        let mut changes = Vec::new();

        for (table, model) in self.registry.models() {
            match database.get(table) {
                None => {
                    changes.push(MigrationChange::new(
                        ChangeKind::CreateTable,
                        table,
                        format!("Create table '{}'", table),
                    ));
                }
                Some(actual) => {
                    self.diff_columns(model, actual, &mut changes);
                    self.diff_indexes(model, actual, &mut changes);
                }
            }
        }

        for table in database.keys() {
            if self.registry.get(table).is_none() {
                let mut change = MigrationChange::new(
                    ChangeKind::DropTable,
                    table,
                    format!("Drop table '{}' (no registered model)", table),
                );
                change.destructive = true;
                changes.push(change);
            }
        }

        changes.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        self.order_creates_by_dependency(&mut changes);

        let fingerprints: Vec<String> =
            changes.iter().map(MigrationChange::fingerprint).collect();
        let plan_checksum = checksum::change_list_checksum(&fingerprints);

        let mut plan = MigrationPlan {
            changes,
            models: self
                .registry
                .models()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            database: database.clone(),
            checksum: plan_checksum,
            warnings: Vec::new(),
            errors: Vec::new(),
        };

        self.validate(&mut plan)?;
        debug!(
            changes = plan.changes.len(),
            checksum = %plan.checksum,
            "detected schema changes"
        );
        Ok(plan)
    }

    fn diff_columns(
        &self,
        model: &ModelSnapshot,
        actual: &TableSchema,
        changes: &mut Vec<MigrationChange>,
    ) {
        for (name, wanted) in &model.columns {
            match actual.columns.get(name) {
                None => {
                    let mut change = MigrationChange::new(
                        ChangeKind::AddColumn,
                        &model.table_name,
                        format!("Add column '{}.{}'", model.table_name, name),
                    );
                    change.column = Some(name.clone());
                    change.new = Some(wanted.clone());
                    changes.push(change);
                }
                Some(present) => {
                    if let Some(change) = self.diff_column(model, wanted, present) {
                        changes.push(change);
                    }
                }
            }
        }

        for (name, present) in &actual.columns {
            if !model.columns.contains_key(name) {
                let mut change = MigrationChange::new(
                    ChangeKind::DropColumn,
                    &model.table_name,
                    format!("Drop column '{}.{}'", model.table_name, name),
                );
                change.column = Some(name.clone());
                change.old = Some(present.clone());
                change.destructive = true;
                changes.push(change);
            }
        }
    }

    fn diff_column(
        &self,
        model: &ModelSnapshot,
        wanted: &ColumnInfo,
        present: &ColumnInfo,
    ) -> Option<MigrationChange> {
        let type_changed = !self
            .dialect
            .types_compatible(&wanted.sql_type, &present.sql_type);
        let nullable_changed = wanted.nullable != present.nullable;
        let default_changed =
            normalize_default(wanted.default.as_deref()) != normalize_default(present.default.as_deref());
        let length_changed = match (wanted.max_length, present.max_length) {
            (Some(w), Some(p)) => w != p,
            _ => false,
        };

        if !(type_changed || nullable_changed || default_changed || length_changed) {
            return None;
        }

        let narrowing = matches!(
            (wanted.max_length, present.max_length),
            (Some(w), Some(p)) if w < p
        );
        let lossy_type = type_changed && is_lossy_type_change(&present.sql_type, &wanted.sql_type);
        let now_required = nullable_changed && !wanted.nullable;
        let destructive = now_required || narrowing || lossy_type;

        let mut details = Vec::new();
        if type_changed {
            details.push(format!("type {} -> {}", present.sql_type, wanted.sql_type));
        }
        if nullable_changed {
            details.push(format!(
                "nullable {} -> {}",
                present.nullable, wanted.nullable
            ));
        }
        if length_changed {
            details.push(format!(
                "length {:?} -> {:?}",
                present.max_length, wanted.max_length
            ));
        }
        if default_changed {
            details.push("default changed".to_string());
        }

        let mut change = MigrationChange::new(
            ChangeKind::AlterColumn,
            &model.table_name,
            format!(
                "Alter column '{}.{}' ({})",
                model.table_name,
                wanted.name,
                details.join(", ")
            ),
        );
        change.column = Some(wanted.name.clone());
        change.old = Some(present.clone());
        change.new = Some(wanted.clone());
        change.destructive = destructive;
        change.requires_data_migration = destructive;
        Some(change)
    }

    fn diff_indexes(
        &self,
        model: &ModelSnapshot,
        actual: &TableSchema,
        changes: &mut Vec<MigrationChange>,
    ) {
        for (name, wanted) in &model.indexes {
            if !actual.indexes.contains_key(name) {
                let mut change = MigrationChange::new(
                    ChangeKind::CreateIndex,
                    &model.table_name,
                    format!("Create index '{}' on '{}'", name, model.table_name),
                );
                change.index = Some(name.clone());
                change.index_def = Some(wanted.clone());
                changes.push(change);
            }
        }
        for (name, present) in &actual.indexes {
            if !model.indexes.contains_key(name) {
                let mut change = MigrationChange::new(
                    ChangeKind::DropIndex,
                    &model.table_name,
                    format!("Drop index '{}' on '{}'", name, model.table_name),
                );
                change.index = Some(name.clone());
                change.index_def = Some(present.clone());
                changes.push(change);
            }
        }
    }

    /// Reorder the create-table prefix so referenced tables come before
    /// their dependents; ties stay lexicographic.
    fn order_creates_by_dependency(&self, changes: &mut [MigrationChange]) {
        let create_count = changes
            .iter()
            .take_while(|c| c.kind == ChangeKind::CreateTable)
            .count();
        if create_count < 2 {
            return;
        }

        let created: BTreeSet<String> = changes[..create_count]
            .iter()
            .map(|c| c.table.clone())
            .collect();

        // table -> created tables it references
        let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for table in &created {
            let mut references = BTreeSet::new();
            if let Some(model) = self.registry.get(table) {
                for fk in model.foreign_keys() {
                    if let Some(target) = &fk.referenced_table {
                        if target != table && created.contains(target) {
                            references.insert(target.clone());
                        }
                    }
                }
            }
            deps.insert(table.clone(), references);
        }

        // Kahn's algorithm; BTree ordering keeps ties lexicographic.
        let mut ordered = Vec::with_capacity(create_count);
        let mut remaining = deps;
        while !remaining.is_empty() {
            let next = remaining
                .iter()
                .find(|(_, refs)| refs.iter().all(|r| !remaining.contains_key(r)))
                .map(|(t, _)| t.clone());
            match next {
                Some(table) => {
                    remaining.remove(&table);
                    ordered.push(table);
                }
                // A cycle; leave the rest as-is and let validation fail it.
                None => {
                    ordered.extend(remaining.keys().cloned());
                    break;
                }
            }
        }

        let mut by_table: BTreeMap<String, MigrationChange> = changes[..create_count]
            .iter()
            .cloned()
            .map(|c| (c.table.clone(), c))
            .collect();
        for (slot, table) in ordered.iter().enumerate() {
            if let Some(change) = by_table.remove(table) {
                changes[slot] = change;
            }
        }
    }

    /// Attach warnings to the plan and fail it on circular dependencies.
    fn validate(&self, plan: &mut MigrationPlan) -> MigrateResult<()> {
        let created: BTreeSet<&str> = plan
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::CreateTable)
            .map(|c| c.table.as_str())
            .collect();
        let dropped: BTreeSet<&str> = plan
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::DropTable)
            .map(|c| c.table.as_str())
            .collect();

        // Circular foreign-key dependencies among newly created tables.
        if let Some(cycle) = self.find_fk_cycle(&created) {
            let msg = format!(
                "circular foreign-key dependency among new tables: {}",
                cycle.join(" -> ")
            );
            plan.errors.push(msg.clone());
            return Err(MigrationError::validation(msg));
        }

        // Orphaned foreign keys: references to tables being dropped or
        // that exist nowhere.
        for model in plan.models.values() {
            for fk in model.foreign_keys() {
                let Some(target) = &fk.referenced_table else {
                    continue;
                };
                if dropped.contains(target.as_str()) {
                    plan.warnings.push(format!(
                        "foreign key '{}' on '{}' references '{}', which is scheduled for deletion",
                        fk.name, model.table_name, target
                    ));
                } else if !plan.models.contains_key(target)
                    && !plan.database.contains_key(target)
                {
                    plan.warnings.push(format!(
                        "foreign key '{}' on '{}' references unknown table '{}'",
                        fk.name, model.table_name, target
                    ));
                }
            }
        }

        // Aggregate data-loss sites.
        for change in &plan.changes {
            if change.destructive {
                plan.warnings
                    .push(format!("potential data loss: {}", change.description));
            }
        }

        Ok(())
    }

    fn find_fk_cycle(&self, created: &BTreeSet<&str>) -> Option<Vec<String>> {
        fn visit(
            table: &str,
            registry: &ModelRegistry,
            created: &BTreeSet<&str>,
            visiting: &mut Vec<String>,
            done: &mut BTreeSet<String>,
        ) -> Option<Vec<String>> {
            if done.contains(table) {
                return None;
            }
            if let Some(pos) = visiting.iter().position(|t| t == table) {
                let mut cycle = visiting[pos..].to_vec();
                cycle.push(table.to_string());
                return Some(cycle);
            }
            visiting.push(table.to_string());
            if let Some(model) = registry.get(table) {
                for fk in model.foreign_keys() {
                    if let Some(target) = &fk.referenced_table {
                        if target != table && created.contains(target.as_str()) {
                            if let Some(cycle) =
                                visit(target, registry, created, visiting, done)
                            {
                                return Some(cycle);
                            }
                        }
                    }
                }
            }
            visiting.pop();
            done.insert(table.to_string());
            None
        }

        let mut done = BTreeSet::new();
        for table in created {
            let mut visiting = Vec::new();
            if let Some(cycle) =
                visit(table, self.registry, created, &mut visiting, &mut done)
            {
                return Some(cycle);
            }
        }
        None
    }
}

/// Strip casts and quotes so `'x'::text` compares equal to `x`.
fn normalize_default(default: Option<&str>) -> Option<String> {
    let raw = default?.trim();
    let uncast = raw.split("::").next().unwrap_or(raw).trim();
    let unquoted = uncast.trim_matches('\'').trim_matches('"');
    if unquoted.is_empty() {
        return None;
    }
    Some(unquoted.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_schema::{Entity, EntityDescriptor, FieldDescriptor, LogicalType};

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

    struct Order;
    impl Entity for Order {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::new("Order")
                .column(FieldDescriptor::new("id", LogicalType::Int64).primary_key())
                .column(
                    FieldDescriptor::new("user_id", LogicalType::Int64).references("users", "id"),
                )
        }
    }

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new(Dialect::Postgres);
        registry.register::<User>();
        registry
    }

    fn table_schema_from(snapshot: &ModelSnapshot) -> TableSchema {
        TableSchema {
            name: snapshot.table_name.clone(),
            columns: snapshot.columns.clone(),
            indexes: snapshot.indexes.clone(),
            constraints: snapshot.constraints.clone(),
        }
    }

    #[test]
    fn test_empty_database_yields_single_create() {
        let registry = registry();
        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let plan = detector.detect(&BTreeMap::new()).unwrap();

        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].kind, ChangeKind::CreateTable);
        assert_eq!(plan.changes[0].table, "users");
        assert!(!plan.has_destructive());
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let registry = registry();
        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let first = detector.detect(&BTreeMap::new()).unwrap();
        let second = detector.detect(&BTreeMap::new()).unwrap();
        assert_eq!(first.checksum, second.checksum);
    }

    #[test]
    fn test_in_sync_schema_is_empty() {
        let registry = registry();
        let mut database = BTreeMap::new();
        database.insert(
            "users".to_string(),
            table_schema_from(registry.get("users").unwrap()),
        );

        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let plan = detector.detect(&database).unwrap();
        assert!(plan.is_empty(), "unexpected changes: {}", plan.summary());
    }

    #[test]
    fn test_added_field_yields_single_add_column() {
        let mut registry = registry();
        let mut database = BTreeMap::new();
        database.insert(
            "users".to_string(),
            table_schema_from(registry.get("users").unwrap()),
        );

        registry.register_entity(
            User::descriptor()
                .column(FieldDescriptor::new("age", LogicalType::Int).nullable()),
        );

        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let plan = detector.detect(&database).unwrap();

        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].kind, ChangeKind::AddColumn);
        assert_eq!(plan.changes[0].column.as_deref(), Some("age"));
        assert!(!plan.has_destructive());
    }

    #[test]
    fn test_removed_field_is_destructive() {
        let registry = registry();
        let mut with_extra = table_schema_from(registry.get("users").unwrap());
        let mut legacy = with_extra.columns["email"].clone();
        legacy.name = "legacy_flag".to_string();
        with_extra
            .columns
            .insert("legacy_flag".to_string(), legacy);
        let mut database = BTreeMap::new();
        database.insert("users".to_string(), with_extra);

        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let plan = detector.detect(&database).unwrap();

        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].kind, ChangeKind::DropColumn);
        assert!(plan.changes[0].destructive);
        assert!(plan.has_destructive());
        assert!(plan.requires_review());
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.contains("potential data loss")));
    }

    #[test]
    fn test_nullable_to_required_is_destructive() {
        let registry = registry();
        let mut drifted = table_schema_from(registry.get("users").unwrap());
        drifted.columns.get_mut("email").unwrap().nullable = true;
        let mut database = BTreeMap::new();
        database.insert("users".to_string(), drifted);

        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let plan = detector.detect(&database).unwrap();

        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].kind, ChangeKind::AlterColumn);
        assert!(plan.changes[0].destructive);
        assert!(plan.changes[0].requires_data_migration);
    }

    #[test]
    fn test_compatible_types_do_not_alter() {
        let registry = registry();
        let mut reported = table_schema_from(registry.get("users").unwrap());
        // The database reports the serial form and varchar spelling.
        reported.columns.get_mut("id").unwrap().sql_type = "bigserial".to_string();
        reported.columns.get_mut("email").unwrap().sql_type =
            "character varying".to_string();
        let mut database = BTreeMap::new();
        database.insert("users".to_string(), reported);

        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let plan = detector.detect(&database).unwrap();
        assert!(plan.is_empty(), "unexpected changes: {}", plan.summary());
    }

    #[test]
    fn test_unregistered_table_is_dropped() {
        let registry = registry();
        let mut database = BTreeMap::new();
        database.insert(
            "users".to_string(),
            table_schema_from(registry.get("users").unwrap()),
        );
        database.insert("abandoned".to_string(), TableSchema::new("abandoned"));

        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let plan = detector.detect(&database).unwrap();

        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].kind, ChangeKind::DropTable);
        assert!(plan.changes[0].destructive);
    }

    #[test]
    fn test_creates_ordered_by_foreign_key_dependency() {
        let mut registry = ModelRegistry::new(Dialect::Postgres);
        // Registered in dependency-violating lexicographic order.
        registry.register::<Order>();
        registry.register::<User>();

        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let plan = detector.detect(&BTreeMap::new()).unwrap();

        let tables: Vec<&str> = plan.changes.iter().map(|c| c.table.as_str()).collect();
        let users_at = tables.iter().position(|t| *t == "users").unwrap();
        let orders_at = tables.iter().position(|t| *t == "orders").unwrap();
        assert!(users_at < orders_at, "users must precede orders: {:?}", tables);
    }

    #[test]
    fn test_circular_foreign_keys_fail_validation() {
        let mut registry = ModelRegistry::new(Dialect::Postgres);
        registry.register_entity(
            EntityDescriptor::new("Chicken")
                .column(FieldDescriptor::new("id", LogicalType::Int64).primary_key())
                .column(
                    FieldDescriptor::new("egg_id", LogicalType::Int64).references("eggs", "id"),
                ),
        );
        registry.register_entity(
            EntityDescriptor::new("Egg")
                .column(FieldDescriptor::new("id", LogicalType::Int64).primary_key())
                .column(
                    FieldDescriptor::new("chicken_id", LogicalType::Int64)
                        .references("chickens", "id"),
                ),
        );

        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let err = detector.detect(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, MigrationError::Validation(_)));
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn test_orphaned_foreign_key_is_a_warning() {
        let mut registry = ModelRegistry::new(Dialect::Postgres);
        registry.register::<Order>();
        // `orders` references `users`, which is neither registered nor in
        // the database.
        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let plan = detector.detect(&BTreeMap::new()).unwrap();
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.contains("unknown table 'users'")));
    }

    #[test]
    fn test_index_diffing() {
        let mut registry = ModelRegistry::new(Dialect::Postgres);
        registry.register_entity(
            EntityDescriptor::new("Post")
                .column(FieldDescriptor::new("id", LogicalType::Int64).primary_key())
                .column(FieldDescriptor::new("slug", LogicalType::String).indexed()),
        );
        let mut reported = table_schema_from(registry.get("posts").unwrap());
        reported.indexes.remove("idx_posts_slug");
        reported.indexes.insert(
            "idx_posts_stale".to_string(),
            IndexInfo::new("idx_posts_stale", vec!["id".to_string()], false),
        );
        let mut database = BTreeMap::new();
        database.insert("posts".to_string(), reported);

        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let plan = detector.detect(&database).unwrap();

        let kinds: Vec<ChangeKind> = plan.changes.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::CreateIndex, ChangeKind::DropIndex]);
    }

    #[test]
    fn test_normalize_default() {
        assert_eq!(normalize_default(Some("'active'::text")), Some("active".into()));
        assert_eq!(normalize_default(Some("'active'")), Some("active".into()));
        assert_eq!(normalize_default(None), None);
    }

    #[test]
    fn test_checksum_independent_of_registration_order() {
        let mut forward = ModelRegistry::new(Dialect::Postgres);
        forward.register::<User>();
        forward.register::<Order>();

        let mut reverse = ModelRegistry::new(Dialect::Postgres);
        reverse.register::<Order>();
        reverse.register::<User>();

        let empty = BTreeMap::new();
        let a = ChangeDetector::new(&forward, Dialect::Postgres)
            .detect(&empty)
            .unwrap();
        let b = ChangeDetector::new(&reverse, Dialect::Postgres)
            .detect(&empty)
            .unwrap();
        assert_eq!(a.checksum, b.checksum);
    }

    #[test]
    fn test_lossy_type_table() {
        assert!(is_lossy_type_change("TEXT", "INTEGER"));
        assert!(is_lossy_type_change("BOOLEAN", "TIMESTAMP"));
        assert!(is_lossy_type_change("BIGINT", "INTEGER"));
        assert!(!is_lossy_type_change("INTEGER", "BIGINT"));
        assert!(!is_lossy_type_change("VARCHAR(50)", "TEXT"));
    }

    #[test]
    fn test_plan_summary_counts() {
        let registry = registry();
        let detector = ChangeDetector::new(&registry, Dialect::Postgres);
        let plan = detector.detect(&BTreeMap::new()).unwrap();
        assert_eq!(plan.summary(), "1 create_table");

        let empty_plan = MigrationPlan {
            changes: Vec::new(),
            models: BTreeMap::new(),
            database: BTreeMap::new(),
            checksum: String::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        };
        assert_eq!(empty_plan.summary(), "No changes");
    }
}
