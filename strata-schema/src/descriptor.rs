//! Explicit entity schema descriptors.
//!
//! Entities describe their columns through a static descriptor list
//! instead of runtime reflection: each type implements [`Entity`] and
//! returns an [`EntityDescriptor`] naming its fields, logical types and
//! constraints. Embedded groups flatten into the parent's column set.

use crate::snapshot::ForeignKeyRef;
use crate::types::LogicalType;

/// Describes one field of an entity.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name (becomes the column name).
    pub name: String,
    /// Logical column type.
    pub logical_type: LogicalType,
    /// Whether NULL is allowed. Fields are required unless opted out.
    pub nullable: bool,
    /// Primary-key marker.
    pub primary_key: bool,
    /// Explicit auto-increment marker. Integer primary keys auto-increment
    /// even without it.
    pub auto_increment: bool,
    /// Single-column unique constraint.
    pub unique: bool,
    /// Plain secondary index.
    pub indexed: bool,
    /// Unique secondary index.
    pub unique_index: bool,
    /// Maximum character length for bounded strings.
    pub max_length: Option<u32>,
    /// Numeric precision.
    pub precision: Option<u8>,
    /// Numeric scale.
    pub scale: Option<u8>,
    /// Default value expression, rendered verbatim.
    pub default: Option<String>,
    /// Explicit SQL type, overriding the dialect mapping.
    pub sql_type_override: Option<String>,
    /// Check constraint expression.
    pub check: Option<String>,
    /// Foreign-key reference.
    pub references: Option<ForeignKeyRef>,
    /// Excluded from the schema entirely.
    pub skip: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            indexed: false,
            unique_index: false,
            max_length: None,
            precision: None,
            scale: None,
            default: None,
            sql_type_override: None,
            check: None,
            references: None,
            skip: false,
        }
    }

    /// Allow NULL.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as auto-incrementing.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Add a single-column unique constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Add a plain index (`idx_<table>_<column>`).
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Add a unique index (`uidx_<table>_<column>`).
    pub fn unique_index(mut self) -> Self {
        self.unique_index = true;
        self
    }

    /// Bound the maximum character length.
    pub fn max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Set numeric precision and scale.
    pub fn precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Set a default value expression.
    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Override the rendered SQL type.
    pub fn sql_type(mut self, ty: impl Into<String>) -> Self {
        self.sql_type_override = Some(ty.into());
        self
    }

    /// Add a check constraint (`chk_<table>_<column>`).
    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.check = Some(expr.into());
        self
    }

    /// Add a foreign key (`fk_<table>_<column>`).
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Exclude the field from the schema.
    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }
}

/// One entry in an entity's field list.
#[derive(Debug, Clone)]
pub enum FieldSpec {
    /// A concrete column.
    Column(FieldDescriptor),
    /// An embedded group whose fields flatten into the parent.
    Embedded(Vec<FieldSpec>),
}

/// Describes one entity type.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    /// Rust type name, used for table-name inference.
    pub type_name: String,
    /// Explicit table name, bypassing inference.
    pub table_name: Option<String>,
    /// Field list in declaration order.
    pub fields: Vec<FieldSpec>,
}

impl EntityDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table_name: None,
            fields: Vec::new(),
        }
    }

    /// Set an explicit table name.
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Append a column.
    pub fn column(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(FieldSpec::Column(field));
        self
    }

    /// Append an embedded group.
    pub fn embed(mut self, fields: Vec<FieldSpec>) -> Self {
        self.fields.push(FieldSpec::Embedded(fields));
        self
    }

    /// The resolved table name.
    pub fn resolved_table_name(&self) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| crate::naming::table_name_from_type(&self.type_name))
    }

    /// All column descriptors with embedded groups flattened, in order.
    pub fn flattened_columns(&self) -> Vec<&FieldDescriptor> {
        fn walk<'a>(specs: &'a [FieldSpec], out: &mut Vec<&'a FieldDescriptor>) {
            for spec in specs {
                match spec {
                    FieldSpec::Column(field) => out.push(field),
                    FieldSpec::Embedded(inner) => walk(inner, out),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.fields, &mut out);
        out
    }
}

/// A type that can describe its own schema.
pub trait Entity {
    /// The static field descriptor list for this type.
    fn descriptor() -> EntityDescriptor;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let field = FieldDescriptor::new("email", LogicalType::String);
        assert!(!field.nullable);
        assert!(!field.primary_key);
        assert!(field.max_length.is_none());
    }

    #[test]
    fn test_embedded_flattening() {
        let descriptor = EntityDescriptor::new("Post")
            .column(FieldDescriptor::new("id", LogicalType::Int64).primary_key())
            .embed(vec![
                FieldSpec::Column(FieldDescriptor::new("created_at", LogicalType::Timestamp)),
                FieldSpec::Embedded(vec![FieldSpec::Column(FieldDescriptor::new(
                    "updated_at",
                    LogicalType::Timestamp,
                ))]),
            ])
            .column(FieldDescriptor::new("title", LogicalType::String));

        let names: Vec<&str> = descriptor
            .flattened_columns()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "created_at", "updated_at", "title"]);
    }

    #[test]
    fn test_table_name_resolution() {
        let inferred = EntityDescriptor::new("UserModel");
        assert_eq!(inferred.resolved_table_name(), "users");

        let explicit = EntityDescriptor::new("UserModel").table("accounts");
        assert_eq!(explicit.resolved_table_name(), "accounts");
    }
}
