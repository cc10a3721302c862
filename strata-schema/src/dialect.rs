//! Database dialects and their type-mapping tables.

use serde::{Deserialize, Serialize};

use crate::types::LogicalType;

/// A supported database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Dialect name as used in configuration files and connection URLs.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Parse a provider string (accepts common aliases).
    pub fn parse(s: &str) -> Option<Dialect> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" | "mariadb" => Some(Dialect::MySql),
            "sqlite" | "sqlite3" => Some(Dialect::Sqlite),
            _ => None,
        }
    }

    /// Quote an identifier for this dialect.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident),
            Dialect::MySql => format!("`{}`", ident),
        }
    }

    /// Parameter placeholder for the 1-based position `n`.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Native spelling for a logical type.
    ///
    /// `max_length` applies to `String`; `precision`/`scale` to `Decimal`.
    pub fn sql_type(
        &self,
        ty: LogicalType,
        max_length: Option<u32>,
        precision: Option<u8>,
        scale: Option<u8>,
    ) -> String {
        match self {
            Dialect::Postgres => match ty {
                LogicalType::String => format!("VARCHAR({})", max_length.unwrap_or(255)),
                LogicalType::Text => "TEXT".to_string(),
                LogicalType::Int => "INTEGER".to_string(),
                LogicalType::Int64 => "BIGINT".to_string(),
                LogicalType::Float64 => "DOUBLE PRECISION".to_string(),
                LogicalType::Bool => "BOOLEAN".to_string(),
                LogicalType::Timestamp => "TIMESTAMP WITH TIME ZONE".to_string(),
                LogicalType::Decimal => decimal_type("DECIMAL", precision, scale),
                LogicalType::Bytes => "BYTEA".to_string(),
            },
            Dialect::MySql => match ty {
                LogicalType::String => format!("VARCHAR({})", max_length.unwrap_or(255)),
                LogicalType::Text => "TEXT".to_string(),
                LogicalType::Int => "INT".to_string(),
                LogicalType::Int64 => "BIGINT".to_string(),
                LogicalType::Float64 => "DOUBLE".to_string(),
                LogicalType::Bool => "TINYINT(1)".to_string(),
                LogicalType::Timestamp => "DATETIME".to_string(),
                LogicalType::Decimal => decimal_type("DECIMAL", precision, scale),
                LogicalType::Bytes => "BLOB".to_string(),
            },
            Dialect::Sqlite => match ty {
                LogicalType::String | LogicalType::Text => "TEXT".to_string(),
                LogicalType::Int | LogicalType::Int64 => "INTEGER".to_string(),
                LogicalType::Float64 => "REAL".to_string(),
                LogicalType::Bool => "INTEGER".to_string(),
                LogicalType::Timestamp => "TEXT".to_string(),
                LogicalType::Decimal => "NUMERIC".to_string(),
                LogicalType::Bytes => "BLOB".to_string(),
            },
        }
    }

    /// The auto-increment rendering of an integer primary-key column type.
    ///
    /// PostgreSQL rewrites the whole type to a serial form, MySQL appends a
    /// column attribute, SQLite folds the primary-key clause into the type.
    pub fn auto_increment_type(&self, ty: LogicalType) -> String {
        match self {
            Dialect::Postgres => match ty {
                LogicalType::Int64 => "BIGSERIAL".to_string(),
                _ => "SERIAL".to_string(),
            },
            Dialect::MySql => match ty {
                LogicalType::Int64 => "BIGINT AUTO_INCREMENT".to_string(),
                _ => "INT AUTO_INCREMENT".to_string(),
            },
            Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        }
    }

    /// Whether `ALTER TABLE ... ALTER COLUMN` (or an equivalent) exists.
    pub fn supports_alter_column(&self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// Whether two reported SQL types are semantically equivalent.
    ///
    /// Normalizes dialect synonyms (serial forms, `character varying` vs
    /// `text`, timestamp with/without zone) so that equivalent columns are
    /// never reported as changed. Length suffixes are ignored here; length
    /// changes are compared separately.
    pub fn types_compatible(&self, a: &str, b: &str) -> bool {
        normalize_type(a) == normalize_type(b)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn decimal_type(base: &str, precision: Option<u8>, scale: Option<u8>) -> String {
    match (precision, scale) {
        (Some(p), Some(s)) => format!("{}({},{})", base, p, s),
        (Some(p), None) => format!("{}({})", base, p),
        _ => base.to_string(),
    }
}

/// Collapse a reported SQL type to a canonical class name.
pub fn normalize_type(sql_type: &str) -> &'static str {
    let lower = sql_type.trim().to_ascii_lowercase();
    let base = lower.split('(').next().unwrap_or("").trim().to_string();

    match base.as_str() {
        "int" | "int2" | "int4" | "integer" | "smallint" | "mediumint" | "serial"
        | "smallserial" => "integer",
        "int8" | "bigint" | "bigserial" => "bigint",
        "float" | "float4" | "float8" | "real" | "double" | "double precision" => "float",
        "numeric" | "decimal" | "money" => "decimal",
        "varchar" | "character varying" | "character" | "char" | "bpchar" | "text" | "nvarchar"
        | "clob" | "name" => "text",
        "bool" | "boolean" | "tinyint" => "bool",
        "timestamp" | "timestamptz" | "timestamp with time zone"
        | "timestamp without time zone" | "datetime" | "date" => "timestamp",
        "bytea" | "blob" | "binary" | "varbinary" | "longblob" => "bytes",
        "json" | "jsonb" => "json",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(Dialect::Postgres.quote("users"), "\"users\"");
        assert_eq!(Dialect::MySql.quote("users"), "`users`");
        assert_eq!(Dialect::Sqlite.quote("users"), "\"users\"");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::Sqlite.placeholder(2), "?");
        assert_eq!(Dialect::MySql.placeholder(1), "?");
    }

    #[test]
    fn test_string_length() {
        assert_eq!(
            Dialect::Postgres.sql_type(LogicalType::String, Some(100), None, None),
            "VARCHAR(100)"
        );
        assert_eq!(
            Dialect::MySql.sql_type(LogicalType::String, None, None, None),
            "VARCHAR(255)"
        );
        assert_eq!(
            Dialect::Sqlite.sql_type(LogicalType::String, Some(100), None, None),
            "TEXT"
        );
    }

    #[test]
    fn test_auto_increment_idioms() {
        assert_eq!(
            Dialect::Postgres.auto_increment_type(LogicalType::Int64),
            "BIGSERIAL"
        );
        assert_eq!(
            Dialect::MySql.auto_increment_type(LogicalType::Int),
            "INT AUTO_INCREMENT"
        );
        assert_eq!(
            Dialect::Sqlite.auto_increment_type(LogicalType::Int64),
            "INTEGER PRIMARY KEY AUTOINCREMENT"
        );
    }

    #[test]
    fn test_type_compatibility() {
        let pg = Dialect::Postgres;
        assert!(pg.types_compatible("INTEGER", "int4"));
        assert!(pg.types_compatible("SERIAL", "integer"));
        assert!(pg.types_compatible("character varying", "TEXT"));
        assert!(pg.types_compatible("VARCHAR(255)", "varchar(100)"));
        assert!(pg.types_compatible("timestamptz", "TIMESTAMP WITH TIME ZONE"));
        assert!(!pg.types_compatible("TEXT", "INTEGER"));
        assert!(!pg.types_compatible("BOOLEAN", "TIMESTAMP"));
    }

    #[test]
    fn test_alter_column_support() {
        assert!(Dialect::Postgres.supports_alter_column());
        assert!(Dialect::MySql.supports_alter_column());
        assert!(!Dialect::Sqlite.supports_alter_column());
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Dialect::parse("postgresql"), Some(Dialect::Postgres));
        assert_eq!(Dialect::parse("sqlite3"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::parse("oracle"), None);
    }
}
