//! Canonical logical column types.

use serde::{Deserialize, Serialize};

/// A database-independent column type.
///
/// Every registered field resolves to one of these; the [`Dialect`]
/// type-mapping table translates them to the engine's native spelling.
///
/// [`Dialect`]: crate::dialect::Dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    /// Bounded character data (rendered with a length, e.g. `VARCHAR(255)`).
    String,
    /// Unbounded character data.
    Text,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Int64,
    /// Double-precision floating point.
    Float64,
    /// Boolean.
    Bool,
    /// Point in time, with zone where the dialect supports it.
    Timestamp,
    /// Exact numeric with precision and scale.
    Decimal,
    /// Raw binary data.
    Bytes,
}

impl LogicalType {
    /// Canonical lowercase name, used in fingerprints and snapshots.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalType::String => "string",
            LogicalType::Text => "text",
            LogicalType::Int => "int",
            LogicalType::Int64 => "int64",
            LogicalType::Float64 => "float64",
            LogicalType::Bool => "bool",
            LogicalType::Timestamp => "timestamp",
            LogicalType::Decimal => "decimal",
            LogicalType::Bytes => "bytes",
        }
    }

    /// Whether the type is an integer width eligible for auto-increment.
    pub fn is_integer(&self) -> bool {
        matches!(self, LogicalType::Int | LogicalType::Int64)
    }

    /// Whether the type carries character data.
    pub fn is_textual(&self) -> bool {
        matches!(self, LogicalType::String | LogicalType::Text)
    }
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_stable() {
        assert_eq!(LogicalType::Int64.name(), "int64");
        assert_eq!(LogicalType::Timestamp.name(), "timestamp");
        assert_eq!(LogicalType::Timestamp.to_string(), "timestamp");
    }

    #[test]
    fn test_integer_classification() {
        assert!(LogicalType::Int.is_integer());
        assert!(LogicalType::Int64.is_integer());
        assert!(!LogicalType::Float64.is_integer());
        assert!(!LogicalType::String.is_integer());
    }
}
