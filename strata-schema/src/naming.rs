//! Table and identifier name derivation.

/// Suffixes stripped from a type name before table-name inference.
const TYPE_SUFFIXES: &[&str] = &["Model", "Entity", "Record"];

/// Derive a table name from an entity type name.
///
/// `UserModel` -> `users`, `OrderItem` -> `order_items`. Explicit table
/// names on the descriptor bypass this entirely.
pub fn table_name_from_type(type_name: &str) -> String {
    let mut base = type_name;
    for suffix in TYPE_SUFFIXES {
        if base.len() > suffix.len() {
            if let Some(stripped) = base.strip_suffix(suffix) {
                base = stripped;
                break;
            }
        }
    }
    pluralize(&to_snake_case(base))
}

/// Convert PascalCase to snake_case.
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(ch.to_lowercase().next().unwrap_or(ch));
        } else {
            result.push(ch);
        }
    }
    result
}

/// Naive English pluralization, sufficient for table names.
pub fn pluralize(s: &str) -> String {
    if s.is_empty() {
        return s.to_string();
    }
    if let Some(stem) = s.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')) {
            return format!("{}ies", stem);
        }
    }
    if s.ends_with('s')
        || s.ends_with('x')
        || s.ends_with('z')
        || s.ends_with("ch")
        || s.ends_with("sh")
    {
        return format!("{}es", s);
    }
    format!("{}s", s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("User"), "user");
        assert_eq!(to_snake_case("OrderItem"), "order_item");
        assert_eq!(to_snake_case("user"), "user");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("key"), "keys");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("batch"), "batches");
        assert_eq!(pluralize("status"), "statuses");
    }

    #[test]
    fn test_table_name_inference() {
        assert_eq!(table_name_from_type("User"), "users");
        assert_eq!(table_name_from_type("UserModel"), "users");
        assert_eq!(table_name_from_type("OrderItemEntity"), "order_items");
        assert_eq!(table_name_from_type("Category"), "categories");
        // A bare suffix is not stripped to nothing.
        assert_eq!(table_name_from_type("Model"), "models");
    }
}
