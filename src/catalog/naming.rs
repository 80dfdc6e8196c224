/// Naming convention for generated GraphQL names
///
/// Table names become PascalCase type names and camelCase field names; column
/// names become camelCase fields. Characters outside `[A-Za-z0-9_]` are dropped
/// and a leading digit is prefixed with `_`, so every generated name is a valid
/// GraphQL name.

/// Type names registered by every generated schema
pub const RESERVED_TYPE_NAMES: &[&str] = &[
    "Query",
    "Mutation",
    "Subscription",
    "String",
    "Int",
    "Float",
    "Boolean",
    "ID",
    "BigInt",
    "Decimal",
    "Varint",
    "Blob",
    "Inet",
    "Timestamp",
    "Time",
    "Uuid",
    "TimeUuid",
    "QueryOptions",
    "UpdateOptions",
    "QueryConsistency",
    "MutationConsistency",
    "SerialConsistency",
];

/// Argument names a `…ByKey` lookup takes besides its key columns
pub const RESERVED_KEY_FIELDS: &[&str] = &["options"];

/// Convert snake_case to PascalCase
pub fn to_pascal_case(s: &str) -> String {
    let words = split_words(s);
    let joined: String = words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => {
                    let mut result = first.to_uppercase().collect::<String>();
                    result.push_str(chars.as_str());
                    result
                }
            }
        })
        .collect();
    guard_leading_digit(joined)
}

/// Convert snake_case to camelCase
pub fn to_camel_case(s: &str) -> String {
    let pascal = to_pascal_case(s);
    if pascal.starts_with('_') {
        return pascal;
    }
    let mut chars = pascal.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().chain(chars).collect(),
    }
}

fn split_words(s: &str) -> Vec<String> {
    s.split('_')
        .map(|word| word.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect()
}

fn guard_leading_digit(name: String) -> String {
    match name.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("_{}", name),
        None => "_".to_string(),
        _ => name,
    }
}

/// Every name generated for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub type_name: String,
    pub field_name: String,
}

impl TableNames {
    pub fn for_table(table: &str) -> Self {
        Self {
            type_name: to_pascal_case(table),
            field_name: to_camel_case(table),
        }
    }

    pub fn input(&self) -> String {
        format!("{}Input", self.type_name)
    }

    pub fn filter_input(&self) -> String {
        format!("{}FilterInput", self.type_name)
    }

    pub fn order(&self) -> String {
        format!("{}Order", self.type_name)
    }

    pub fn result(&self) -> String {
        format!("{}Result", self.type_name)
    }

    pub fn mutation_result(&self) -> String {
        format!("{}MutationResult", self.type_name)
    }

    pub fn by_key_field(&self) -> String {
        format!("{}ByKey", self.field_name)
    }

    pub fn insert_field(&self) -> String {
        format!("insert{}", self.type_name)
    }

    pub fn update_field(&self) -> String {
        format!("update{}", self.type_name)
    }

    pub fn delete_field(&self) -> String {
        format!("delete{}", self.type_name)
    }

    /// All type names this table registers
    pub fn type_family(&self) -> Vec<String> {
        vec![
            self.type_name.clone(),
            self.input(),
            self.filter_input(),
            self.order(),
            self.result(),
            self.mutation_result(),
        ]
    }

    /// All root field names this table registers
    pub fn field_family(&self) -> Vec<String> {
        vec![
            self.field_name.clone(),
            self.by_key_field(),
            self.insert_field(),
            self.update_field(),
            self.delete_field(),
        ]
    }
}

/// Whether a generated type name clashes with a name every schema registers
///
/// Covers scalar filter inputs (`IntFilterInput`) and map entry types
/// (`StringIntEntry`, `StringIntEntryInput`) as well as the fixed names.
pub fn is_reserved_type_name(name: &str) -> bool {
    if RESERVED_TYPE_NAMES.contains(&name) {
        return true;
    }
    if let Some(prefix) = name.strip_suffix("FilterInput") {
        return is_scalar_name(prefix);
    }
    let entry_prefix = name
        .strip_suffix("EntryInput")
        .or_else(|| name.strip_suffix("Entry"));
    match entry_prefix {
        Some(prefix) => scalar_names().any(|key| {
            prefix
                .strip_prefix(key)
                .map_or(false, is_scalar_name)
        }),
        None => false,
    }
}

/// Name of the output type for a map entry
pub fn map_entry_name(key: &str, value: &str) -> String {
    format!("{}{}Entry", key, value)
}

/// Name of the input type for a map entry
pub fn map_entry_input_name(key: &str, value: &str) -> String {
    format!("{}{}EntryInput", key, value)
}

/// Name of the filter input for a scalar
pub fn scalar_filter_name(scalar: &str) -> String {
    format!("{}FilterInput", scalar)
}

fn scalar_names() -> impl Iterator<Item = &'static str> {
    crate::types::ScalarKind::ALL.iter().map(|kind| kind.graphql_name())
}

fn is_scalar_name(name: &str) -> bool {
    scalar_names().any(|scalar| scalar == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_pascal_case() {
        assert_eq!(to_pascal_case("books"), "Books");
        assert_eq!(to_pascal_case("order_items"), "OrderItems");
        assert_eq!(to_pascal_case("__weird__name"), "WeirdName");
        assert_eq!(to_pascal_case("2fast"), "_2fast");
        assert_eq!(to_pascal_case("with-dash"), "Withdash");
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("books"), "books");
        assert_eq!(to_camel_case("first_name"), "firstName");
        assert_eq!(to_camel_case("ID"), "iD");
        assert_eq!(to_camel_case("1st"), "_1st");
    }

    #[test]
    fn test_table_name_family() {
        let names = TableNames::for_table("books");
        assert_eq!(names.type_name, "Books");
        assert_eq!(names.result(), "BooksResult");
        assert_eq!(names.by_key_field(), "booksByKey");
        assert_eq!(names.insert_field(), "insertBooks");
        assert_eq!(names.type_family().len(), 6);
    }

    #[test]
    fn test_snake_and_pascal_variants_collide() {
        assert_eq!(
            TableNames::for_table("book_titles").type_name,
            TableNames::for_table("bookTitles").type_name
        );
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved_type_name("Query"));
        assert!(is_reserved_type_name("Timestamp"));
        assert!(is_reserved_type_name("IntFilterInput"));
        assert!(is_reserved_type_name("StringIntEntry"));
        assert!(is_reserved_type_name("UuidFloatEntryInput"));
        assert!(!is_reserved_type_name("LogEntry"));
        assert!(!is_reserved_type_name("Books"));
        assert!(!is_reserved_type_name("BooksFilterInput"));
    }
}
