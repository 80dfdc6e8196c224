use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Schema-management operation that can be enabled in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SchemaOperation {
    TableCreate,
    TableDrop,
    TableAlterAdd,
    TableAlterDrop,
    KeyspaceCreate,
    KeyspaceDrop,
}

impl SchemaOperation {
    pub const ALL: [SchemaOperation; 6] = [
        SchemaOperation::TableCreate,
        SchemaOperation::TableDrop,
        SchemaOperation::TableAlterAdd,
        SchemaOperation::TableAlterDrop,
        SchemaOperation::KeyspaceCreate,
        SchemaOperation::KeyspaceDrop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaOperation::TableCreate => "TableCreate",
            SchemaOperation::TableDrop => "TableDrop",
            SchemaOperation::TableAlterAdd => "TableAlterAdd",
            SchemaOperation::TableAlterDrop => "TableAlterDrop",
            SchemaOperation::KeyspaceCreate => "KeyspaceCreate",
            SchemaOperation::KeyspaceDrop => "KeyspaceDrop",
        }
    }

    /// Name of the schema-management GraphQL mutation
    pub fn mutation_name(&self) -> &'static str {
        match self {
            SchemaOperation::TableCreate => "createTable",
            SchemaOperation::TableDrop => "dropTable",
            SchemaOperation::TableAlterAdd => "alterTableAdd",
            SchemaOperation::TableAlterDrop => "alterTableDrop",
            SchemaOperation::KeyspaceCreate => "createKeyspace",
            SchemaOperation::KeyspaceDrop => "dropKeyspace",
        }
    }
}

impl fmt::Display for SchemaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whitelist of enabled schema-management operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupportedOperations(BTreeSet<SchemaOperation>);

impl SupportedOperations {
    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn all() -> Self {
        SchemaOperation::ALL.into_iter().collect()
    }

    pub fn contains(&self, operation: SchemaOperation) -> bool {
        self.0.contains(&operation)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SchemaOperation> + '_ {
        self.0.iter().copied()
    }
}

impl Default for SupportedOperations {
    fn default() -> Self {
        [SchemaOperation::TableCreate, SchemaOperation::KeyspaceCreate]
            .into_iter()
            .collect()
    }
}

impl FromIterator<SchemaOperation> for SupportedOperations {
    fn from_iter<I: IntoIterator<Item = SchemaOperation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_operations() {
        let ops = SupportedOperations::default();
        assert!(ops.contains(SchemaOperation::TableCreate));
        assert!(ops.contains(SchemaOperation::KeyspaceCreate));
        assert!(!ops.contains(SchemaOperation::KeyspaceDrop));
    }

    #[test]
    fn test_operations_deserialize_from_names() {
        let ops: SupportedOperations =
            serde_json::from_str(r#"["TableDrop", "TableAlterAdd"]"#).unwrap();
        assert_eq!(ops.iter().collect::<Vec<_>>(), vec![
            SchemaOperation::TableDrop,
            SchemaOperation::TableAlterAdd
        ]);
        assert!(serde_json::from_str::<SupportedOperations>(r#"["TableTruncate"]"#).is_err());
    }
}
