/// Immutable schema snapshot produced by the catalog reader

use std::fmt;

use serde::Serialize;

use crate::types::TypeKind;

/// Point-in-time view of every keyspace the service can see
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSnapshot {
    /// Monotonic publication counter, assigned by the synchronizer
    pub version: u64,
    pub keyspaces: Vec<Keyspace>,
    pub warnings: Vec<SchemaWarning>,
}

impl SchemaSnapshot {
    pub fn new(keyspaces: Vec<Keyspace>, warnings: Vec<SchemaWarning>) -> Self {
        Self {
            version: 0,
            keyspaces,
            warnings,
        }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Equality over keyspaces, tables and columns, ignoring version and warnings
    pub fn structurally_eq(&self, other: &SchemaSnapshot) -> bool {
        self.keyspaces == other.keyspaces
    }

    pub fn keyspace(&self, name: &str) -> Option<&Keyspace> {
        self.keyspaces.iter().find(|ks| ks.name == name)
    }

    pub fn table(&self, keyspace: &str, table: &str) -> Option<&Table> {
        self.keyspace(keyspace)?.table(table)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyspace {
    pub name: String,
    /// Excluded by configuration or a built-in system keyspace; tables are not read
    pub excluded: bool,
    pub tables: Vec<Table>,
}

impl Keyspace {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Tables that make it into the generated surface
    pub fn eligible_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(|t| t.is_eligible())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKind {
    Base,
    View { base_table: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub keyspace: String,
    pub name: String,
    pub type_name: String,
    pub field_name: String,
    pub kind: TableKind,
    /// Partition keys, then clustering keys (both by position), then the rest by name
    pub columns: Vec<Column>,
    /// Materialized views defined over this table
    pub views: Vec<String>,
    pub exclusion: Option<Exclusion>,
}

impl Table {
    pub fn is_view(&self) -> bool {
        matches!(self.kind, TableKind::View { .. })
    }

    pub fn is_eligible(&self) -> bool {
        self.exclusion.is_none()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_by_field(&self, field: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.field_name == field)
    }

    pub fn partition_key(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.role == ColumnRole::PartitionKey)
    }

    pub fn clustering_key(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.role == ColumnRole::Clustering)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_primary_key())
    }

    /// Columns exposed through generated operations
    pub fn exposed_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_exposed())
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.keyspace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    PartitionKey,
    Clustering,
    Static,
    Regular,
}

impl ColumnRole {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "partition_key" => Some(ColumnRole::PartitionKey),
            "clustering" => Some(ColumnRole::Clustering),
            "static" => Some(ColumnRole::Static),
            "regular" => Some(ColumnRole::Regular),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusteringOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub field_name: String,
    pub cql_type: String,
    pub type_kind: TypeKind,
    pub role: ColumnRole,
    pub position: i32,
    pub clustering_order: Option<ClusteringOrder>,
    pub indexed: bool,
    pub exclusion: Option<Exclusion>,
}

impl Column {
    pub fn is_primary_key(&self) -> bool {
        matches!(self.role, ColumnRole::PartitionKey | ColumnRole::Clustering)
    }

    pub fn is_exposed(&self) -> bool {
        self.exclusion.is_none() && self.type_kind.is_supported()
    }
}

/// Why a table or column is left out of the generated surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    UnsupportedType(String),
    UnsupportedKey { column: String },
    Collision { name: String },
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::UnsupportedType(cql_type) => write!(f, "unsupported type '{}'", cql_type),
            Exclusion::UnsupportedKey { column } => {
                write!(f, "primary key column '{}' has an unsupported type", column)
            }
            Exclusion::Collision { name } => write!(f, "generated name '{}' collides", name),
        }
    }
}

/// Non-fatal findings recorded while reading the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaWarning {
    UnsupportedType {
        keyspace: String,
        table: String,
        column: String,
        cql_type: String,
    },
    TableExcluded {
        keyspace: String,
        table: String,
        reason: String,
    },
    Collision {
        keyspace: String,
        /// Generated name shared by the entries
        name: String,
        /// Tables (or `table.column` for column collisions), sorted
        entries: Vec<String>,
    },
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaWarning::UnsupportedType {
                keyspace,
                table,
                column,
                cql_type,
            } => write!(
                f,
                "column {}.{}.{} has unsupported type '{}' and is not exposed",
                keyspace, table, column, cql_type
            ),
            SchemaWarning::TableExcluded {
                keyspace,
                table,
                reason,
            } => write!(f, "table {}.{} is not exposed: {}", keyspace, table, reason),
            SchemaWarning::Collision {
                keyspace,
                name,
                entries,
            } => write!(
                f,
                "generated name '{}' in keyspace {} is shared by {}; all are excluded",
                name,
                keyspace,
                entries.join(", ")
            ),
        }
    }
}
