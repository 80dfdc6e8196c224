//! Database catalog: `system_schema` reader, snapshot model and naming rules

pub mod model;
pub mod naming;
pub mod reader;

pub use model::{
    ClusteringOrder, Column, ColumnRole, Exclusion, Keyspace, SchemaSnapshot, SchemaWarning, Table,
    TableKind,
};
pub use naming::{to_camel_case, to_pascal_case, TableNames};
pub use reader::{build_snapshot, CatalogReader, CatalogRows, KeyspaceFilter, SYSTEM_KEYSPACES};
