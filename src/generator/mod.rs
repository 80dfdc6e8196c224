//! API generation: one snapshot in, one compiled operation set out

pub mod args;
pub mod graphql;
pub mod management;
pub mod operations;

use std::sync::Arc;

use async_graphql::dynamic::Schema;
use indexmap::IndexMap;

use crate::catalog::{SchemaSnapshot, TableNames};
use crate::config::SupportedOperations;
use crate::error::Result;
use crate::gateway::ExecutionGateway;
use crate::query::QueryBuilder;
use crate::sync::SchemaRefresher;

pub use management::{management_schema, schema_change, SchemaManagement};
pub use operations::{MutationOutcome, TableOperations};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OperationKind {
    List,
    Lookup,
    Insert,
    Update,
    Delete,
    SchemaManagement,
}

/// Name and target of one generated operation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OperationDescriptor {
    pub keyspace: Option<String>,
    pub table: Option<String>,
    pub name: String,
    pub kind: OperationKind,
}

/// Compiled surface of one keyspace
pub struct KeyspaceApi {
    /// `None` when the keyspace has no eligible tables
    pub schema: Option<Schema>,
    pub tables: IndexMap<String, Arc<TableOperations>>,
}

/// Everything the routes serve for one snapshot
pub struct GeneratedOperationSet {
    pub keyspaces: IndexMap<String, KeyspaceApi>,
    pub management: Arc<SchemaManagement>,
    pub management_schema: Schema,
    pub descriptors: Vec<OperationDescriptor>,
}

impl GeneratedOperationSet {
    pub fn keyspace(&self, name: &str) -> Option<&KeyspaceApi> {
        self.keyspaces.get(name)
    }

    pub fn table_operations(&self, keyspace: &str, table: &str) -> Option<&Arc<TableOperations>> {
        self.keyspaces.get(keyspace).and_then(|ks| ks.tables.get(table))
    }
}

pub struct ApiGenerator {
    builder: QueryBuilder,
    gateway: ExecutionGateway,
    refresher: SchemaRefresher,
}

impl ApiGenerator {
    pub fn new(builder: QueryBuilder, gateway: ExecutionGateway, refresher: SchemaRefresher) -> Self {
        Self {
            builder,
            gateway,
            refresher,
        }
    }

    pub fn generate(
        &self,
        snapshot: &Arc<SchemaSnapshot>,
        operations: &SupportedOperations,
    ) -> Result<GeneratedOperationSet> {
        let mut keyspaces = IndexMap::new();
        let mut descriptors = Vec::new();

        for keyspace in snapshot.keyspaces.iter().filter(|ks| !ks.excluded) {
            let tables: Vec<Arc<TableOperations>> = keyspace
                .eligible_tables()
                .map(|table| {
                    Arc::new(TableOperations::new(
                        table.clone(),
                        self.builder.clone(),
                        self.gateway.clone(),
                    ))
                })
                .collect();

            for operations in &tables {
                descriptors.extend(table_descriptors(operations));
            }

            let schema = graphql::keyspace_schema(&keyspace.name, &tables)?;
            tracing::debug!(
                "Generated {} table(s) for keyspace {}",
                tables.len(),
                keyspace.name
            );
            keyspaces.insert(
                keyspace.name.clone(),
                KeyspaceApi {
                    schema,
                    tables: tables
                        .into_iter()
                        .map(|ops| (ops.table().name.clone(), ops))
                        .collect(),
                },
            );
        }

        let management = Arc::new(SchemaManagement::new(
            self.builder.clone(),
            self.gateway.clone(),
            operations.clone(),
            self.refresher.clone(),
        ));
        let management_schema = management_schema(Arc::clone(snapshot), Arc::clone(&management))?;
        descriptors.extend(operations.iter().map(|operation| OperationDescriptor {
            keyspace: None,
            table: None,
            name: operation.mutation_name().to_string(),
            kind: OperationKind::SchemaManagement,
        }));
        descriptors.sort();

        Ok(GeneratedOperationSet {
            keyspaces,
            management,
            management_schema,
            descriptors,
        })
    }
}

fn table_descriptors(operations: &TableOperations) -> Vec<OperationDescriptor> {
    let table = operations.table();
    let names = TableNames::for_table(&table.name);
    let descriptor = |name: String, kind| OperationDescriptor {
        keyspace: Some(table.keyspace.clone()),
        table: Some(table.name.clone()),
        name,
        kind,
    };

    let mut descriptors = vec![
        descriptor(names.field_name.clone(), OperationKind::List),
        descriptor(format!("{}ByKey", names.field_name), OperationKind::Lookup),
    ];
    if operations.is_writable() {
        descriptors.push(descriptor(format!("insert{}", names.type_name), OperationKind::Insert));
        descriptors.push(descriptor(format!("update{}", names.type_name), OperationKind::Update));
        descriptors.push(descriptor(format!("delete{}", names.type_name), OperationKind::Delete));
    }
    descriptors
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{catalog_fixture, FakeSession};

    fn generator() -> ApiGenerator {
        let gateway = ExecutionGateway::new(Arc::new(FakeSession::new()), false, Duration::from_secs(5));
        ApiGenerator::new(QueryBuilder::default(), gateway, SchemaRefresher::new())
    }

    #[test]
    fn test_generates_store_keyspace() {
        let snapshot = Arc::new(catalog_fixture());
        let set = generator().generate(&snapshot, &SupportedOperations::default()).unwrap();

        assert!(set.keyspace("system").is_none());
        let store = set.keyspace("store").unwrap();
        assert!(store.schema.is_some());
        assert!(set.table_operations("store", "books").is_some());
        assert!(!set.table_operations("store", "books_by_author").unwrap().is_writable());
    }

    #[test]
    fn test_descriptors_are_sorted_and_views_read_only() {
        let snapshot = Arc::new(catalog_fixture());
        let set = generator().generate(&snapshot, &SupportedOperations::none()).unwrap();

        let mut sorted = set.descriptors.clone();
        sorted.sort();
        assert_eq!(set.descriptors, sorted);

        let view_ops: Vec<_> = set
            .descriptors
            .iter()
            .filter(|d| d.table.as_deref() == Some("books_by_author"))
            .map(|d| d.kind)
            .collect();
        assert_eq!(view_ops, vec![OperationKind::List, OperationKind::Lookup]);
        assert!(set
            .descriptors
            .iter()
            .all(|d| d.kind != OperationKind::SchemaManagement));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let snapshot = Arc::new(catalog_fixture());
        let first = generator().generate(&snapshot, &SupportedOperations::all()).unwrap();
        let second = generator().generate(&snapshot, &SupportedOperations::all()).unwrap();

        let sdl = |set: &GeneratedOperationSet| {
            set.keyspace("store")
                .and_then(|ks| ks.schema.as_ref())
                .map(|schema| schema.sdl())
        };
        assert_eq!(sdl(&first), sdl(&second));
        assert_eq!(first.descriptors, second.descriptors);
        assert_eq!(first.management_schema.sdl(), second.management_schema.sdl());
    }
}
