/// Integration tests for schema generation from a catalog snapshot
///
/// These tests verify that the generator can:
/// - Build a GraphQL schema per keyspace from `system_schema` rows
/// - Name types, inputs and enums consistently
/// - Leave out unsupported columns and colliding tables
/// - Produce identical SDL for identical input

mod schema_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use cassandra_data_api::catalog::{build_snapshot, KeyspaceFilter, SchemaSnapshot, SchemaWarning};
    use cassandra_data_api::config::SupportedOperations;
    use cassandra_data_api::gateway::ExecutionGateway;
    use cassandra_data_api::generator::{ApiGenerator, GeneratedOperationSet};
    use cassandra_data_api::query::QueryBuilder;
    use cassandra_data_api::sync::SchemaRefresher;
    use cassandra_data_api::testing::{FakeCatalog, FakeSession};

    fn snapshot(catalog: &FakeCatalog) -> Arc<SchemaSnapshot> {
        Arc::new(build_snapshot(&catalog.rows(), &KeyspaceFilter::default()).expect("Failed to build snapshot"))
    }

    fn generate(snapshot: &Arc<SchemaSnapshot>, operations: &SupportedOperations) -> GeneratedOperationSet {
        let gateway = ExecutionGateway::new(Arc::new(FakeSession::new()), false, Duration::from_secs(5));
        ApiGenerator::new(QueryBuilder::default(), gateway, SchemaRefresher::new())
            .generate(snapshot, operations)
            .expect("Failed to generate operations")
    }

    fn keyspace_sdl(set: &GeneratedOperationSet, keyspace: &str) -> String {
        set.keyspace(keyspace)
            .and_then(|ks| ks.schema.as_ref())
            .map(|schema| schema.sdl())
            .unwrap_or_default()
    }

    #[test]
    fn test_store_schema_types() {
        let _ = tracing_subscriber::fmt::try_init();

        let set = generate(&snapshot(&FakeCatalog::store()), &SupportedOperations::default());
        let sdl = keyspace_sdl(&set, "store");

        for expected in [
            "type Books ",
            "input BooksInput ",
            "input BooksFilterInput ",
            "type BooksResult ",
            "type BooksMutationResult ",
            "enum ReviewsOrder ",
            "posted_DESC",
            "input StringFilterInput ",
            "input QueryOptions ",
            "input UpdateOptions ",
            "enum QueryConsistency ",
            "enum MutationConsistency ",
            "enum SerialConsistency ",
            "scalar Uuid",
            "scalar Timestamp",
            "booksByKey(title: String!",
            "insertBooks(",
            "deleteReviews(",
        ] {
            assert!(sdl.contains(expected), "SDL is missing '{}':\n{}", expected, sdl);
        }

        // Books has no clustering columns, so no order enum
        assert!(!sdl.contains("enum BooksOrder"));
        // Views are read-only
        assert!(sdl.contains("booksByAuthor("));
        assert!(!sdl.contains("insertBooksByAuthor"));
        assert!(!sdl.contains("BooksByAuthorMutationResult"));
    }

    #[test]
    fn test_unsupported_columns_are_omitted() {
        let snapshot = snapshot(&FakeCatalog::store());
        assert!(snapshot.warnings.iter().any(|w| matches!(
            w,
            SchemaWarning::UnsupportedType { column, .. } if column == "span"
        )));

        let set = generate(&snapshot, &SupportedOperations::default());
        let sdl = keyspace_sdl(&set, "store");
        assert!(!sdl.contains("span"));
        assert!(sdl.contains("tags: [String]"));
    }

    #[test]
    fn test_colliding_tables_are_all_excluded() {
        let catalog = FakeCatalog::new()
            .table("shop", "order_items", &[("id", "int", "partition_key", 0)])
            .table("shop", "orderItems", &[("id", "int", "partition_key", 0)])
            .table("shop", "customers", &[("id", "int", "partition_key", 0)]);
        let snapshot = snapshot(&catalog);

        assert!(snapshot
            .warnings
            .iter()
            .any(|w| matches!(w, SchemaWarning::Collision { entries, .. } if entries.len() == 2)));

        let set = generate(&snapshot, &SupportedOperations::default());
        assert!(set.table_operations("shop", "order_items").is_none());
        assert!(set.table_operations("shop", "orderItems").is_none());
        assert!(set.table_operations("shop", "customers").is_some());
        assert!(!keyspace_sdl(&set, "shop").contains("OrderItems"));
    }

    #[test]
    fn test_key_column_named_like_lookup_argument() {
        let catalog = FakeCatalog::new()
            .table("shop", "prefs", &[("options", "text", "partition_key", 0), ("note", "text", "regular", -1)])
            .table("shop", "customers", &[("id", "int", "partition_key", 0), ("options", "text", "regular", -1)]);
        let snapshot = snapshot(&catalog);

        assert!(snapshot
            .warnings
            .iter()
            .any(|w| matches!(w, SchemaWarning::Collision { name, .. } if name == "options")));

        let set = generate(&snapshot, &SupportedOperations::default());
        assert!(set.table_operations("shop", "prefs").is_none());
        assert!(set.table_operations("shop", "customers").is_some());

        let sdl = keyspace_sdl(&set, "shop");
        assert!(!sdl.contains("prefsByKey"));
        assert!(sdl.contains("customersByKey(id: Int!"), "{}", sdl);
    }

    #[test]
    fn test_keyspace_without_tables_has_no_schema() {
        let catalog = FakeCatalog::new().keyspace("empty");
        let set = generate(&snapshot(&catalog), &SupportedOperations::default());
        assert!(set.keyspace("empty").unwrap().schema.is_none());
    }

    #[test]
    fn test_identical_input_gives_identical_sdl() {
        let first = generate(&snapshot(&FakeCatalog::store()), &SupportedOperations::all());
        let second = generate(&snapshot(&FakeCatalog::store()), &SupportedOperations::all());

        assert_eq!(keyspace_sdl(&first, "store"), keyspace_sdl(&second, "store"));
        assert_eq!(first.management_schema.sdl(), second.management_schema.sdl());
        assert_eq!(first.descriptors, second.descriptors);
    }

    #[test]
    fn test_management_mutations_follow_whitelist() {
        let snapshot = snapshot(&FakeCatalog::store());

        let sdl = generate(&snapshot, &SupportedOperations::all()).management_schema.sdl();
        for name in ["createKeyspace(", "dropKeyspace(", "createTable(", "dropTable(", "alterTableAdd(", "alterTableDrop("] {
            assert!(sdl.contains(name), "missing {}", name);
        }

        let sdl = generate(&snapshot, &SupportedOperations::none()).management_schema.sdl();
        assert!(!sdl.contains("type Mutation"));
        assert!(sdl.contains("keyspaces: [Keyspace!]!"));
    }
}
