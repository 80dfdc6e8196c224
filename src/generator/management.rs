/// Schema management
///
/// Keyspace and table DDL behind the configured whitelist, plus read-only
/// queries over the current snapshot. A successful change asks the
/// synchronizer for an immediate refresh.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_graphql::dynamic::{Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Object, Schema, TypeRef};
use async_graphql::{Name, Value};
use indexmap::IndexMap;

use crate::catalog::{ClusteringOrder, Column, ColumnRole, Keyspace, SchemaSnapshot, Table};
use crate::config::{SchemaOperation, SupportedOperations};
use crate::error::{DataApiError, Result};
use crate::gateway::{ExecutionGateway, RequestContext};
use crate::generator::graphql::{arg, request_context, to_field_value, value_field};
use crate::query::{ClusteringDefinition, ColumnDefinition, QueryBuilder, Replication, SchemaChange};
use crate::sync::SchemaRefresher;

pub struct SchemaManagement {
    builder: QueryBuilder,
    gateway: ExecutionGateway,
    operations: SupportedOperations,
    refresher: SchemaRefresher,
}

impl SchemaManagement {
    pub fn new(
        builder: QueryBuilder,
        gateway: ExecutionGateway,
        operations: SupportedOperations,
        refresher: SchemaRefresher,
    ) -> Self {
        Self {
            builder,
            gateway,
            operations,
            refresher,
        }
    }

    pub fn operations(&self) -> &SupportedOperations {
        &self.operations
    }

    pub fn is_enabled(&self, operation: SchemaOperation) -> bool {
        self.operations.contains(operation)
    }

    /// Run one schema change; disabled operations are reported as not found
    pub async fn apply(&self, change: &SchemaChange, context: &RequestContext) -> Result<()> {
        let operation = change.operation();
        if !self.is_enabled(operation) {
            return Err(DataApiError::NotFound(format!(
                "schema operation {} is not enabled",
                operation
            )));
        }

        let plan = self.builder.build_ddl(change)?;
        tracing::info!("Applying schema change: {}", plan.statement);
        self.gateway.execute(&plan, &context.identity, &context.cancel).await?;
        self.refresher.request();
        Ok(())
    }
}

/// Build the schema-management GraphQL schema over `snapshot`
///
/// Mutations are present only when whitelisted; with none enabled the schema
/// has no mutation type.
pub fn management_schema(snapshot: Arc<SchemaSnapshot>, management: Arc<SchemaManagement>) -> Result<Schema> {
    let keyspaces_snapshot = Arc::clone(&snapshot);
    let keyspace_snapshot = Arc::clone(&snapshot);

    let query = Object::new("Query")
        .field(Field::new(
            "keyspaces",
            TypeRef::named_nn_list_nn("Keyspace"),
            move |_ctx| {
                let snapshot = Arc::clone(&keyspaces_snapshot);
                FieldFuture::new(async move {
                    let keyspaces: Vec<Value> = snapshot
                        .keyspaces
                        .iter()
                        .filter(|ks| !ks.excluded)
                        .map(keyspace_value)
                        .collect();
                    Ok(to_field_value(Value::List(keyspaces)))
                })
            },
        ))
        .field(
            Field::new("keyspace", TypeRef::named("Keyspace"), move |ctx| {
                let snapshot = Arc::clone(&keyspace_snapshot);
                FieldFuture::new(async move {
                    let name = ctx.args.try_get("name")?.string()?.to_string();
                    Ok(snapshot
                        .keyspace(&name)
                        .filter(|ks| !ks.excluded)
                        .map(|ks| FieldValue::owned_any(keyspace_value(ks))))
                })
            })
            .argument(InputValue::new("name", TypeRef::named_nn(TypeRef::STRING))),
        );

    let mut mutation = Object::new("Mutation");
    let mut has_mutations = false;
    for operation in management.operations().iter() {
        mutation = mutation.field(mutation_field(operation, Arc::clone(&management)));
        has_mutations = true;
    }

    let mut builder = Schema::build("Query", has_mutations.then_some("Mutation"), None)
        .register(
            Object::new("Keyspace")
                .field(value_field("name", "name", TypeRef::named_nn(TypeRef::STRING)))
                .field(value_field("tables", "tables", TypeRef::named_nn_list_nn("Table")))
                .field(
                    Field::new("table", TypeRef::named("Table"), |ctx| {
                        FieldFuture::new(async move {
                            let name = ctx.args.try_get("name")?.string()?.to_string();
                            let parent = ctx.parent_value.try_downcast_ref::<Value>()?;
                            let table = match parent {
                                Value::Object(ks) => match ks.get("tables") {
                                    Some(Value::List(tables)) => tables
                                        .iter()
                                        .find(|t| matches!(t, Value::Object(o) if o.get("name") == Some(&Value::String(name.clone()))))
                                        .cloned(),
                                    _ => None,
                                },
                                _ => None,
                            };
                            Ok(table.map(FieldValue::owned_any))
                        })
                    })
                    .argument(InputValue::new("name", TypeRef::named_nn(TypeRef::STRING))),
                ),
        )
        .register(
            Object::new("Table")
                .field(value_field("name", "name", TypeRef::named_nn(TypeRef::STRING)))
                .field(value_field("view", "view", TypeRef::named_nn(TypeRef::BOOLEAN)))
                .field(value_field("baseTable", "baseTable", TypeRef::named(TypeRef::STRING)))
                .field(value_field("columns", "columns", TypeRef::named_nn_list_nn("Column"))),
        )
        .register(
            Object::new("Column")
                .field(value_field("name", "name", TypeRef::named_nn(TypeRef::STRING)))
                .field(value_field("kind", "kind", TypeRef::named_nn("ColumnKind")))
                .field(value_field("type", "type", TypeRef::named_nn(TypeRef::STRING)))
                .field(value_field("order", "order", TypeRef::named("ClusteringOrder")))
                .field(value_field("supported", "supported", TypeRef::named_nn(TypeRef::BOOLEAN))),
        )
        .register(
            Enum::new("ColumnKind")
                .item(EnumItem::new("PARTITION"))
                .item(EnumItem::new("CLUSTERING"))
                .item(EnumItem::new("STATIC"))
                .item(EnumItem::new("REGULAR")),
        )
        .register(Enum::new("ClusteringOrder").item(EnumItem::new("ASC")).item(EnumItem::new("DESC")));

    if has_mutations {
        builder = builder
            .register(
                InputObject::new("DataCenterInput")
                    .field(InputValue::new("name", TypeRef::named_nn(TypeRef::STRING)))
                    .field(InputValue::new("replicas", TypeRef::named_nn(TypeRef::INT))),
            )
            .register(
                InputObject::new("ColumnInput")
                    .field(InputValue::new("name", TypeRef::named_nn(TypeRef::STRING)))
                    .field(InputValue::new("type", TypeRef::named_nn(TypeRef::STRING))),
            )
            .register(
                InputObject::new("ClusteringKeyInput")
                    .field(InputValue::new("name", TypeRef::named_nn(TypeRef::STRING)))
                    .field(InputValue::new("type", TypeRef::named_nn(TypeRef::STRING)))
                    .field(InputValue::new("order", TypeRef::named("ClusteringOrder"))),
            )
            .register(mutation);
    }

    builder
        .register(query)
        .finish()
        .map_err(|e| DataApiError::SchemaGeneration(format!("Failed to build schema management schema: {}", e)))
}

fn mutation_field(operation: SchemaOperation, management: Arc<SchemaManagement>) -> Field {
    let field = Field::new(operation.mutation_name(), TypeRef::named_nn(TypeRef::BOOLEAN), move |ctx| {
        let management = Arc::clone(&management);
        FieldFuture::new(async move {
            let args: IndexMap<Name, Value> = ctx
                .args
                .iter()
                .map(|(name, value)| (name.clone(), value.as_value().clone()))
                .collect();
            let change = schema_change(operation, &Value::Object(args))?;
            management.apply(&change, &request_context(&ctx)).await?;
            Ok(Some(FieldValue::value(Value::Boolean(true))))
        })
    });

    let string = || TypeRef::named_nn(TypeRef::STRING);
    let arguments = match operation {
        SchemaOperation::KeyspaceCreate => vec![
            InputValue::new("name", string()),
            InputValue::new("dcs", TypeRef::named_nn_list("DataCenterInput")),
            InputValue::new("replicas", TypeRef::named(TypeRef::INT)),
            InputValue::new("ifNotExists", TypeRef::named(TypeRef::BOOLEAN)),
        ],
        SchemaOperation::KeyspaceDrop => vec![
            InputValue::new("name", string()),
            InputValue::new("ifExists", TypeRef::named(TypeRef::BOOLEAN)),
        ],
        SchemaOperation::TableCreate => vec![
            InputValue::new("keyspaceName", string()),
            InputValue::new("tableName", string()),
            InputValue::new("partitionKeys", TypeRef::named_nn_list_nn("ColumnInput")),
            InputValue::new("clusteringKeys", TypeRef::named_nn_list("ClusteringKeyInput")),
            InputValue::new("values", TypeRef::named_nn_list("ColumnInput")),
            InputValue::new("ifNotExists", TypeRef::named(TypeRef::BOOLEAN)),
        ],
        SchemaOperation::TableDrop => vec![
            InputValue::new("keyspaceName", string()),
            InputValue::new("tableName", string()),
            InputValue::new("ifExists", TypeRef::named(TypeRef::BOOLEAN)),
        ],
        SchemaOperation::TableAlterAdd => vec![
            InputValue::new("keyspaceName", string()),
            InputValue::new("tableName", string()),
            InputValue::new("toAdd", TypeRef::named_nn_list_nn("ColumnInput")),
        ],
        SchemaOperation::TableAlterDrop => vec![
            InputValue::new("keyspaceName", string()),
            InputValue::new("tableName", string()),
            InputValue::new("toDrop", TypeRef::named_nn_list_nn(TypeRef::STRING)),
        ],
    };
    arguments
        .into_iter()
        .fold(field, |field, argument| field.argument(argument))
}

/// Decode mutation arguments (GraphQL) or a request body (REST) into a change
///
/// REST bodies name the keyspace and table with `keyspaceName`/`tableName` too.
pub fn schema_change(operation: SchemaOperation, args: &Value) -> Result<SchemaChange> {
    let args = match args {
        Value::Object(args) => args,
        _ => return Err(DataApiError::Validation("expected an object".to_string())),
    };

    let change = match operation {
        SchemaOperation::KeyspaceCreate => {
            let replication = match args.get("dcs") {
                Some(Value::List(dcs)) if !dcs.is_empty() => {
                    let mut data_centers = BTreeMap::new();
                    for dc in dcs {
                        let dc = object(dc, "dcs")?;
                        data_centers.insert(required_string(dc, "name")?, replicas(dc.get("replicas"))?);
                    }
                    Replication::NetworkTopology { data_centers }
                }
                _ => Replication::Simple {
                    replication_factor: match args.get("replicas") {
                        None | Some(Value::Null) => 1,
                        replicas_arg => replicas(replicas_arg)?,
                    },
                },
            };
            SchemaChange::CreateKeyspace {
                name: required_string(args, "name")?,
                replication,
                if_not_exists: flag(args, "ifNotExists"),
            }
        }
        SchemaOperation::KeyspaceDrop => SchemaChange::DropKeyspace {
            name: required_string(args, "name")?,
            if_exists: flag(args, "ifExists"),
        },
        SchemaOperation::TableCreate => SchemaChange::CreateTable {
            keyspace: required_string(args, "keyspaceName")?,
            table: required_string(args, "tableName")?,
            partition_keys: column_definitions(args.get("partitionKeys"))?,
            clustering_keys: match args.get("clusteringKeys") {
                Some(Value::List(keys)) => keys
                    .iter()
                    .map(|key| {
                        let key = object(key, "clusteringKeys")?;
                        Ok(ClusteringDefinition {
                            column: column_definition(key)?,
                            order: match key.get("order") {
                                Some(Value::Enum(o)) if o.as_str() == "DESC" => ClusteringOrder::Desc,
                                Some(Value::String(o)) if o.eq_ignore_ascii_case("desc") => ClusteringOrder::Desc,
                                _ => ClusteringOrder::Asc,
                            },
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
                _ => Vec::new(),
            },
            values: column_definitions(args.get("values"))?,
            if_not_exists: flag(args, "ifNotExists"),
        },
        SchemaOperation::TableDrop => SchemaChange::DropTable {
            keyspace: required_string(args, "keyspaceName")?,
            table: required_string(args, "tableName")?,
            if_exists: flag(args, "ifExists"),
        },
        SchemaOperation::TableAlterAdd => SchemaChange::AlterTableAdd {
            keyspace: required_string(args, "keyspaceName")?,
            table: required_string(args, "tableName")?,
            columns: column_definitions(args.get("toAdd"))?,
        },
        SchemaOperation::TableAlterDrop => SchemaChange::AlterTableDrop {
            keyspace: required_string(args, "keyspaceName")?,
            table: required_string(args, "tableName")?,
            columns: match args.get("toDrop") {
                Some(Value::List(names)) => names
                    .iter()
                    .map(|name| match name {
                        Value::String(name) => Ok(name.clone()),
                        _ => Err(DataApiError::Validation("toDrop must list column names".to_string())),
                    })
                    .collect::<Result<Vec<_>>>()?,
                _ => return Err(DataApiError::Validation("toDrop is required".to_string())),
            },
        },
    };
    Ok(change)
}

/// Snapshot keyspace as the `Keyspace` type reads it
pub fn keyspace_value(keyspace: &Keyspace) -> Value {
    let mut object = IndexMap::new();
    object.insert(Name::new("name"), Value::String(keyspace.name.clone()));
    object.insert(
        Name::new("tables"),
        Value::List(keyspace.tables.iter().map(table_value).collect()),
    );
    Value::Object(object)
}

pub fn table_value(table: &Table) -> Value {
    let mut object = IndexMap::new();
    object.insert(Name::new("name"), Value::String(table.name.clone()));
    object.insert(Name::new("view"), Value::Boolean(table.is_view()));
    object.insert(
        Name::new("baseTable"),
        match &table.kind {
            crate::catalog::TableKind::View { base_table } => Value::String(base_table.clone()),
            crate::catalog::TableKind::Base => Value::Null,
        },
    );
    object.insert(
        Name::new("columns"),
        Value::List(table.columns.iter().map(column_value).collect()),
    );
    Value::Object(object)
}

fn column_value(column: &Column) -> Value {
    let kind = match column.role {
        ColumnRole::PartitionKey => "PARTITION",
        ColumnRole::Clustering => "CLUSTERING",
        ColumnRole::Static => "STATIC",
        ColumnRole::Regular => "REGULAR",
    };
    let mut object = IndexMap::new();
    object.insert(Name::new("name"), Value::String(column.name.clone()));
    object.insert(Name::new("kind"), Value::Enum(Name::new(kind)));
    object.insert(Name::new("type"), Value::String(column.cql_type.clone()));
    object.insert(
        Name::new("order"),
        match column.clustering_order {
            Some(ClusteringOrder::Asc) => Value::Enum(Name::new("ASC")),
            Some(ClusteringOrder::Desc) => Value::Enum(Name::new("DESC")),
            None => Value::Null,
        },
    );
    object.insert(Name::new("supported"), Value::Boolean(column.is_exposed()));
    Value::Object(object)
}

fn object<'v>(value: &'v Value, argument: &str) -> Result<&'v IndexMap<Name, Value>> {
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(DataApiError::Validation(format!("{} entries must be objects", argument))),
    }
}

fn required_string(args: &IndexMap<Name, Value>, key: &str) -> Result<String> {
    match args.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(DataApiError::Validation(format!("{} is required", key))),
    }
}

fn flag(args: &IndexMap<Name, Value>, key: &str) -> bool {
    matches!(args.get(key), Some(Value::Boolean(true)))
}

fn replicas(value: Option<&Value>) -> Result<u32> {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| DataApiError::Validation("replicas must be a positive integer".to_string())),
        _ => Err(DataApiError::Validation("replicas is required".to_string())),
    }
}

fn column_definition(args: &IndexMap<Name, Value>) -> Result<ColumnDefinition> {
    Ok(ColumnDefinition::new(required_string(args, "name")?, required_string(args, "type")?))
}

fn column_definitions(value: Option<&Value>) -> Result<Vec<ColumnDefinition>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::List(columns)) => columns
            .iter()
            .map(|column| column_definition(object(column, "columns")?))
            .collect(),
        Some(_) => Err(DataApiError::Validation("expected a list of columns".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gateway::RequestIdentity;
    use crate::testing::{catalog_fixture, FakeSession};

    fn management(session: Arc<FakeSession>, operations: SupportedOperations) -> (SchemaManagement, SchemaRefresher) {
        let refresher = SchemaRefresher::new();
        let gateway = ExecutionGateway::new(session, false, Duration::from_secs(5));
        (
            SchemaManagement::new(QueryBuilder::default(), gateway, operations, refresher.clone()),
            refresher,
        )
    }

    fn json(text: &str) -> Value {
        Value::from_json(serde_json::from_str(text).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_enabled_change_runs_and_requests_refresh() {
        let session = Arc::new(FakeSession::new());
        let (management, refresher) = management(session.clone(), SupportedOperations::default());
        let change = schema_change(
            SchemaOperation::TableCreate,
            &json(r#"{"keyspaceName": "store", "tableName": "loans",
                      "partitionKeys": [{"name": "id", "type": "uuid"}],
                      "values": [{"name": "note", "type": "text"}]}"#),
        )
        .unwrap();

        management.apply(&change, &RequestContext::default()).await.unwrap();
        assert_eq!(
            session.calls()[0].statement,
            r#"CREATE TABLE "store"."loans" ("id" uuid, "note" text, PRIMARY KEY (("id")))"#
        );
        tokio::time::timeout(Duration::from_millis(50), refresher.requested())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_change_is_not_found() {
        let session = Arc::new(FakeSession::new());
        let (management, _) = management(session.clone(), SupportedOperations::default());
        let change = SchemaChange::DropKeyspace {
            name: "store".to_string(),
            if_exists: false,
        };

        let err = management.apply(&change, &RequestContext::default()).await.unwrap_err();
        assert!(matches!(err, DataApiError::NotFound(_)));
        assert_eq!(session.call_count(), 0);
    }

    #[test]
    fn test_keyspace_replication_forms() {
        let simple = schema_change(SchemaOperation::KeyspaceCreate, &json(r#"{"name": "ks"}"#)).unwrap();
        assert!(matches!(
            simple,
            SchemaChange::CreateKeyspace {
                replication: Replication::Simple { replication_factor: 1 },
                ..
            }
        ));

        let dcs = schema_change(
            SchemaOperation::KeyspaceCreate,
            &json(r#"{"name": "ks", "dcs": [{"name": "dc1", "replicas": 3}]}"#),
        )
        .unwrap();
        match dcs {
            SchemaChange::CreateKeyspace {
                replication: Replication::NetworkTopology { data_centers },
                ..
            } => assert_eq!(data_centers.get("dc1"), Some(&3)),
            other => panic!("unexpected change {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_schema_has_only_whitelisted_mutations() {
        let session = Arc::new(FakeSession::new());
        let snapshot = Arc::new(catalog_fixture());

        let (none, _) = management(session.clone(), SupportedOperations::none());
        let sdl = management_schema(snapshot.clone(), Arc::new(none)).unwrap().sdl();
        assert!(!sdl.contains("type Mutation"));

        let (default, _) = management(session, SupportedOperations::default());
        let sdl = management_schema(snapshot, Arc::new(default)).unwrap().sdl();
        assert!(sdl.contains("createTable("));
        assert!(sdl.contains("createKeyspace("));
        assert!(!sdl.contains("dropKeyspace("));
    }

    #[tokio::test]
    async fn test_keyspace_query_reads_snapshot() {
        let session = Arc::new(FakeSession::new());
        let (management, _) = management(session, SupportedOperations::none());
        let schema = management_schema(Arc::new(catalog_fixture()), Arc::new(management)).unwrap();

        let response = schema
            .execute(
                async_graphql::Request::new(r#"{ keyspace(name: "store") { table(name: "reviews") { columns { name kind order } } } }"#)
                    .data(RequestContext::new(RequestIdentity::Anonymous)),
            )
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["keyspace"]["table"]["columns"][1]["name"], "posted");
        assert_eq!(data["keyspace"]["table"]["columns"][1]["kind"], "CLUSTERING");
        assert_eq!(data["keyspace"]["table"]["columns"][1]["order"], "DESC");

        let response = schema.execute(r#"{ keyspace(name: "system") { name } }"#).await;
        assert_eq!(response.data.into_json().unwrap()["keyspace"], serde_json::Value::Null);
    }
}
