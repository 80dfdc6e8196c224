/// Per-keyspace GraphQL schema
///
/// For every eligible table the schema carries a row type, its input, filter,
/// order, result and mutation-result types, and the root fields
/// `<table>`, `<table>ByKey`, `insert<Type>`, `update<Type>` and
/// `delete<Type>` (views get no mutations). Types shared between tables are
/// registered once. Output is a pure function of the tables, so identical
/// inputs produce identical SDL.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ResolverContext, Schema,
    Type, TypeRef,
};
use async_graphql::{Name, Value};
use indexmap::IndexMap;

use crate::catalog::naming::{map_entry_input_name, map_entry_name, scalar_filter_name};
use crate::catalog::{ColumnRole, TableNames};
use crate::error::{DataApiError, Result};
use crate::gateway::RequestContext;
use crate::generator::args;
use crate::generator::operations::{MutationOutcome, TableOperations};
use crate::query::{Consistency, FilterOp};
use crate::types::{register_custom_scalars, TypeKind};

pub const QUERY_OPTIONS: &str = "QueryOptions";
pub const UPDATE_OPTIONS: &str = "UpdateOptions";
pub const QUERY_CONSISTENCY: &str = "QueryConsistency";
pub const MUTATION_CONSISTENCY: &str = "MutationConsistency";
pub const SERIAL_CONSISTENCY: &str = "SerialConsistency";

/// One page of a list query, as seen by the `<Type>Result` resolvers
struct PageValue {
    rows: Vec<Value>,
    page_state: Option<String>,
}

struct MutationValue {
    applied: bool,
    value: Option<Value>,
}

impl From<MutationOutcome> for MutationValue {
    fn from(outcome: MutationOutcome) -> Self {
        Self {
            applied: outcome.applied,
            value: outcome.value.map(row_value),
        }
    }
}

/// Types several tables may need; registered once per schema
#[derive(Default)]
struct SharedTypes {
    filters: BTreeSet<&'static str>,
    entries: BTreeSet<(&'static str, &'static str)>,
}

/// Build the schema for one keyspace; `None` when it has no tables to expose
pub fn keyspace_schema(keyspace: &str, tables: &[Arc<TableOperations>]) -> Result<Option<Schema>> {
    if tables.is_empty() {
        return Ok(None);
    }

    let mut query = Object::new("Query");
    let mut mutation = Object::new("Mutation");
    let mut has_mutations = false;
    let mut types: Vec<Type> = Vec::new();
    let mut shared = SharedTypes::default();

    for operations in tables {
        let table = operations.table();
        let names = TableNames::for_table(&table.name);
        tracing::debug!("Generating GraphQL types for {}", table.qualified_name());

        for column in table.exposed_columns() {
            shared.collect(&column.type_kind);
        }

        types.push(row_object(operations).into());
        types.push(input_object(operations).into());
        let filter = filter_input(operations);
        let has_filter = filter.is_some();
        if let Some(filter) = filter {
            types.push(filter.into());
        }
        let order = order_enum(operations);
        let has_order = order.is_some();
        if let Some(order) = order {
            types.push(order.into());
        }
        types.push(result_object(&names).into());

        query = query
            .field(list_field(operations, &names, has_filter, has_order))
            .field(by_key_field(operations, &names));

        if operations.is_writable() {
            types.push(mutation_result_object(&names).into());
            mutation = mutation
                .field(mutation_field(operations, &names, MutationKind::Insert))
                .field(mutation_field(operations, &names, MutationKind::Update))
                .field(mutation_field(operations, &names, MutationKind::Delete));
            has_mutations = true;
        }
    }

    let mut builder = Schema::build("Query", has_mutations.then_some("Mutation"), None);
    for scalar in register_custom_scalars() {
        builder = builder.register(scalar);
    }
    for ty in shared.types() {
        builder = builder.register(ty);
    }
    for ty in option_types() {
        builder = builder.register(ty);
    }
    for ty in types {
        builder = builder.register(ty);
    }
    builder = builder.register(query);
    if has_mutations {
        builder = builder.register(mutation);
    }

    let schema = builder.finish().map_err(|e| {
        DataApiError::SchemaGeneration(format!("Failed to build schema for keyspace '{}': {}", keyspace, e))
    })?;
    Ok(Some(schema))
}

impl SharedTypes {
    fn collect(&mut self, kind: &TypeKind) {
        match kind {
            TypeKind::Scalar(scalar) => {
                self.filters.insert(scalar.graphql_name());
            }
            TypeKind::Map(key, value) => {
                self.entries.insert((key.graphql_name(), value.graphql_name()));
            }
            _ => {}
        }
    }

    fn types(&self) -> Vec<Type> {
        let mut types: Vec<Type> = Vec::new();
        for scalar in &self.filters {
            let mut filter = InputObject::new(scalar_filter_name(scalar));
            for op in FilterOp::ALL {
                let ty = if op == FilterOp::In {
                    TypeRef::named_list(*scalar)
                } else {
                    TypeRef::named(*scalar)
                };
                filter = filter.field(InputValue::new(op.field_name(), ty));
            }
            types.push(filter.into());
        }
        for (key, value) in &self.entries {
            let entry = Object::new(map_entry_name(key, value))
                .field(value_field("key", "key", TypeRef::named_nn(*key)))
                .field(value_field("value", "value", TypeRef::named(*value)));
            let entry_input = InputObject::new(map_entry_input_name(key, value))
                .field(InputValue::new("key", TypeRef::named_nn(*key)))
                .field(InputValue::new("value", TypeRef::named(*value)));
            types.push(entry.into());
            types.push(entry_input.into());
        }
        types
    }
}

/// Options inputs and consistency enums every keyspace schema carries
fn option_types() -> Vec<Type> {
    vec![
        consistency_enum(QUERY_CONSISTENCY, &Consistency::READ).into(),
        consistency_enum(MUTATION_CONSISTENCY, &Consistency::WRITE).into(),
        consistency_enum(SERIAL_CONSISTENCY, &[Consistency::Serial, Consistency::LocalSerial]).into(),
        InputObject::new(QUERY_OPTIONS)
            .field(InputValue::new("consistency", TypeRef::named(QUERY_CONSISTENCY)))
            .field(InputValue::new("limit", TypeRef::named(TypeRef::INT)))
            .field(InputValue::new("pageSize", TypeRef::named(TypeRef::INT)))
            .field(InputValue::new("pageState", TypeRef::named(TypeRef::STRING)))
            .into(),
        InputObject::new(UPDATE_OPTIONS)
            .field(InputValue::new("consistency", TypeRef::named(MUTATION_CONSISTENCY)))
            .field(InputValue::new("serialConsistency", TypeRef::named(SERIAL_CONSISTENCY)))
            .field(InputValue::new("ttl", TypeRef::named(TypeRef::INT)))
            .into(),
    ]
}

fn consistency_enum(name: &str, levels: &[Consistency]) -> Enum {
    levels
        .iter()
        .fold(Enum::new(name), |e, level| e.item(EnumItem::new(level.as_str())))
}

fn row_object(operations: &TableOperations) -> Object {
    let table = operations.table();
    let mut object = Object::new(&table.type_name);
    for column in table.exposed_columns() {
        object = object.field(value_field(&column.field_name, &column.name, output_type(&column.type_kind)));
    }
    object
}

fn input_object(operations: &TableOperations) -> InputObject {
    let table = operations.table();
    let names = TableNames::for_table(&table.name);
    let mut input = InputObject::new(names.input());
    for column in table.exposed_columns() {
        input = input.field(InputValue::new(&column.field_name, input_type(&column.type_kind)));
    }
    input
}

/// Scalar columns only; collections are matched through `value`
fn filter_input(operations: &TableOperations) -> Option<InputObject> {
    let table = operations.table();
    let names = TableNames::for_table(&table.name);
    let mut input = InputObject::new(names.filter_input());
    let mut any = false;
    for column in table.exposed_columns() {
        if let TypeKind::Scalar(scalar) = &column.type_kind {
            input = input.field(InputValue::new(
                &column.field_name,
                TypeRef::named(scalar_filter_name(scalar.graphql_name())),
            ));
            any = true;
        }
    }
    any.then_some(input)
}

fn order_enum(operations: &TableOperations) -> Option<Enum> {
    let table = operations.table();
    let names = TableNames::for_table(&table.name);
    let clustering: Vec<_> = table
        .exposed_columns()
        .filter(|c| c.role == ColumnRole::Clustering)
        .collect();
    if clustering.is_empty() {
        return None;
    }
    let mut order = Enum::new(names.order());
    for column in clustering {
        order = order
            .item(EnumItem::new(format!("{}_ASC", column.field_name)))
            .item(EnumItem::new(format!("{}_DESC", column.field_name)));
    }
    Some(order)
}

fn result_object(names: &TableNames) -> Object {
    Object::new(names.result())
        .field(Field::new("pageState", TypeRef::named(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let page = ctx.parent_value.try_downcast_ref::<PageValue>()?;
                Ok(page
                    .page_state
                    .as_ref()
                    .map(|token| FieldValue::value(Value::String(token.clone()))))
            })
        }))
        .field(Field::new(
            "values",
            TypeRef::named_nn_list_nn(&names.type_name),
            |ctx| {
                FieldFuture::new(async move {
                    let page = ctx.parent_value.try_downcast_ref::<PageValue>()?;
                    Ok(Some(FieldValue::list(
                        page.rows.iter().cloned().map(FieldValue::owned_any),
                    )))
                })
            },
        ))
}

fn mutation_result_object(names: &TableNames) -> Object {
    Object::new(names.mutation_result())
        .field(Field::new("applied", TypeRef::named_nn(TypeRef::BOOLEAN), |ctx| {
            FieldFuture::new(async move {
                let outcome = ctx.parent_value.try_downcast_ref::<MutationValue>()?;
                Ok(Some(FieldValue::value(Value::Boolean(outcome.applied))))
            })
        }))
        .field(Field::new("value", TypeRef::named(&names.type_name), |ctx| {
            FieldFuture::new(async move {
                let outcome = ctx.parent_value.try_downcast_ref::<MutationValue>()?;
                Ok(outcome.value.clone().map(FieldValue::owned_any))
            })
        }))
}

fn list_field(
    operations: &Arc<TableOperations>,
    names: &TableNames,
    has_filter: bool,
    has_order: bool,
) -> Field {
    let ops = Arc::clone(operations);
    let mut field = Field::new(&names.field_name, TypeRef::named_nn(names.result()), move |ctx| {
        let ops = ops.clone();
        FieldFuture::new(async move {
            let request = args::query_request(
                ops.table(),
                arg(&ctx, "value"),
                arg(&ctx, "filter"),
                arg(&ctx, "orderBy"),
                arg(&ctx, "options"),
            )?;
            let page = ops.list(&request, &request_context(&ctx)).await?;
            Ok(Some(FieldValue::owned_any(PageValue {
                page_state: page.cursor.to_token(),
                rows: page.rows.into_iter().map(row_value).collect(),
            })))
        })
    })
    .argument(InputValue::new("value", TypeRef::named(names.input())));

    if has_filter {
        field = field.argument(InputValue::new("filter", TypeRef::named(names.filter_input())));
    }
    if has_order {
        field = field.argument(InputValue::new("orderBy", TypeRef::named_nn_list(names.order())));
    }
    field.argument(InputValue::new("options", TypeRef::named(QUERY_OPTIONS)))
}

fn by_key_field(operations: &Arc<TableOperations>, names: &TableNames) -> Field {
    let key_fields: Vec<String> = operations
        .table()
        .primary_key()
        .map(|c| c.field_name.clone())
        .collect();
    let arguments: Vec<InputValue> = operations
        .table()
        .primary_key()
        .map(|c| InputValue::new(&c.field_name, TypeRef::NonNull(Box::new(input_type(&c.type_kind)))))
        .collect();

    let ops = Arc::clone(operations);
    let field = Field::new(names.by_key_field(), TypeRef::named(&names.type_name), move |ctx| {
        let ops = ops.clone();
        let key_fields = key_fields.clone();
        FieldFuture::new(async move {
            let key = args::key_values(
                ops.table(),
                key_fields
                    .iter()
                    .filter_map(|name| arg(&ctx, name).map(|value| (name.as_str(), value))),
            )?;
            let options = args::query_request(ops.table(), None, None, None, arg(&ctx, "options"))?;
            let row = ops.get(&key, options.consistency, &request_context(&ctx)).await?;
            Ok(row.map(|row| FieldValue::owned_any(row_value(row))))
        })
    });

    arguments
        .into_iter()
        .fold(field, |field, argument| field.argument(argument))
        .argument(InputValue::new("options", TypeRef::named(QUERY_OPTIONS)))
}

#[derive(Clone, Copy)]
enum MutationKind {
    Insert,
    Update,
    Delete,
}

fn mutation_field(operations: &Arc<TableOperations>, names: &TableNames, kind: MutationKind) -> Field {
    let (name, condition) = match kind {
        MutationKind::Insert => (names.insert_field(), "ifNotExists"),
        MutationKind::Update => (names.update_field(), "ifExists"),
        MutationKind::Delete => (names.delete_field(), "ifExists"),
    };

    let ops = Arc::clone(operations);
    Field::new(name, TypeRef::named(names.mutation_result()), move |ctx| {
        let ops = ops.clone();
        FieldFuture::new(async move {
            let conditional = matches!(arg(&ctx, condition), Some(Value::Boolean(true)));
            let (if_exists, if_not_exists) = match kind {
                MutationKind::Insert => (false, conditional),
                MutationKind::Update | MutationKind::Delete => (conditional, false),
            };
            let request = args::mutation_request(
                ops.table(),
                arg(&ctx, "value"),
                if_exists,
                if_not_exists,
                arg(&ctx, "options"),
            )?;
            let context = request_context(&ctx);
            let outcome = match kind {
                MutationKind::Insert => ops.insert(&request, &context).await?,
                MutationKind::Update => ops.update(&request, &context).await?,
                MutationKind::Delete => ops.delete(&request, &context).await?,
            };
            Ok(Some(FieldValue::owned_any(MutationValue::from(outcome))))
        })
    })
    .argument(InputValue::new("value", TypeRef::named_nn(names.input())))
    .argument(InputValue::new(condition, TypeRef::named(TypeRef::BOOLEAN)))
    .argument(InputValue::new("options", TypeRef::named(UPDATE_OPTIONS)))
}

/// Field read from the parent `Value::Object` under `key`
pub(crate) fn value_field(name: &str, key: &str, ty: TypeRef) -> Field {
    let key = key.to_string();
    Field::new(name, ty, move |ctx| {
        let key = key.clone();
        FieldFuture::new(async move {
            let parent = ctx.parent_value.try_downcast_ref::<Value>()?;
            match parent {
                Value::Object(object) => Ok(object.get(key.as_str()).cloned().and_then(to_field_value)),
                _ => Ok(None),
            }
        })
    })
}

/// Objects nest as `owned_any` so their own fields can read them
pub(crate) fn to_field_value(value: Value) -> Option<FieldValue<'static>> {
    match value {
        Value::Null => None,
        Value::List(items) => Some(FieldValue::list(
            items
                .into_iter()
                .map(|item| to_field_value(item).unwrap_or(FieldValue::NULL)),
        )),
        Value::Object(_) => Some(FieldValue::owned_any(value)),
        other => Some(FieldValue::value(other)),
    }
}

pub(crate) fn row_value(row: IndexMap<String, Value>) -> Value {
    Value::Object(row.into_iter().map(|(k, v)| (Name::new(k), v)).collect())
}

pub(crate) fn arg<'a>(ctx: &'a ResolverContext<'_>, name: &str) -> Option<&'a Value> {
    ctx.args.get(name).map(|accessor| accessor.as_value())
}

pub(crate) fn request_context(ctx: &ResolverContext<'_>) -> RequestContext {
    ctx.data_opt::<RequestContext>().cloned().unwrap_or_default()
}

fn output_type(kind: &TypeKind) -> TypeRef {
    match kind {
        TypeKind::Scalar(scalar) => TypeRef::named(scalar.graphql_name()),
        TypeKind::List(scalar) | TypeKind::Set(scalar) => TypeRef::named_list(scalar.graphql_name()),
        TypeKind::Map(key, value) => TypeRef::named_list(map_entry_name(key.graphql_name(), value.graphql_name())),
        TypeKind::Unsupported(_) => TypeRef::named(TypeRef::STRING),
    }
}

fn input_type(kind: &TypeKind) -> TypeRef {
    match kind {
        TypeKind::Map(key, value) => {
            TypeRef::named_list(map_entry_input_name(key.graphql_name(), value.graphql_name()))
        }
        other => output_type(other),
    }
}
