//! REST resources under `{rest_path}/v1`
//!
//! Rows are addressed by their primary key, written in the URL as the key
//! values in key order separated by `;`. Schema-management resources answer
//! 404 unless the operation is enabled.

use std::sync::Arc;

use async_graphql::{Name, Value};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::catalog::{ClusteringOrder, ColumnRole, Table};
use crate::config::SchemaOperation;
use crate::error::DataApiError;
use crate::gateway::RequestContext;
use crate::generator::graphql::row_value;
use crate::generator::{args, schema_change, MutationOutcome, TableOperations};
use crate::routes::AppState;
use crate::types::value_from_text;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/keyspaces", get(list_keyspaces).post(create_keyspace))
        .route("/keyspaces/:keyspace", delete(drop_keyspace))
        .route("/keyspaces/:keyspace/tables", get(list_tables).post(create_table))
        .route("/keyspaces/:keyspace/tables/:table", get(describe_table).delete(drop_table))
        .route("/keyspaces/:keyspace/tables/:table/columns", post(add_columns))
        .route("/keyspaces/:keyspace/tables/:table/columns/:column", delete(drop_column))
        .route("/keyspaces/:keyspace/tables/:table/rows", get(list_rows).post(insert_row))
        .route(
            "/keyspaces/:keyspace/tables/:table/rows/:key",
            get(get_row).put(update_row).delete(delete_row),
        )
}

/// Error body: `{"description": ..., "code": ...}`
#[derive(Debug, Serialize)]
pub struct RestError {
    pub description: String,
    pub code: u16,
}

impl RestError {
    fn new(status: StatusCode, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            code: status.as_u16(),
        }
    }
}

impl From<DataApiError> for RestError {
    fn from(err: DataApiError) -> Self {
        let status = match &err {
            DataApiError::Validation(_) | DataApiError::QueryBuild(_) | DataApiError::Type(_) => StatusCode::BAD_REQUEST,
            DataApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            DataApiError::NotFound(_) => StatusCode::NOT_FOUND,
            DataApiError::Cancelled(_) => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("REST request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

type RestResult<T> = std::result::Result<T, RestError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ColumnDescription {
    name: String,
    type_definition: String,
    #[serde(rename = "static")]
    is_static: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrimaryKeyDescription {
    partition_key: Vec<String>,
    clustering_key: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusteringDescription {
    column: String,
    order: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableDescription {
    name: String,
    keyspace: String,
    column_definitions: Vec<ColumnDescription>,
    primary_key: PrimaryKeyDescription,
    clustering_expression: Vec<ClusteringDescription>,
}

impl From<&Table> for TableDescription {
    fn from(table: &Table) -> Self {
        let names = |role: ColumnRole| {
            table
                .columns
                .iter()
                .filter(|c| c.role == role)
                .map(|c| c.name.clone())
                .collect()
        };
        Self {
            name: table.name.clone(),
            keyspace: table.keyspace.clone(),
            column_definitions: table
                .exposed_columns()
                .map(|c| ColumnDescription {
                    name: c.name.clone(),
                    type_definition: c.cql_type.clone(),
                    is_static: c.role == ColumnRole::Static,
                })
                .collect(),
            primary_key: PrimaryKeyDescription {
                partition_key: names(ColumnRole::PartitionKey),
                clustering_key: names(ColumnRole::Clustering),
            },
            clustering_expression: table
                .clustering_key()
                .map(|c| ClusteringDescription {
                    column: c.name.clone(),
                    order: match c.clustering_order {
                        Some(ClusteringOrder::Desc) => "DESC",
                        _ => "ASC",
                    },
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RowsResponse {
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_state: Option<String>,
    rows: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct MutationResponse {
    applied: bool,
    value: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsQuery {
    /// JSON object of `column -> {operator: value}`
    #[serde(rename = "where")]
    pub filter: Option<String>,
    /// Comma-separated `column asc|desc` entries
    pub order_by: Option<String>,
    pub page_size: Option<i64>,
    pub page_state: Option<String>,
    pub limit: Option<i64>,
    pub consistency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteQuery {
    pub consistency: Option<String>,
    pub serial_consistency: Option<String>,
    pub ttl: Option<i64>,
    #[serde(default)]
    pub if_exists: bool,
    #[serde(default)]
    pub if_not_exists: bool,
}

impl WriteQuery {
    fn options(&self) -> Value {
        let mut options = IndexMap::new();
        insert_string(&mut options, "consistency", &self.consistency);
        insert_string(&mut options, "serialConsistency", &self.serial_consistency);
        if let Some(ttl) = self.ttl {
            options.insert(Name::new("ttl"), Value::from(ttl));
        }
        Value::Object(options)
    }
}

async fn list_keyspaces(State(state): State<AppState>) -> Json<Vec<String>> {
    let api = state.current();
    Json(
        api.snapshot
            .keyspaces
            .iter()
            .filter(|ks| !ks.excluded)
            .map(|ks| ks.name.clone())
            .collect(),
    )
}

async fn list_tables(State(state): State<AppState>, Path(keyspace): Path<String>) -> RestResult<Json<Vec<String>>> {
    let api = state.current();
    let keyspace = api
        .operations
        .keyspace(&keyspace)
        .ok_or_else(|| RestError::new(StatusCode::NOT_FOUND, format!("keyspace '{}' not found", keyspace)))?;
    Ok(Json(keyspace.tables.keys().cloned().collect()))
}

async fn describe_table(
    State(state): State<AppState>,
    Path((keyspace, table)): Path<(String, String)>,
) -> RestResult<Json<TableDescription>> {
    let operations = table_operations(&state, &keyspace, &table)?;
    Ok(Json(TableDescription::from(operations.table())))
}

async fn list_rows(
    State(state): State<AppState>,
    Path((keyspace, table)): Path<(String, String)>,
    Query(query): Query<RowsQuery>,
    headers: HeaderMap,
) -> RestResult<Json<RowsResponse>> {
    let operations = table_operations(&state, &keyspace, &table)?;

    let filter = match &query.filter {
        Some(text) => Some(json_value(
            serde_json::from_str(text)
                .map_err(|e| RestError::new(StatusCode::BAD_REQUEST, format!("invalid where clause: {}", e)))?,
        )?),
        None => None,
    };
    let order_by = query.order_by.as_ref().map(|text| {
        Value::List(
            text.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        )
    });

    let mut options = IndexMap::new();
    insert_string(&mut options, "consistency", &query.consistency);
    insert_string(&mut options, "pageState", &query.page_state);
    if let Some(page_size) = query.page_size {
        options.insert(Name::new("pageSize"), Value::from(page_size));
    }
    if let Some(limit) = query.limit {
        options.insert(Name::new("limit"), Value::from(limit));
    }

    let request = args::query_request(
        operations.table(),
        None,
        filter.as_ref(),
        order_by.as_ref(),
        Some(&Value::Object(options)),
    )?;

    let context = state.request_context(&headers).await;
    let _guard = context.cancel.clone().drop_guard();
    let page = operations.list(&request, &context).await?;

    let rows = page
        .rows
        .into_iter()
        .map(row_json)
        .collect::<RestResult<Vec<_>>>()?;
    Ok(Json(RowsResponse {
        count: rows.len(),
        page_state: page.cursor.to_token(),
        rows,
    }))
}

async fn get_row(
    State(state): State<AppState>,
    Path((keyspace, table, key)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> RestResult<Json<RowsResponse>> {
    let operations = table_operations(&state, &keyspace, &table)?;
    let key = primary_key(operations.table(), &key)?;

    let context = state.request_context(&headers).await;
    let _guard = context.cancel.clone().drop_guard();
    let row = operations
        .get(&key, None, &context)
        .await?
        .ok_or_else(|| RestError::new(StatusCode::NOT_FOUND, "row not found"))?;

    Ok(Json(RowsResponse {
        count: 1,
        page_state: None,
        rows: vec![row_json(row)?],
    }))
}

async fn insert_row(
    State(state): State<AppState>,
    Path((keyspace, table)): Path<(String, String)>,
    Query(query): Query<WriteQuery>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> RestResult<(StatusCode, Json<MutationResponse>)> {
    let operations = writable(&state, &keyspace, &table)?;
    let request = args::mutation_request(
        operations.table(),
        Some(&json_value(body)?),
        false,
        query.if_not_exists,
        Some(&query.options()),
    )?;

    let context = state.request_context(&headers).await;
    let _guard = context.cancel.clone().drop_guard();
    let outcome = operations.insert(&request, &context).await?;
    Ok((StatusCode::CREATED, Json(mutation_response(outcome)?)))
}

async fn update_row(
    State(state): State<AppState>,
    Path((keyspace, table, key)): Path<(String, String, String)>,
    Query(query): Query<WriteQuery>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> RestResult<Json<MutationResponse>> {
    let operations = writable(&state, &keyspace, &table)?;
    let mut values = match json_value(body)? {
        Value::Object(values) => values,
        _ => return Err(RestError::new(StatusCode::BAD_REQUEST, "body must be a JSON object")),
    };
    for (column, value) in primary_key(operations.table(), &key)? {
        values.insert(Name::new(column), value);
    }

    let request = args::mutation_request(
        operations.table(),
        Some(&Value::Object(values)),
        query.if_exists,
        false,
        Some(&query.options()),
    )?;

    let context = state.request_context(&headers).await;
    let _guard = context.cancel.clone().drop_guard();
    let outcome = operations.update(&request, &context).await?;
    Ok(Json(mutation_response(outcome)?))
}

async fn delete_row(
    State(state): State<AppState>,
    Path((keyspace, table, key)): Path<(String, String, String)>,
    Query(query): Query<WriteQuery>,
    headers: HeaderMap,
) -> RestResult<Json<MutationResponse>> {
    let operations = writable(&state, &keyspace, &table)?;
    let key: IndexMap<Name, Value> = primary_key(operations.table(), &key)?
        .into_iter()
        .map(|(column, value)| (Name::new(column), value))
        .collect();

    let request = args::mutation_request(
        operations.table(),
        Some(&Value::Object(key)),
        query.if_exists,
        false,
        Some(&query.options()),
    )?;

    let context = state.request_context(&headers).await;
    let _guard = context.cancel.clone().drop_guard();
    let outcome = operations.delete(&request, &context).await?;
    Ok(Json(mutation_response(outcome)?))
}

async fn create_keyspace(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> RestResult<(StatusCode, Json<SuccessResponse>)> {
    let args = json_value(body)?;
    apply(&state, &headers, SchemaOperation::KeyspaceCreate, args).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse { success: true })))
}

async fn drop_keyspace(
    State(state): State<AppState>,
    Path(keyspace): Path<String>,
    Query(query): Query<WriteQuery>,
    headers: HeaderMap,
) -> RestResult<Json<SuccessResponse>> {
    let args = object([("name", Value::String(keyspace)), ("ifExists", Value::Boolean(query.if_exists))]);
    apply(&state, &headers, SchemaOperation::KeyspaceDrop, args).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn create_table(
    State(state): State<AppState>,
    Path(keyspace): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> RestResult<(StatusCode, Json<SuccessResponse>)> {
    let mut args = match json_value(body)? {
        Value::Object(args) => args,
        _ => return Err(RestError::new(StatusCode::BAD_REQUEST, "body must be a JSON object")),
    };
    if let Some(name) = args.shift_remove("name") {
        args.entry(Name::new("tableName")).or_insert(name);
    }
    args.insert(Name::new("keyspaceName"), Value::String(keyspace));

    apply(&state, &headers, SchemaOperation::TableCreate, Value::Object(args)).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse { success: true })))
}

async fn drop_table(
    State(state): State<AppState>,
    Path((keyspace, table)): Path<(String, String)>,
    Query(query): Query<WriteQuery>,
    headers: HeaderMap,
) -> RestResult<Json<SuccessResponse>> {
    let args = object([
        ("keyspaceName", Value::String(keyspace)),
        ("tableName", Value::String(table)),
        ("ifExists", Value::Boolean(query.if_exists)),
    ]);
    apply(&state, &headers, SchemaOperation::TableDrop, args).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Body is one `{name, type}` column or a list of them
async fn add_columns(
    State(state): State<AppState>,
    Path((keyspace, table)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> RestResult<(StatusCode, Json<SuccessResponse>)> {
    let columns = match json_value(body)? {
        Value::List(columns) => columns,
        column @ Value::Object(_) => vec![column],
        _ => return Err(RestError::new(StatusCode::BAD_REQUEST, "body must be a column or a list of columns")),
    };
    let args = object([
        ("keyspaceName", Value::String(keyspace)),
        ("tableName", Value::String(table)),
        ("toAdd", Value::List(columns)),
    ]);
    apply(&state, &headers, SchemaOperation::TableAlterAdd, args).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse { success: true })))
}

async fn drop_column(
    State(state): State<AppState>,
    Path((keyspace, table, column)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> RestResult<Json<SuccessResponse>> {
    let args = object([
        ("keyspaceName", Value::String(keyspace)),
        ("tableName", Value::String(table)),
        ("toDrop", Value::List(vec![Value::String(column)])),
    ]);
    apply(&state, &headers, SchemaOperation::TableAlterDrop, args).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn apply(state: &AppState, headers: &HeaderMap, operation: SchemaOperation, args: Value) -> RestResult<()> {
    let api = state.current();
    let management = &api.operations.management;
    if !management.is_enabled(operation) {
        return Err(RestError::new(StatusCode::NOT_FOUND, "resource not found"));
    }
    let change = schema_change(operation, &args)?;

    let context: RequestContext = state.request_context(headers).await;
    let _guard = context.cancel.clone().drop_guard();
    management.apply(&change, &context).await?;
    Ok(())
}

fn table_operations(state: &AppState, keyspace: &str, table: &str) -> RestResult<Arc<TableOperations>> {
    state
        .current()
        .operations
        .table_operations(keyspace, table)
        .cloned()
        .ok_or_else(|| RestError::new(StatusCode::NOT_FOUND, format!("table '{}.{}' not found", keyspace, table)))
}

fn writable(state: &AppState, keyspace: &str, table: &str) -> RestResult<Arc<TableOperations>> {
    let operations = table_operations(state, keyspace, table)?;
    if !operations.is_writable() {
        return Err(RestError::new(
            StatusCode::BAD_REQUEST,
            format!("'{}.{}' is a materialized view and cannot be written", keyspace, table),
        ));
    }
    Ok(operations)
}

/// Split `v1;v2;...` into typed primary-key values in key order
fn primary_key(table: &Table, key: &str) -> RestResult<IndexMap<String, Value>> {
    let parts: Vec<&str> = key.split(';').collect();
    let columns: Vec<_> = table.primary_key().collect();
    if parts.len() > columns.len() {
        return Err(RestError::new(
            StatusCode::BAD_REQUEST,
            format!("expected at most {} key values, got {}", columns.len(), parts.len()),
        ));
    }

    let mut values = IndexMap::new();
    for (column, text) in columns.into_iter().zip(parts) {
        let value = value_from_text(&column.type_kind, text).map_err(DataApiError::from)?;
        values.insert(column.name.clone(), value);
    }
    Ok(values)
}

fn json_value(json: serde_json::Value) -> RestResult<Value> {
    Value::from_json(json).map_err(|e| RestError::new(StatusCode::BAD_REQUEST, format!("invalid JSON: {}", e)))
}

fn row_json(row: IndexMap<String, Value>) -> RestResult<serde_json::Value> {
    row_value(row)
        .into_json()
        .map_err(|e| DataApiError::Serialization(e.to_string()).into())
}

fn mutation_response(outcome: MutationOutcome) -> RestResult<MutationResponse> {
    Ok(MutationResponse {
        applied: outcome.applied,
        value: outcome.value.map(row_json).transpose()?,
    })
}

fn object<const N: usize>(entries: [(&str, Value); N]) -> Value {
    Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (Name::new(key), value))
            .collect(),
    )
}

fn insert_string(options: &mut IndexMap<Name, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        options.insert(Name::new(key), Value::String(value.clone()));
    }
}
