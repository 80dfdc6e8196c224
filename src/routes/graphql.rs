use async_graphql::dynamic::Schema;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::routes::AppState;

/// `{graphql_path}/{keyspace}`
pub async fn keyspace_handler(
    State(state): State<AppState>,
    Path(keyspace): Path<String>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> Response {
    execute_keyspace(&state, &keyspace, &headers, request).await
}

/// `{graphql_path}` when a single keyspace is configured
pub async fn default_keyspace_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> Response {
    match state.default_keyspace.clone() {
        Some(keyspace) => execute_keyspace(&state, &keyspace, &headers, request).await,
        None => not_found("no default keyspace is configured".to_string()),
    }
}

/// `{graphql_schema_path}`
pub async fn management_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> Response {
    let api = state.current();
    execute(&state, &api.operations.management_schema, &headers, request).await
}

async fn execute_keyspace(state: &AppState, keyspace: &str, headers: &HeaderMap, request: GraphQLRequest) -> Response {
    let api = state.current();
    match api.operations.keyspace(keyspace).and_then(|ks| ks.schema.as_ref()) {
        Some(schema) => execute(state, schema, headers, request).await,
        None => not_found(format!("keyspace '{}' not found", keyspace)),
    }
}

async fn execute(state: &AppState, schema: &Schema, headers: &HeaderMap, request: GraphQLRequest) -> Response {
    let context = state.request_context(headers).await;
    // Dropping the handler (client gone) cancels in-flight statements
    let _guard = context.cancel.clone().drop_guard();
    let request = request.into_inner().data(context);
    GraphQLResponse::from(schema.execute(request).await).into_response()
}

fn not_found(message: String) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "errors": [{ "message": message }] })),
    )
        .into_response()
}
