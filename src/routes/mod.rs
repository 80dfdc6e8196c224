//! HTTP surface: GraphQL, schema management, REST and playground routes
//!
//! Every handler loads the published `ApiState` once and serves the whole
//! request from it, so a schema swap never changes a request mid-flight.

pub mod graphql;
pub mod rest;

use std::sync::Arc;

use async_graphql::http::{playground_source, GraphQLPlaygroundConfig};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{DataApiError, Result};
use crate::gateway::{identify, IdentityResolver, RequestContext};
use crate::sync::{ApiState, SchemaHandle};

/// Shared by all handlers
#[derive(Clone)]
pub struct AppState {
    handle: SchemaHandle,
    resolver: Option<Arc<dyn IdentityResolver>>,
    token_header: String,
    default_keyspace: Option<String>,
}

impl AppState {
    pub fn new(config: &Config, handle: SchemaHandle, resolver: Option<Arc<dyn IdentityResolver>>) -> Self {
        Self {
            handle,
            resolver,
            token_header: config.auth.token_header.clone(),
            default_keyspace: config.database.keyspace.clone(),
        }
    }

    pub fn current(&self) -> Arc<ApiState> {
        self.handle.current()
    }

    /// Identity and cancellation for one request
    pub async fn request_context(&self, headers: &HeaderMap) -> RequestContext {
        let token = headers
            .get(self.token_header.as_str())
            .and_then(|value| value.to_str().ok());
        RequestContext::new(identify(self.resolver.as_deref(), token).await)
    }
}

/// Assemble the router for the configured endpoints
pub fn router(config: &Config, state: AppState) -> Result<Router> {
    let server = &config.server;
    let mut app = Router::new().route("/health", get(health_check));

    if server.start_graphql {
        let graphql_path = trim_path(&server.graphql_path);
        app = app
            .route(
                &format!("{}/:keyspace", graphql_path),
                get(graphql::keyspace_handler).post(graphql::keyspace_handler),
            )
            .route(
                &server.graphql_schema_path,
                get(graphql::management_handler).post(graphql::management_handler),
            );
        if config.database.keyspace.is_some() {
            app = app.route(
                graphql_path,
                get(graphql::default_keyspace_handler).post(graphql::default_keyspace_handler),
            );
        }

        if server.playground {
            let endpoint = playground_endpoint(config, &state);
            let page = playground_source(GraphQLPlaygroundConfig::new(&endpoint));
            app = app.route(
                &server.playground_path,
                get(move || {
                    let page = page.clone();
                    async move { Html(page) }
                }),
            );
            tracing::info!("Playground: {}", server.playground_path);
        }
    }

    if server.start_rest {
        app = app.nest(&format!("{}/v1", trim_path(&server.rest_path)), rest::router());
    }

    let mut app = app.with_state(state);

    if let Some(origin) = &server.access_control_allow_origin {
        let allow_origin = if origin == "*" {
            AllowOrigin::any()
        } else {
            let value = HeaderValue::from_str(origin)
                .map_err(|e| DataApiError::Config(format!("Invalid allowed origin '{}': {}", origin, e)))?;
            AllowOrigin::exact(value)
        };
        app = app.layer(
            CorsLayer::new()
                .allow_origin(allow_origin)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    if server.request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    Ok(app)
}

/// Endpoint the playground opens: the configured keyspace, else the first published one
fn playground_endpoint(config: &Config, state: &AppState) -> String {
    let graphql_path = trim_path(&config.server.graphql_path);
    if config.database.keyspace.is_some() {
        return graphql_path.to_string();
    }
    match state.current().operations.keyspaces.keys().next() {
        Some(keyspace) => format!("{}/{}", graphql_path.trim_end_matches('/'), keyspace),
        None => graphql_path.to_string(),
    }
}

fn trim_path(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

async fn health_check() -> &'static str {
    "OK"
}
