use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogReader;
use crate::config::Config;
use crate::error::{DataApiError, Result};
use crate::gateway::{resolver_from_config, ExecutionGateway, Session};
use crate::generator::ApiGenerator;
use crate::query::{QueryBuilder, QueryDefaults};
use crate::routes::{self, AppState};
use crate::sync::{SchemaHandle, SchemaRefresher, SchemaSynchronizer};

/// A bootstrapped service: published schema, router and synchronizer
pub struct DataApi {
    config: Config,
    synchronizer: Arc<SchemaSynchronizer>,
    router: Router,
    shutdown: CancellationToken,
}

impl DataApi {
    /// Read the schema once and build the router; fails if the first read fails
    pub async fn new(config: Config, session: Arc<dyn Session>) -> Result<Self> {
        let builder = QueryBuilder::new(QueryDefaults::from(&config.query));
        let gateway = ExecutionGateway::new(
            Arc::clone(&session),
            config.auth.use_user_or_role,
            config.query.request_timeout(),
        );
        let refresher = SchemaRefresher::new();

        let synchronizer = SchemaSynchronizer::bootstrap(
            CatalogReader::new(session, &config),
            ApiGenerator::new(builder, gateway, refresher.clone()),
            config.schema.operations.clone(),
            config.schema.update_interval(),
            refresher,
        )
        .await?;

        let resolver = resolver_from_config(&config.auth)?;
        if config.auth.use_user_or_role && resolver.is_none() {
            tracing::warn!("use_user_or_role is on but no tokens or resolver are configured; every data request will be rejected");
        }

        let state = AppState::new(&config, synchronizer.handle(), resolver);
        let router = routes::router(&config, state)?;

        Ok(Self {
            config,
            synchronizer: Arc::new(synchronizer),
            router,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn handle(&self) -> SchemaHandle {
        self.synchronizer.handle()
    }

    pub fn synchronizer(&self) -> &Arc<SchemaSynchronizer> {
        &self.synchronizer
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start the background refresh loop
    pub fn spawn_synchronizer(&self) -> JoinHandle<()> {
        let synchronizer = Arc::clone(&self.synchronizer);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { synchronizer.run(shutdown).await })
    }

    /// Serve until Ctrl+C, then stop the synchronizer
    pub async fn serve(self, port: u16) -> Result<()> {
        let sync_task = self.spawn_synchronizer();

        let addr: SocketAddr = format!("{}:{}", self.config.server.bind, port)
            .parse()
            .map_err(|e| DataApiError::Config(format!("Invalid bind address {}:{}: {}", self.config.server.bind, port, e)))?;
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            DataApiError::Config(format!("Failed to bind to {}: {}. Port may be in use.", addr, e))
        })?;

        tracing::info!("🚀 Data API listening on http://{}", addr);
        if self.config.server.start_graphql {
            tracing::info!("📊 GraphQL: {}/<keyspace>", self.config.server.graphql_path);
            tracing::info!("🛠  Schema management: {}", self.config.server.graphql_schema_path);
        }
        if self.config.server.start_rest {
            tracing::info!("📦 REST: {}/v1", self.config.server.rest_path);
        }
        tracing::info!("💡 Press Ctrl+C to stop the server");

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                tracing::info!("Shutting down");
                shutdown.cancel();
            })
            .await
            .map_err(|e| DataApiError::Config(format!("Server error: {}", e)))?;

        self.shutdown.cancel();
        if let Err(e) = sync_task.await {
            tracing::warn!("Schema synchronizer ended abnormally: {}", e);
        }
        Ok(())
    }
}
