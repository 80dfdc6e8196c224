use std::sync::Arc;

use anyhow::Context;
use cassandra_data_api::gateway::Session;
use cassandra_data_api::{Config, DataApi};

/// Run the serve command to start the API server
pub async fn run(config_path: String, port: Option<u16>) -> anyhow::Result<()> {
    tracing::info!("📖 Loading configuration from {}", config_path);

    let config = cassandra_data_api::config::load_config(&config_path)
        .with_context(|| format!("loading {}", config_path))?;

    // Use provided port or default from config
    let server_port = port.unwrap_or(config.server.port);

    let session = connect(&config).await?;

    tracing::info!("🔧 Reading schema and building APIs...");
    let api = DataApi::new(config, session)
        .await
        .context("initial schema read failed")?;

    let state = api.handle().current();
    for (name, keyspace) in &state.operations.keyspaces {
        tracing::info!("   {} ({} tables)", name, keyspace.tables.len());
    }
    tracing::info!("✅ Schema version {} published", state.snapshot.version);
    drop(state);

    api.serve(server_port).await?;
    Ok(())
}

#[cfg(feature = "scylla")]
async fn connect(config: &Config) -> anyhow::Result<Arc<dyn Session>> {
    let session = cassandra_data_api::gateway::ScyllaSession::connect(&config.database).await?;
    Ok(Arc::new(session))
}

#[cfg(not(feature = "scylla"))]
async fn connect(_config: &Config) -> anyhow::Result<Arc<dyn Session>> {
    anyhow::bail!("this binary was built without a database driver; rebuild with `--features scylla`")
}
