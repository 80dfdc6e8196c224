use cassandra_data_api::config::{save_config, Config, DatabaseConfig};

/// Write a starter configuration to `output`, or to stdout
pub fn run(hosts: Vec<String>, keyspace: Option<String>, output: Option<String>) -> anyhow::Result<()> {
    let config = Config {
        database: DatabaseConfig {
            hosts,
            keyspace,
            ..DatabaseConfig::default()
        },
        ..Config::default()
    };

    match output {
        Some(path) => {
            save_config(&config, &path)?;
            tracing::info!("📝 Generated configuration: {}", path);
            tracing::info!("💡 Next: review it, then run 'cassandra-data-api serve --config {}'", path);
        }
        None => {
            config.validate().map_err(anyhow::Error::msg)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
