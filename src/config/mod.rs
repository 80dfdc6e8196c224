mod operations;
mod types;

pub use operations::{SchemaOperation, SupportedOperations};
pub use types::{
    AuthConfig, Config, DatabaseConfig, QueryConfig, SchemaConfig, ServerConfig,
    DEFAULT_UPDATE_INTERVAL_SECS,
};

use crate::error::{DataApiError, Result};
use config::{Environment, File, FileFormat};
use std::fs;

/// Prefix of environment variables that override file settings,
/// e.g. `DATA_API__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "DATA_API";

/// Load configuration from a TOML file, with environment overrides
pub fn load_config(path: &str) -> Result<Config> {
    load_config_with(path, environment())
}

/// Load configuration from a TOML file with an explicit environment source
pub fn load_config_with(path: &str, env: Environment) -> Result<Config> {
    let settings = config::Config::builder()
        .add_source(File::new(path, FileFormat::Toml))
        .add_source(env)
        .build()
        .map_err(|e| DataApiError::Config(format!("Failed to read config file '{}': {}", path, e)))?;

    let config: Config = settings.try_deserialize()?;

    config.validate().map_err(DataApiError::Config)?;

    tracing::debug!(
        "Loaded configuration from {} ({} excluded keyspaces, operations: {:?})",
        path,
        config.schema.excluded_keyspaces.len(),
        config.schema.operations
    );

    Ok(config)
}

/// Environment source for `DATA_API__SECTION__KEY` variables
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("database.hosts")
        .with_list_parse_key("schema.excluded_keyspaces")
        .with_list_parse_key("schema.operations")
}

/// Save configuration to a TOML file
pub fn save_config(config: &Config, path: &str) -> Result<()> {
    config.validate().map_err(DataApiError::Config)?;

    let toml_string = toml::to_string_pretty(config)?;
    fs::write(path, toml_string)
        .map_err(|e| DataApiError::Config(format!("Failed to write config file '{}': {}", path, e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Consistency;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    fn no_env() -> Environment {
        environment().source(Some(config::Map::new()))
    }

    #[test]
    fn test_load_valid_config() {
        let temp_file = write_config(
            r#"
[database]
hosts = ["10.0.0.1:9042", "10.0.0.2:9042"]
keyspace = "store"

[server]
port = 8081
access_control_allow_origin = "*"

[schema]
excluded_keyspaces = ["audit"]
update_interval_secs = 30
operations = ["TableCreate", "TableDrop"]

[query]
default_page_size = 50
default_consistency = "LOCAL_ONE"

[auth]
use_user_or_role = true

[auth.tokens]
token1 = "user1"
"#,
        );

        let config = load_config_with(temp_file.path().to_str().unwrap(), no_env()).unwrap();
        assert_eq!(config.database.hosts.len(), 2);
        assert_eq!(config.database.keyspace.as_deref(), Some("store"));
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.graphql_path, "/graphql");
        assert_eq!(config.schema.excluded_keyspaces, vec!["audit".to_string()]);
        assert!(config.schema.operations.contains(SchemaOperation::TableDrop));
        assert!(!config.schema.operations.contains(SchemaOperation::KeyspaceCreate));
        assert_eq!(config.query.default_page_size, 50);
        assert_eq!(config.query.default_consistency, Consistency::LocalOne);
        assert_eq!(config.auth.tokens.get("token1").map(String::as_str), Some("user1"));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let temp_file = write_config("");
        let config = load_config_with(temp_file.path().to_str().unwrap(), no_env()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.schema.operations, SupportedOperations::default());
        assert_eq!(config.auth.token_header, "X-Cassandra-Token");
    }

    #[test]
    fn test_environment_overrides_file() {
        let temp_file = write_config("[server]\nport = 8081\n");
        let mut vars = config::Map::new();
        vars.insert("DATA_API__SERVER__PORT".to_string(), "9000".to_string());
        vars.insert(
            "DATA_API__SCHEMA__EXCLUDED_KEYSPACES".to_string(),
            "audit,metrics".to_string(),
        );

        let config = load_config_with(
            temp_file.path().to_str().unwrap(),
            environment().source(Some(vars)),
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.schema.excluded_keyspaces,
            vec!["audit".to_string(), "metrics".to_string()]
        );
    }

    #[test]
    fn test_load_rejects_unknown_operation() {
        let temp_file = write_config("[schema]\noperations = [\"TableTruncate\"]\n");
        assert!(load_config_with(temp_file.path().to_str().unwrap(), no_env()).is_err());
    }

    #[test]
    fn test_load_rejects_invalid_consistency() {
        let temp_file = write_config("[query]\ndefault_consistency = \"MOST\"\n");
        assert!(load_config_with(temp_file.path().to_str().unwrap(), no_env()).is_err());
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = Config::default();
        config.server.port = 8099;
        config.schema.update_interval_secs = 0;

        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        save_config(&config, path).unwrap();
        let loaded = load_config_with(path, no_env()).unwrap();

        assert_eq!(loaded.server.port, 8099);
        assert_eq!(loaded.schema.update_interval().as_secs(), 10);
    }
}
