use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::operations::SupportedOperations;
use crate::query::Consistency;

/// Fallback for a non-positive schema update interval
pub const DEFAULT_UPDATE_INTERVAL_SECS: i64 = 10;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Contact points, `host:port`
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Serve only this keyspace, at the bare GraphQL path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyspace: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            username: None,
            password: None,
            keyspace: None,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to bind the server to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Interface to bind the server to
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_true")]
    pub start_graphql: bool,

    #[serde(default = "default_true")]
    pub start_rest: bool,

    #[serde(default = "default_graphql_path")]
    pub graphql_path: String,

    #[serde(default = "default_graphql_schema_path")]
    pub graphql_schema_path: String,

    #[serde(default = "default_rest_path")]
    pub rest_path: String,

    #[serde(default = "default_true")]
    pub playground: bool,

    #[serde(default = "default_playground_path")]
    pub playground_path: String,

    /// Value for `Access-Control-Allow-Origin`; CORS is off when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control_allow_origin: Option<String>,

    #[serde(default)]
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            start_graphql: true,
            start_rest: true,
            graphql_path: default_graphql_path(),
            graphql_schema_path: default_graphql_schema_path(),
            rest_path: default_rest_path(),
            playground: true,
            playground_path: default_playground_path(),
            access_control_allow_origin: None,
            request_logging: false,
        }
    }
}

/// Schema discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Keyspaces never exposed, in addition to the system keyspaces
    #[serde(default)]
    pub excluded_keyspaces: Vec<String>,

    /// Seconds between catalog reads; non-positive means the default
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: i64,

    /// Enabled schema-management operations
    #[serde(default)]
    pub operations: SupportedOperations,
}

impl SchemaConfig {
    pub fn update_interval(&self) -> Duration {
        let secs = if self.update_interval_secs > 0 {
            self.update_interval_secs
        } else {
            DEFAULT_UPDATE_INTERVAL_SECS
        };
        Duration::from_secs(secs.unsigned_abs())
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            excluded_keyspaces: Vec::new(),
            update_interval_secs: default_update_interval(),
            operations: SupportedOperations::default(),
        }
    }
}

/// Defaults applied when a request leaves an option out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: i32,

    #[serde(default = "default_consistency")]
    pub default_consistency: Consistency,

    #[serde(default = "default_consistency")]
    pub default_mutation_consistency: Consistency,

    #[serde(default = "default_serial_consistency")]
    pub default_serial_consistency: Consistency,

    /// Requests running longer than this are cancelled
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl QueryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            default_consistency: default_consistency(),
            default_mutation_consistency: default_consistency(),
            default_serial_consistency: default_serial_consistency(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

/// Caller identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Execute statements as the caller's user or role
    #[serde(default)]
    pub use_user_or_role: bool,

    #[serde(default = "default_token_header")]
    pub token_header: String,

    /// Static token to user-or-role mapping
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tokens: BTreeMap<String, String>,

    /// Token service consulted for tokens not in `tokens`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver_url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            use_user_or_role: false,
            token_header: default_token_header(),
            tokens: BTreeMap::new(),
            resolver_url: None,
        }
    }
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database.hosts.is_empty() {
            return Err("At least one database host is required".to_string());
        }

        if self.query.default_page_size <= 0 {
            return Err(format!(
                "Default page size must be positive, got {}",
                self.query.default_page_size
            ));
        }
        if !self.query.default_consistency.is_valid_for_read() {
            return Err(format!(
                "Consistency {} cannot be used for reads",
                self.query.default_consistency
            ));
        }
        if !self.query.default_mutation_consistency.is_valid_for_write() {
            return Err(format!(
                "Consistency {} cannot be used for writes",
                self.query.default_mutation_consistency
            ));
        }
        if !self.query.default_serial_consistency.is_serial() {
            return Err(format!(
                "Serial consistency must be SERIAL or LOCAL_SERIAL, got {}",
                self.query.default_serial_consistency
            ));
        }
        if self.query.request_timeout_ms == 0 {
            return Err("Request timeout must be positive".to_string());
        }

        let paths = [
            ("graphql_path", &self.server.graphql_path),
            ("graphql_schema_path", &self.server.graphql_schema_path),
            ("rest_path", &self.server.rest_path),
            ("playground_path", &self.server.playground_path),
        ];
        for (name, path) in paths {
            if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') {
                return Err(format!(
                    "Server {} '{}' must start with '/' and not end with '/'",
                    name, path
                ));
            }
        }
        for (i, (name, path)) in paths.iter().enumerate() {
            if let Some((other, _)) = paths[i + 1..].iter().find(|(_, p)| p == path) {
                return Err(format!("Server {} and {} are both '{}'", name, other, path));
            }
        }

        if self.auth.token_header.trim().is_empty() {
            return Err("Auth token header cannot be empty".to_string());
        }
        if let Some(url) = &self.auth.resolver_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!(
                    "Auth resolver URL '{}' must be a valid URL (http:// or https://)",
                    url
                ));
            }
        }
        if self.auth.use_user_or_role && self.auth.tokens.is_empty() && self.auth.resolver_url.is_none() {
            return Err(
                "use_user_or_role requires auth tokens or a resolver_url".to_string()
            );
        }

        Ok(())
    }
}

fn default_hosts() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}

fn default_port() -> u16 {
    8080
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_graphql_path() -> String {
    "/graphql".to_string()
}

fn default_graphql_schema_path() -> String {
    "/graphql-schema".to_string()
}

fn default_rest_path() -> String {
    "/rest".to_string()
}

fn default_playground_path() -> String {
    "/graphql-playground".to_string()
}

fn default_update_interval() -> i64 {
    DEFAULT_UPDATE_INTERVAL_SECS
}

fn default_page_size() -> i32 {
    100
}

fn default_consistency() -> Consistency {
    Consistency::LocalQuorum
}

fn default_serial_consistency() -> Consistency {
    Consistency::Serial
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_token_header() -> String {
    "X-Cassandra-Token".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.query.default_page_size, 100);
        assert_eq!(config.query.default_consistency, Consistency::LocalQuorum);
        assert_eq!(config.server.graphql_path, "/graphql");
    }

    #[test]
    fn test_non_positive_interval_falls_back() {
        let mut schema = SchemaConfig::default();
        schema.update_interval_secs = 0;
        assert_eq!(schema.update_interval(), Duration::from_secs(10));
        schema.update_interval_secs = -5;
        assert_eq!(schema.update_interval(), Duration::from_secs(10));
        schema.update_interval_secs = 30;
        assert_eq!(schema.update_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_validation_rejects_bad_query_defaults() {
        let mut config = Config::default();
        config.query.default_page_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.query.default_consistency = Consistency::Any;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.query.default_serial_consistency = Consistency::One;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_duplicate_paths() {
        let mut config = Config::default();
        config.server.rest_path = "/graphql".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_requires_identity_source() {
        let mut config = Config::default();
        config.auth.use_user_or_role = true;
        assert!(config.validate().is_err());

        config.auth.tokens.insert("token1".to_string(), "user1".to_string());
        assert!(config.validate().is_ok());
    }
}
