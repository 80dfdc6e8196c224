pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod generator;
pub mod query;
pub mod routes;
pub mod service;
pub mod sync;
pub mod testing;
pub mod types;

// Re-export commonly used types
pub use config::{Config, DatabaseConfig, ServerConfig};
pub use error::{DataApiError, Result};
pub use gateway::{ExecutionGateway, IdentityResolver, Session};
pub use generator::{ApiGenerator, GeneratedOperationSet};
pub use service::DataApi;
pub use sync::{SchemaHandle, SchemaSynchronizer};
