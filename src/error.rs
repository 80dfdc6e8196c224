use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataApiError {
    #[error("Schema sync error: {0}")]
    Sync(#[from] SyncError),

    #[error(transparent)]
    QueryBuild(#[from] QueryBuildError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("Cannot decode column '{column}': {source}")]
    Decode { column: String, source: TypeError },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("expected user or role for this operation")]
    Unauthorized,

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Identity service error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema generation error: {0}")]
    SchemaGeneration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DataApiError {
    /// Whether the failure came from the caller aborting or timing out the request
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DataApiError::Cancelled(_))
    }
}

/// Failure to read the database catalog. Never surfaced to API callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("metadata query failed: {0}")]
    Metadata(String),

    #[error("malformed row in {table}: {detail}")]
    Malformed { table: String, detail: String },

    #[error("schema generation failed: {0}")]
    Generation(String),
}

/// A value could not be converted between its protocol and database forms.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid {expected} value: {detail}")]
pub struct TypeError {
    pub expected: String,
    pub detail: String,
}

impl TypeError {
    pub fn new(expected: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            detail: detail.into(),
        }
    }
}

/// A request could not be translated into a statement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryBuildError {
    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },

    #[error("column '{column}' has an unsupported type")]
    UnsupportedColumn { column: String },

    #[error("operator '{operator}' is not supported for column '{column}'")]
    UnsupportedOperator { column: String, operator: String },

    #[error("invalid value for column '{column}': {detail}")]
    InvalidValue { column: String, detail: String },

    #[error("missing value for primary key column '{column}'")]
    MissingKey { column: String },

    #[error("column '{column}' is not a primary key column")]
    NotKeyColumn { column: String },

    #[error("column '{column}' is not a clustering column and cannot be used for ordering")]
    NotClusteringColumn { column: String },

    #[error("column '{column}' has unsupported type '{cql_type}'")]
    UnsupportedType { column: String, cql_type: String },

    #[error("no columns to update")]
    NoValues,

    #[error("invalid option: {0}")]
    InvalidOption(String),
}

impl From<toml::de::Error> for DataApiError {
    fn from(err: toml::de::Error) -> Self {
        DataApiError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for DataApiError {
    fn from(err: toml::ser::Error) -> Self {
        DataApiError::Serialization(format!("TOML serialization error: {}", err))
    }
}

impl From<config::ConfigError> for DataApiError {
    fn from(err: config::ConfigError) -> Self {
        DataApiError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataApiError>;
