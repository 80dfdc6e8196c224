/// Database session boundary
///
/// Everything the crate sends to the database goes through `Session::execute`.
/// The scylla adapter implements it for a live cluster and
/// `testing::FakeSession` implements it for tests.

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;

use crate::query::Consistency;
use crate::types::DbValue;

/// One decoded result row, keyed by column name; `None` is a database NULL
pub type Row = IndexMap<String, Option<DbValue>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOptions {
    pub consistency: Consistency,
    pub serial_consistency: Option<Consistency>,
    pub page_size: i32,
    /// Driver paging state from the previous page; empty for the first page
    pub paging_state: Vec<u8>,
    /// Identity the statement executes as, when identity scoping is on
    pub user_or_role: Option<String>,
}

impl ExecuteOptions {
    pub fn new(consistency: Consistency, page_size: i32) -> Self {
        Self {
            consistency,
            serial_consistency: None,
            page_size,
            paging_state: Vec::new(),
            user_or_role: None,
        }
    }

    pub fn with_paging_state(mut self, paging_state: Vec<u8>) -> Self {
        self.paging_state = paging_state;
        self
    }

    pub fn with_serial_consistency(mut self, serial: Option<Consistency>) -> Self {
        self.serial_consistency = serial;
        self
    }

    pub fn with_user_or_role(mut self, user_or_role: Option<String>) -> Self {
        self.user_or_role = user_or_role;
        self
    }
}

/// One page of results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    /// Empty when there are no more pages
    pub paging_state: Vec<u8>,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            paging_state: Vec::new(),
        }
    }

    pub fn with_paging_state(mut self, paging_state: Vec<u8>) -> Self {
        self.paging_state = paging_state;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("not supported by this session: {0}")]
    Unsupported(String),
}

#[async_trait]
pub trait Session: Send + Sync {
    async fn execute(
        &self,
        statement: &str,
        values: &[Option<DbValue>],
        options: &ExecuteOptions,
    ) -> Result<ResultSet, SessionError>;
}
