//! In-memory test doubles for the `Session` boundary
//!
//! `FakeCatalog` builds `system_schema` rows; `FakeSession` serves them to the
//! catalog reader and answers every other statement from a script while
//! recording what was executed.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::catalog::reader::{
    build_snapshot, CatalogRows, KeyspaceFilter, COLUMNS_QUERY, INDEXES_QUERY, KEYSPACES_QUERY,
    TABLES_QUERY, VIEWS_QUERY,
};
use crate::catalog::SchemaSnapshot;
use crate::gateway::session::{ExecuteOptions, ResultSet, Row, Session, SessionError};
use crate::types::DbValue;

/// `(name, cql type, kind, position)` as stored in `system_schema.columns`
pub type ColumnSpec<'a> = (&'a str, &'a str, &'a str, i32);

/// Builder for `system_schema` contents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeCatalog {
    rows: CatalogRows,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A `store` keyspace with `books`, `reviews` and the `books_by_author` view,
    /// next to two system keyspaces
    pub fn store() -> Self {
        Self::new()
            .keyspace("system")
            .keyspace("system_schema")
            .table("system", "local", &[("key", "text", "partition_key", 0)])
            .table(
                "store",
                "books",
                &[
                    ("title", "text", "partition_key", 0),
                    ("author", "text", "regular", -1),
                    ("isbn", "text", "regular", -1),
                    ("pages", "int", "regular", -1),
                    ("span", "duration", "regular", -1),
                    ("tags", "set<text>", "regular", -1),
                ],
            )
            .index("store", "books", "books_isbn_idx", "isbn")
            .index("store", "books", "books_tags_idx", "values(tags)")
            .view(
                "store",
                "books_by_author",
                "books",
                &[
                    ("author", "text", "partition_key", 0),
                    ("title", "text", "clustering", 0),
                    ("pages", "int", "regular", -1),
                ],
            )
            .table(
                "store",
                "reviews",
                &[
                    ("book_id", "uuid", "partition_key", 0),
                    ("posted", "timestamp", "clustering", 0),
                    ("author", "text", "regular", -1),
                    ("body", "text", "regular", -1),
                    ("rating", "int", "regular", -1),
                ],
            )
            .clustering_order("store", "reviews", "posted", "desc")
    }

    pub fn keyspace(mut self, name: &str) -> Self {
        let exists = self
            .rows
            .keyspaces
            .iter()
            .any(|row| text_of(row, "keyspace_name") == Some(name));
        if !exists {
            self.rows.keyspaces.push(row(&[("keyspace_name", text(name))]));
        }
        self
    }

    /// Add a table, creating its keyspace when missing
    pub fn table(mut self, keyspace: &str, name: &str, columns: &[ColumnSpec<'_>]) -> Self {
        self = self.keyspace(keyspace);
        self.rows
            .tables
            .push(row(&[("keyspace_name", text(keyspace)), ("table_name", text(name))]));
        self.push_columns(keyspace, name, columns);
        self
    }

    pub fn view(mut self, keyspace: &str, name: &str, base_table: &str, columns: &[ColumnSpec<'_>]) -> Self {
        self = self.keyspace(keyspace);
        self.rows.views.push(row(&[
            ("keyspace_name", text(keyspace)),
            ("view_name", text(name)),
            ("base_table_name", text(base_table)),
        ]));
        self.push_columns(keyspace, name, columns);
        self
    }

    /// Add a secondary index; `target` is the raw option value such as `values(tags)`
    pub fn index(mut self, keyspace: &str, table: &str, name: &str, target: &str) -> Self {
        self.rows.indexes.push(row(&[
            ("keyspace_name", text(keyspace)),
            ("table_name", text(table)),
            ("index_name", text(name)),
            ("kind", text("COMPOSITES")),
            (
                "options",
                Some(DbValue::Map(vec![(
                    DbValue::Text("target".to_string()),
                    DbValue::Text(target.to_string()),
                )])),
            ),
        ]));
        self
    }

    pub fn clustering_order(mut self, keyspace: &str, table: &str, column: &str, order: &str) -> Self {
        for row in self.rows.columns.iter_mut() {
            if text_of(row, "keyspace_name") == Some(keyspace)
                && text_of(row, "table_name") == Some(table)
                && text_of(row, "column_name") == Some(column)
            {
                row.insert("clustering_order".to_string(), text(order));
            }
        }
        self
    }

    /// Remove a table or view and everything attached to it
    pub fn drop_table(mut self, keyspace: &str, name: &str) -> Self {
        let keep = |row: &Row, column: &str| {
            !(text_of(row, "keyspace_name") == Some(keyspace) && text_of(row, column) == Some(name))
        };
        self.rows.tables.retain(|r| keep(r, "table_name"));
        self.rows.views.retain(|r| keep(r, "view_name"));
        self.rows.columns.retain(|r| keep(r, "table_name"));
        self.rows.indexes.retain(|r| keep(r, "table_name"));
        self
    }

    pub fn rows(&self) -> CatalogRows {
        self.rows.clone()
    }

    fn push_columns(&mut self, keyspace: &str, table: &str, columns: &[ColumnSpec<'_>]) {
        for (name, cql_type, kind, position) in columns {
            let order = if *kind == "clustering" { "asc" } else { "none" };
            self.rows.columns.push(row(&[
                ("keyspace_name", text(keyspace)),
                ("table_name", text(table)),
                ("column_name", text(name)),
                ("clustering_order", text(order)),
                ("kind", text(kind)),
                ("position", Some(DbValue::Int(*position))),
                ("type", text(cql_type)),
            ]));
        }
    }
}

/// Snapshot of `FakeCatalog::store()` with the default keyspace filter
pub fn catalog_fixture() -> SchemaSnapshot {
    match build_snapshot(&FakeCatalog::store().rows(), &KeyspaceFilter::default()) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!("Fixture catalog is malformed: {}", e);
            SchemaSnapshot::new(Vec::new(), Vec::new())
        }
    }
}

/// One statement the fake session was asked to run
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub statement: String,
    pub values: Vec<Option<DbValue>>,
    pub options: ExecuteOptions,
}

impl RecordedCall {
    pub fn is_metadata(&self) -> bool {
        is_metadata(&self.statement)
    }
}

#[derive(Default)]
struct FakeState {
    catalog: FakeCatalog,
    fail_metadata: bool,
    responses: VecDeque<Result<ResultSet, SessionError>>,
    calls: Vec<RecordedCall>,
}

/// Scripted `Session`
///
/// Metadata statements are answered from the catalog. Every other statement
/// gets the next scripted response, or an empty result set when the script is
/// exhausted. `pause` holds non-metadata statements until `release`.
pub struct FakeSession {
    state: Mutex<FakeState>,
    gate: watch::Sender<bool>,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSession {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            state: Mutex::new(FakeState::default()),
            gate,
        }
    }

    pub fn with_catalog(catalog: FakeCatalog) -> Self {
        let session = Self::new();
        session.set_catalog(catalog);
        session
    }

    pub fn set_catalog(&self, catalog: FakeCatalog) {
        self.lock().catalog = catalog;
    }

    pub fn catalog(&self) -> FakeCatalog {
        self.lock().catalog.clone()
    }

    pub fn fail_metadata(&self, fail: bool) {
        self.lock().fail_metadata = fail;
    }

    /// Queue a result for the next data statement
    pub fn respond(&self, result: ResultSet) {
        self.lock().responses.push_back(Ok(result));
    }

    /// Queue a statement failure for the next data statement
    pub fn fail_next(&self, message: &str) {
        self.lock()
            .responses
            .push_back(Err(SessionError::Statement(message.to_string())));
    }

    pub fn pause(&self) {
        self.gate.send_replace(true);
    }

    pub fn release(&self) {
        self.gate.send_replace(false);
    }

    /// Every call, metadata included
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Calls other than catalog reads
    pub fn data_calls(&self) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| !call.is_metadata())
            .cloned()
            .collect()
    }

    pub fn metadata_call_count(&self) -> usize {
        self.lock().calls.iter().filter(|call| call.is_metadata()).count()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        // A test that panicked while holding the lock already failed
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn answer_metadata(&self, statement: &str, values: &[Option<DbValue>]) -> Result<ResultSet, SessionError> {
        let state = self.lock();
        if state.fail_metadata {
            return Err(SessionError::Connection("metadata unavailable".to_string()));
        }
        let rows = &state.catalog.rows;
        let source = match statement {
            KEYSPACES_QUERY => return Ok(ResultSet::new(rows.keyspaces.clone())),
            TABLES_QUERY => &rows.tables,
            VIEWS_QUERY => &rows.views,
            COLUMNS_QUERY => &rows.columns,
            INDEXES_QUERY => &rows.indexes,
            other => return Err(SessionError::Statement(format!("unknown metadata query: {}", other))),
        };

        let keyspaces: BTreeSet<&str> = match values.first() {
            Some(Some(DbValue::List(names))) => names.iter().filter_map(DbValue::as_text).collect(),
            _ => return Err(SessionError::Statement("expected a keyspace list bind".to_string())),
        };
        let filtered = source
            .iter()
            .filter(|row| text_of(row, "keyspace_name").map_or(false, |ks| keyspaces.contains(ks)))
            .cloned()
            .collect();
        Ok(ResultSet::new(filtered))
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn execute(
        &self,
        statement: &str,
        values: &[Option<DbValue>],
        options: &ExecuteOptions,
    ) -> Result<ResultSet, SessionError> {
        self.lock().calls.push(RecordedCall {
            statement: statement.to_string(),
            values: values.to_vec(),
            options: options.clone(),
        });

        if is_metadata(statement) {
            return self.answer_metadata(statement, values);
        }

        let mut gate = self.gate.subscribe();
        if gate.wait_for(|paused| !*paused).await.is_err() {
            return Err(SessionError::Connection("session closed".to_string()));
        }

        self.lock()
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(ResultSet::default()))
    }
}

/// A `FakeSession` serving `FakeCatalog::store()`
pub fn store_session() -> Arc<FakeSession> {
    Arc::new(FakeSession::with_catalog(FakeCatalog::store()))
}

fn is_metadata(statement: &str) -> bool {
    statement.contains("system_schema.")
}

fn row(entries: &[(&str, Option<DbValue>)]) -> Row {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn text(value: &str) -> Option<DbValue> {
    Some(DbValue::Text(value.to_string()))
}

fn text_of<'r>(row: &'r Row, column: &str) -> Option<&'r str> {
    row.get(column).and_then(Option::as_ref).and_then(DbValue::as_text)
}
