/// Catalog reader
///
/// Reads `system_schema` through a `Session` and assembles an immutable
/// `SchemaSnapshot`. Fetching and assembly are separate so the assembly rules
/// (ordering, classification, exclusion, collision detection) can run on rows
/// from any source.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::catalog::model::{
    ClusteringOrder, Column, ColumnRole, Exclusion, Keyspace, SchemaSnapshot, SchemaWarning, Table,
    TableKind,
};
use crate::catalog::naming::{is_reserved_type_name, to_camel_case, TableNames, RESERVED_KEY_FIELDS};
use crate::config::Config;
use crate::error::SyncError;
use crate::gateway::session::{ExecuteOptions, Row, Session};
use crate::query::Consistency;
use crate::types::{classify, DbValue};

/// Keyspaces that are never exposed
pub const SYSTEM_KEYSPACES: [&str; 7] = [
    "system",
    "system_auth",
    "system_distributed",
    "system_schema",
    "system_traces",
    "system_views",
    "system_virtual_schema",
];

pub const KEYSPACES_QUERY: &str = "SELECT keyspace_name FROM system_schema.keyspaces";
pub const TABLES_QUERY: &str =
    "SELECT keyspace_name, table_name FROM system_schema.tables WHERE keyspace_name IN ?";
pub const VIEWS_QUERY: &str =
    "SELECT keyspace_name, view_name, base_table_name FROM system_schema.views WHERE keyspace_name IN ?";
pub const COLUMNS_QUERY: &str = "SELECT keyspace_name, table_name, column_name, clustering_order, kind, position, type FROM system_schema.columns WHERE keyspace_name IN ?";
pub const INDEXES_QUERY: &str =
    "SELECT keyspace_name, table_name, index_name, kind, options FROM system_schema.indexes WHERE keyspace_name IN ?";

const METADATA_PAGE_SIZE: i32 = 1000;

/// Which keyspaces are read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyspaceFilter {
    excluded: BTreeSet<String>,
    only: Option<String>,
}

impl KeyspaceFilter {
    pub fn new(excluded: impl IntoIterator<Item = String>, only: Option<String>) -> Self {
        Self {
            excluded: excluded.into_iter().collect(),
            only,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.schema.excluded_keyspaces.iter().cloned(),
            config.database.keyspace.clone(),
        )
    }

    pub fn is_excluded(&self, keyspace: &str) -> bool {
        SYSTEM_KEYSPACES.contains(&keyspace)
            || self.excluded.contains(keyspace)
            || self.only.as_deref().map_or(false, |only| only != keyspace)
    }
}

/// Raw `system_schema` rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogRows {
    pub keyspaces: Vec<Row>,
    pub tables: Vec<Row>,
    pub views: Vec<Row>,
    pub columns: Vec<Row>,
    pub indexes: Vec<Row>,
}

pub struct CatalogReader {
    session: Arc<dyn Session>,
    filter: KeyspaceFilter,
}

impl CatalogReader {
    pub fn new(session: Arc<dyn Session>, config: &Config) -> Self {
        Self {
            session,
            filter: KeyspaceFilter::from_config(config),
        }
    }

    pub fn filter(&self) -> &KeyspaceFilter {
        &self.filter
    }

    /// Read the catalog and assemble a snapshot (version 0; the synchronizer numbers it)
    pub async fn read(&self) -> Result<SchemaSnapshot, SyncError> {
        let rows = self.fetch().await?;
        build_snapshot(&rows, &self.filter)
    }

    async fn fetch(&self) -> Result<CatalogRows, SyncError> {
        let keyspaces = self.fetch_all(KEYSPACES_QUERY, &[]).await?;

        let included: Vec<DbValue> = keyspaces
            .iter()
            .filter_map(|row| text(row, "keyspace_name").ok())
            .filter(|name| !self.filter.is_excluded(name))
            .map(DbValue::Text)
            .collect();

        let mut rows = CatalogRows {
            keyspaces,
            ..CatalogRows::default()
        };
        if included.is_empty() {
            tracing::debug!("No keyspaces to read after exclusions");
            return Ok(rows);
        }

        let binds = [Some(DbValue::List(included))];
        rows.tables = self.fetch_all(TABLES_QUERY, &binds).await?;
        rows.views = self.fetch_all(VIEWS_QUERY, &binds).await?;
        rows.columns = self.fetch_all(COLUMNS_QUERY, &binds).await?;
        rows.indexes = self.fetch_all(INDEXES_QUERY, &binds).await?;

        Ok(rows)
    }

    /// Page through one metadata query sequentially
    async fn fetch_all(&self, statement: &str, values: &[Option<DbValue>]) -> Result<Vec<Row>, SyncError> {
        let mut options = ExecuteOptions::new(Consistency::LocalOne, METADATA_PAGE_SIZE);
        let mut rows = Vec::new();
        loop {
            let page = self
                .session
                .execute(statement, values, &options)
                .await
                .map_err(|e| SyncError::Metadata(e.to_string()))?;
            rows.extend(page.rows);
            if page.paging_state.is_empty() {
                return Ok(rows);
            }
            options.paging_state = page.paging_state;
        }
    }
}

/// Assemble a snapshot from raw catalog rows
pub fn build_snapshot(rows: &CatalogRows, filter: &KeyspaceFilter) -> Result<SchemaSnapshot, SyncError> {
    let mut warnings = Vec::new();

    let mut keyspace_names = BTreeSet::new();
    for row in &rows.keyspaces {
        keyspace_names.insert(text(row, "keyspace_name").map_err(malformed("keyspaces"))?);
    }

    // (keyspace, table) -> columns, in catalog order
    let mut columns: BTreeMap<(String, String), Vec<Column>> = BTreeMap::new();
    for row in &rows.columns {
        let keyspace = text(row, "keyspace_name").map_err(malformed("columns"))?;
        if filter.is_excluded(&keyspace) {
            continue;
        }
        let table = text(row, "table_name").map_err(malformed("columns"))?;
        let column = parse_column(row).map_err(malformed("columns"))?;
        columns.entry((keyspace, table)).or_default().push(column);
    }

    for row in &rows.indexes {
        let keyspace = text(row, "keyspace_name").map_err(malformed("indexes"))?;
        let table = text(row, "table_name").map_err(malformed("indexes"))?;
        let target = match index_target(row) {
            Some(target) => target,
            None => continue,
        };
        if let Some(cols) = columns.get_mut(&(keyspace, table)) {
            if let Some(column) = cols.iter_mut().find(|c| c.name == target) {
                column.indexed = true;
            }
        }
    }

    let mut tables: BTreeMap<String, Vec<Table>> = BTreeMap::new();
    for row in &rows.tables {
        let keyspace = text(row, "keyspace_name").map_err(malformed("tables"))?;
        if filter.is_excluded(&keyspace) {
            continue;
        }
        let name = text(row, "table_name").map_err(malformed("tables"))?;
        let cols = columns.remove(&(keyspace.clone(), name.clone())).unwrap_or_default();
        if let Some(table) = assemble_table(keyspace.clone(), name, TableKind::Base, cols, &mut warnings) {
            tables.entry(keyspace).or_default().push(table);
        }
    }

    for row in &rows.views {
        let keyspace = text(row, "keyspace_name").map_err(malformed("views"))?;
        if filter.is_excluded(&keyspace) {
            continue;
        }
        let name = text(row, "view_name").map_err(malformed("views"))?;
        let base_table = text(row, "base_table_name").map_err(malformed("views"))?;
        let cols = columns.remove(&(keyspace.clone(), name.clone())).unwrap_or_default();
        let kind = TableKind::View {
            base_table: base_table.clone(),
        };
        let view = match assemble_table(keyspace.clone(), name.clone(), kind, cols, &mut warnings) {
            Some(view) => view,
            None => continue,
        };

        let keyspace_tables = tables.entry(keyspace).or_default();
        if let Some(base) = keyspace_tables.iter_mut().find(|t| t.name == base_table) {
            base.views.push(name);
            base.views.sort();
        }
        keyspace_tables.push(view);
    }

    let mut keyspaces = Vec::with_capacity(keyspace_names.len());
    for name in keyspace_names {
        let excluded = filter.is_excluded(&name);
        let mut keyspace_tables = if excluded {
            Vec::new()
        } else {
            tables.remove(&name).unwrap_or_default()
        };
        keyspace_tables.sort_by(|a, b| a.name.cmp(&b.name));
        detect_table_collisions(&name, &mut keyspace_tables, &mut warnings);

        keyspaces.push(Keyspace {
            name,
            excluded,
            tables: keyspace_tables,
        });
    }

    Ok(SchemaSnapshot::new(keyspaces, warnings))
}

fn assemble_table(
    keyspace: String,
    name: String,
    kind: TableKind,
    mut columns: Vec<Column>,
    warnings: &mut Vec<SchemaWarning>,
) -> Option<Table> {
    columns.sort_by(|a, b| match (a.role, b.role) {
        (ColumnRole::PartitionKey, ColumnRole::PartitionKey) | (ColumnRole::Clustering, ColumnRole::Clustering) => {
            a.position.cmp(&b.position)
        }
        (ra, rb) if key_rank(ra) != key_rank(rb) => key_rank(ra).cmp(&key_rank(rb)),
        _ => a.name.cmp(&b.name),
    });

    // Columns can lag behind the table listing while a table is being created
    if !columns.iter().any(|c| c.role == ColumnRole::PartitionKey) {
        warnings.push(SchemaWarning::TableExcluded {
            keyspace,
            table: name,
            reason: "no partition key columns were read".to_string(),
        });
        return None;
    }

    let names = TableNames::for_table(&name);
    let mut table = Table {
        keyspace,
        name,
        type_name: names.type_name,
        field_name: names.field_name,
        kind,
        columns,
        views: Vec::new(),
        exclusion: None,
    };

    for column in table.columns.iter_mut() {
        if !column.type_kind.is_supported() {
            column.exclusion = Some(Exclusion::UnsupportedType(column.cql_type.clone()));
            warnings.push(SchemaWarning::UnsupportedType {
                keyspace: table.keyspace.clone(),
                table: table.name.clone(),
                column: column.name.clone(),
                cql_type: column.cql_type.clone(),
            });
        }
    }

    if let Some(key) = table
        .columns
        .iter()
        .find(|c| c.is_primary_key() && !c.type_kind.is_supported())
    {
        let exclusion = Exclusion::UnsupportedKey {
            column: key.name.clone(),
        };
        warnings.push(SchemaWarning::TableExcluded {
            keyspace: table.keyspace.clone(),
            table: table.name.clone(),
            reason: exclusion.to_string(),
        });
        table.exclusion = Some(exclusion);
        return Some(table);
    }

    detect_column_collisions(&mut table, warnings);
    if table.exclusion.is_none() {
        exclude_reserved_key_fields(&mut table, warnings);
    }
    Some(table)
}

/// A key column named like a lookup argument cannot be addressed, so the table is excluded
fn exclude_reserved_key_fields(table: &mut Table, warnings: &mut Vec<SchemaWarning>) {
    let reserved = table
        .primary_key()
        .find(|c| RESERVED_KEY_FIELDS.contains(&c.field_name.as_str()))
        .map(|c| (c.name.clone(), c.field_name.clone()));
    if let Some((column, field)) = reserved {
        warnings.push(SchemaWarning::Collision {
            keyspace: table.keyspace.clone(),
            name: field.clone(),
            entries: vec![format!("{}.{}", table.name, column)],
        });
        table.exclusion = Some(Exclusion::Collision { name: field });
    }
}

fn key_rank(role: ColumnRole) -> u8 {
    match role {
        ColumnRole::PartitionKey => 0,
        ColumnRole::Clustering => 1,
        ColumnRole::Static | ColumnRole::Regular => 2,
    }
}

/// Columns whose field names coincide are all excluded; a key column in the
/// set excludes the table
fn detect_column_collisions(table: &mut Table, warnings: &mut Vec<SchemaWarning>) {
    let mut by_field: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, column) in table.columns.iter().enumerate() {
        if column.is_exposed() {
            by_field.entry(column.field_name.clone()).or_default().push(i);
        }
    }

    for (field, indices) in by_field.into_iter().filter(|(_, v)| v.len() > 1) {
        let mut entries: Vec<String> = indices
            .iter()
            .map(|&i| format!("{}.{}", table.name, table.columns[i].name))
            .collect();
        entries.sort();
        warnings.push(SchemaWarning::Collision {
            keyspace: table.keyspace.clone(),
            name: field.clone(),
            entries,
        });

        for &i in &indices {
            table.columns[i].exclusion = Some(Exclusion::Collision { name: field.clone() });
        }
        if indices.iter().any(|&i| table.columns[i].is_primary_key()) && table.exclusion.is_none() {
            table.exclusion = Some(Exclusion::Collision { name: field });
        }
    }
}

/// Tables whose generated names overlap, or use a reserved name, are all excluded
fn detect_table_collisions(keyspace: &str, tables: &mut [Table], warnings: &mut Vec<SchemaWarning>) {
    let mut owners: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
    for (i, table) in tables.iter().enumerate() {
        if !table.is_eligible() {
            continue;
        }
        let names = TableNames::for_table(&table.name);
        for name in names.type_family().into_iter().chain(names.field_family()) {
            owners.entry(name).or_default().insert(i);
        }
    }

    // One warning per group of colliding tables, named by the first shared name
    let mut groups: BTreeMap<BTreeSet<usize>, String> = BTreeMap::new();
    for (name, indices) in owners {
        if indices.len() < 2 && !is_reserved_type_name(&name) {
            continue;
        }
        groups.entry(indices).or_insert(name);
    }

    let mut excluded: BTreeMap<usize, String> = BTreeMap::new();
    for (indices, name) in groups {
        warnings.push(SchemaWarning::Collision {
            keyspace: keyspace.to_string(),
            name: name.clone(),
            entries: indices.iter().map(|&i| tables[i].name.clone()).collect(),
        });
        for i in indices {
            excluded.entry(i).or_insert_with(|| name.clone());
        }
    }

    for (i, name) in excluded {
        tables[i].exclusion = Some(Exclusion::Collision { name });
    }
}

fn parse_column(row: &Row) -> Result<Column, String> {
    let name = text(row, "column_name")?;
    let cql_type = text(row, "type")?;
    let kind = text(row, "kind")?;
    let role = ColumnRole::from_kind(&kind).ok_or_else(|| format!("unknown column kind '{}'", kind))?;
    let position = match row.get("position") {
        Some(Some(DbValue::Int(p))) => *p,
        Some(None) | None => -1,
        Some(Some(other)) => return Err(format!("position is {}, expected int", other.type_name())),
    };
    let clustering_order = match optional_text(row, "clustering_order")?.as_deref() {
        Some("asc") | Some("ASC") => Some(ClusteringOrder::Asc),
        Some("desc") | Some("DESC") => Some(ClusteringOrder::Desc),
        _ => None,
    };

    Ok(Column {
        field_name: to_camel_case(&name),
        type_kind: classify(&cql_type),
        name,
        cql_type,
        role,
        position,
        clustering_order,
        indexed: false,
        exclusion: None,
    })
}

/// Column targeted by an index: `x`, `"MixedCase"`, `values(x)`, `keys(x)`, `entries(x)`, `full(x)`
fn index_target(row: &Row) -> Option<String> {
    let options = match row.get("options") {
        Some(Some(DbValue::Map(entries))) => entries,
        _ => return None,
    };
    let target = options
        .iter()
        .find(|(k, _)| k.as_text() == Some("target"))
        .and_then(|(_, v)| v.as_text())?
        .trim();

    let inner = ["values(", "keys(", "entries(", "full("]
        .iter()
        .find_map(|prefix| target.strip_prefix(prefix).and_then(|t| t.strip_suffix(')')))
        .unwrap_or(target)
        .trim();

    match inner.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(quoted) => Some(quoted.replace("\"\"", "\"")),
        None => Some(inner.to_string()),
    }
}

fn text(row: &Row, column: &str) -> Result<String, String> {
    optional_text(row, column)?.ok_or_else(|| format!("missing {}", column))
}

fn optional_text(row: &Row, column: &str) -> Result<Option<String>, String> {
    match row.get(column) {
        Some(Some(value)) => value
            .as_text()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| format!("{} is {}, expected text", column, value.type_name())),
        Some(None) | None => Ok(None),
    }
}

fn malformed(table: &'static str) -> impl Fn(String) -> SyncError {
    move |detail| SyncError::Malformed {
        table: format!("system_schema.{}", table),
        detail,
    }
}
