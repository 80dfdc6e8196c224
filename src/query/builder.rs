/// Statement builder
///
/// Turns requests into `QueryPlan`s. Statement text depends only on the table and
/// on which predicates are present: predicates are emitted in column-declaration
/// order and per column in `FilterOp` order, so identical logical requests always
/// produce identical statements.

use async_graphql::Value;
use indexmap::IndexMap;

use crate::catalog::{Column, ColumnRole, Table};
use crate::config::QueryConfig;
use crate::error::QueryBuildError;
use crate::query::ddl::SchemaChange;
use crate::query::plan::{PageCursor, ProjectedColumn, QueryPlan};
use crate::query::request::{FilterOp, MutationRequest, Predicate, QueryRequest};
use crate::query::Consistency;
use crate::types::{encode, DbValue, TypeKind};

/// Defaults filled in for options a request leaves out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDefaults {
    pub page_size: i32,
    pub consistency: Consistency,
    pub mutation_consistency: Consistency,
    pub serial_consistency: Consistency,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self::from(&QueryConfig::default())
    }
}

impl From<&QueryConfig> for QueryDefaults {
    fn from(config: &QueryConfig) -> Self {
        Self {
            page_size: config.default_page_size,
            consistency: config.default_consistency,
            mutation_consistency: config.default_mutation_consistency,
            serial_consistency: config.default_serial_consistency,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    defaults: QueryDefaults,
}

impl QueryBuilder {
    pub fn new(defaults: QueryDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &QueryDefaults {
        &self.defaults
    }

    /// Build a filtered, paginated `SELECT`
    pub fn build_select(&self, table: &Table, request: &QueryRequest) -> Result<QueryPlan, QueryBuildError> {
        let page_size = self.page_size(request.page_size)?;
        let consistency = self.read_consistency(request.consistency)?;
        let limit = match request.limit {
            Some(limit) => Some(positive_i32("limit", limit)?),
            None => None,
        };

        let mut predicates = Vec::with_capacity(request.predicates.len());
        for predicate in &request.predicates {
            let (index, column) = find_column(table, &predicate.column)?;
            check_operator(column, predicate.op)?;
            let value = encode_predicate(column, predicate)?;
            predicates.push((index, predicate.op, column, value));
        }
        // Stable: duplicate (column, operator) pairs keep request order
        predicates.sort_by_key(|(index, op, _, _)| (*index, *op));

        let mut statement = format!("SELECT * FROM {}", table_ref(&table.keyspace, &table.name));
        let mut values = Vec::with_capacity(predicates.len() + 1);

        if !predicates.is_empty() {
            let clauses: Vec<String> = predicates
                .iter()
                .map(|(_, op, column, _)| format!("{} {} ?", quote_identifier(&column.name), op.cql()))
                .collect();
            statement.push_str(" WHERE ");
            statement.push_str(&clauses.join(" AND "));
            values.extend(predicates.iter().map(|(_, _, _, value)| Some(value.clone())));
        }

        if !request.order_by.is_empty() {
            let mut orderings = Vec::with_capacity(request.order_by.len());
            for order in &request.order_by {
                let (_, column) = find_column(table, &order.column)?;
                if column.role != ColumnRole::Clustering {
                    return Err(QueryBuildError::NotClusteringColumn {
                        column: column.name.clone(),
                    });
                }
                orderings.push(format!("{} {}", quote_identifier(&column.name), order.direction.cql()));
            }
            statement.push_str(" ORDER BY ");
            statement.push_str(&orderings.join(", "));
        }

        if let Some(limit) = limit {
            statement.push_str(" LIMIT ?");
            values.push(Some(DbValue::Int(limit)));
        }

        let restrictions: Vec<(&Column, FilterOp)> = predicates
            .iter()
            .map(|(_, op, column, _)| (*column, *op))
            .collect();
        if needs_filtering(table, &restrictions) {
            statement.push_str(" ALLOW FILTERING");
        }

        Ok(QueryPlan {
            statement,
            values,
            consistency,
            serial_consistency: None,
            page_size,
            cursor: request.cursor.clone(),
            projection: projection(table),
            identity_scoped: true,
        })
    }

    /// Build a single-row lookup; every primary-key column is required
    pub fn build_lookup(
        &self,
        table: &Table,
        key: &IndexMap<String, Value>,
        consistency: Option<Consistency>,
    ) -> Result<QueryPlan, QueryBuildError> {
        for name in key.keys() {
            let (_, column) = find_column(table, name)?;
            if !column.is_primary_key() {
                return Err(QueryBuildError::NotKeyColumn {
                    column: column.name.clone(),
                });
            }
        }

        let mut request = QueryRequest::new();
        request.consistency = consistency;
        for column in table.primary_key() {
            let value = required_key(key, column)?;
            request.predicates.push(Predicate::eq(column.name.clone(), value.clone()));
        }

        self.build_select(table, &request)
    }

    /// Build an `INSERT`, optionally `IF NOT EXISTS` and `USING TTL`
    pub fn build_insert(&self, table: &Table, request: &MutationRequest) -> Result<QueryPlan, QueryBuildError> {
        check_writable(table)?;
        let consistency = self.write_consistency(request.consistency)?;
        let serial_consistency = self.serial_consistency(request.serial_consistency, request.if_not_exists)?;

        for column in table.primary_key() {
            required_key(&request.values, column)?;
        }
        let assigned = self.assignments(table, &request.values)?;

        let names: Vec<String> = assigned.iter().map(|(c, _)| quote_identifier(&c.name)).collect();
        let markers = vec!["?"; assigned.len()];
        let mut statement = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table_ref(&table.keyspace, &table.name),
            names.join(", "),
            markers.join(", ")
        );
        let mut values: Vec<Option<DbValue>> = assigned.into_iter().map(|(_, v)| v).collect();

        if request.if_not_exists {
            statement.push_str(" IF NOT EXISTS");
        }
        if let Some(ttl) = request.ttl {
            statement.push_str(" USING TTL ?");
            values.push(Some(DbValue::Int(positive_i32("ttl", ttl)?)));
        }

        Ok(self.mutation_plan(table, statement, values, consistency, serial_consistency))
    }

    /// Build an `UPDATE` of the non-key columns of one row
    pub fn build_update(&self, table: &Table, request: &MutationRequest) -> Result<QueryPlan, QueryBuildError> {
        check_writable(table)?;
        let consistency = self.write_consistency(request.consistency)?;
        let serial_consistency = self.serial_consistency(request.serial_consistency, request.if_exists)?;

        let assigned = self.assignments(table, &request.values)?;
        let (keys, sets): (Vec<_>, Vec<_>) = assigned.into_iter().partition(|(c, _)| c.is_primary_key());
        if sets.is_empty() {
            return Err(QueryBuildError::NoValues);
        }
        for column in table.primary_key() {
            if !keys.iter().any(|(c, v)| c.name == column.name && v.is_some()) {
                return Err(QueryBuildError::MissingKey {
                    column: column.name.clone(),
                });
            }
        }

        let mut statement = format!("UPDATE {}", table_ref(&table.keyspace, &table.name));
        let mut values = Vec::with_capacity(keys.len() + sets.len() + 1);

        if let Some(ttl) = request.ttl {
            statement.push_str(" USING TTL ?");
            values.push(Some(DbValue::Int(positive_i32("ttl", ttl)?)));
        }

        let set_clauses: Vec<String> = sets
            .iter()
            .map(|(c, _)| format!("{} = ?", quote_identifier(&c.name)))
            .collect();
        statement.push_str(" SET ");
        statement.push_str(&set_clauses.join(", "));
        values.extend(sets.into_iter().map(|(_, v)| v));

        let key_clauses: Vec<String> = keys
            .iter()
            .map(|(c, _)| format!("{} = ?", quote_identifier(&c.name)))
            .collect();
        statement.push_str(" WHERE ");
        statement.push_str(&key_clauses.join(" AND "));
        values.extend(keys.into_iter().map(|(_, v)| v));

        if request.if_exists {
            statement.push_str(" IF EXISTS");
        }

        Ok(self.mutation_plan(table, statement, values, consistency, serial_consistency))
    }

    /// Build a `DELETE`; the full partition key and a clustering prefix are accepted
    pub fn build_delete(&self, table: &Table, request: &MutationRequest) -> Result<QueryPlan, QueryBuildError> {
        check_writable(table)?;
        let consistency = self.write_consistency(request.consistency)?;
        let serial_consistency = self.serial_consistency(request.serial_consistency, request.if_exists)?;

        for name in request.values.keys() {
            let (_, column) = find_column(table, name)?;
            if !column.is_primary_key() {
                return Err(QueryBuildError::NotKeyColumn {
                    column: column.name.clone(),
                });
            }
        }

        let mut clauses = Vec::new();
        let mut values = Vec::new();
        for column in table.partition_key() {
            let value = required_key(&request.values, column)?;
            clauses.push(format!("{} = ?", quote_identifier(&column.name)));
            values.push(encode_key(column, value)?);
        }

        let mut prefix_ended = false;
        for column in table.clustering_key() {
            match request.values.get(&column.name).filter(|v| !matches!(v, Value::Null)) {
                Some(value) if !prefix_ended => {
                    clauses.push(format!("{} = ?", quote_identifier(&column.name)));
                    values.push(encode_key(column, value)?);
                }
                Some(_) => {
                    return Err(QueryBuildError::MissingKey {
                        column: previous_clustering(table, &column.name),
                    })
                }
                None => prefix_ended = true,
            }
        }

        let mut statement = format!(
            "DELETE FROM {} WHERE {}",
            table_ref(&table.keyspace, &table.name),
            clauses.join(" AND ")
        );
        if request.if_exists {
            statement.push_str(" IF EXISTS");
        }

        Ok(self.mutation_plan(table, statement, values, consistency, serial_consistency))
    }

    /// Build a schema-management statement
    pub fn build_ddl(&self, change: &SchemaChange) -> Result<QueryPlan, QueryBuildError> {
        Ok(QueryPlan {
            statement: change.to_cql()?,
            values: Vec::new(),
            consistency: self.defaults.mutation_consistency,
            serial_consistency: None,
            page_size: self.defaults.page_size,
            cursor: PageCursor::default(),
            projection: Vec::new(),
            identity_scoped: true,
        })
    }

    fn mutation_plan(
        &self,
        table: &Table,
        statement: String,
        values: Vec<Option<DbValue>>,
        consistency: Consistency,
        serial_consistency: Option<Consistency>,
    ) -> QueryPlan {
        QueryPlan {
            statement,
            values,
            consistency,
            serial_consistency,
            page_size: self.defaults.page_size,
            cursor: PageCursor::default(),
            projection: projection(table),
            identity_scoped: true,
        }
    }

    /// Encode assigned values in column-declaration order
    fn assignments<'t>(
        &self,
        table: &'t Table,
        values: &IndexMap<String, Value>,
    ) -> Result<Vec<(&'t Column, Option<DbValue>)>, QueryBuildError> {
        let mut assigned = Vec::with_capacity(values.len());
        for (name, value) in values {
            let (index, column) = find_column(table, name)?;
            let encoded = encode(&column.type_kind, value).map_err(|e| invalid_value(column, e))?;
            if column.is_primary_key() && encoded.is_none() {
                return Err(QueryBuildError::MissingKey {
                    column: column.name.clone(),
                });
            }
            assigned.push((index, column, encoded));
        }
        assigned.sort_by_key(|(index, _, _)| *index);
        Ok(assigned.into_iter().map(|(_, c, v)| (c, v)).collect())
    }

    fn page_size(&self, requested: Option<i64>) -> Result<i32, QueryBuildError> {
        match requested {
            Some(size) => positive_i32("pageSize", size),
            None => Ok(self.defaults.page_size),
        }
    }

    fn read_consistency(&self, requested: Option<Consistency>) -> Result<Consistency, QueryBuildError> {
        let consistency = requested.unwrap_or(self.defaults.consistency);
        if !consistency.is_valid_for_read() {
            return Err(QueryBuildError::InvalidOption(format!(
                "consistency {} cannot be used for reads",
                consistency
            )));
        }
        Ok(consistency)
    }

    fn write_consistency(&self, requested: Option<Consistency>) -> Result<Consistency, QueryBuildError> {
        let consistency = requested.unwrap_or(self.defaults.mutation_consistency);
        if !consistency.is_valid_for_write() {
            return Err(QueryBuildError::InvalidOption(format!(
                "consistency {} cannot be used for writes",
                consistency
            )));
        }
        Ok(consistency)
    }

    fn serial_consistency(
        &self,
        requested: Option<Consistency>,
        conditional: bool,
    ) -> Result<Option<Consistency>, QueryBuildError> {
        let serial = match (requested, conditional) {
            (Some(serial), _) => serial,
            (None, true) => self.defaults.serial_consistency,
            (None, false) => return Ok(None),
        };
        if !serial.is_serial() {
            return Err(QueryBuildError::InvalidOption(format!(
                "serial consistency must be SERIAL or LOCAL_SERIAL, got {}",
                serial
            )));
        }
        Ok(Some(serial))
    }
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"keyspace"."table"`
pub fn table_ref(keyspace: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(keyspace), quote_identifier(table))
}

fn projection(table: &Table) -> Vec<ProjectedColumn> {
    table
        .exposed_columns()
        .map(|c| ProjectedColumn {
            name: c.name.clone(),
            kind: c.type_kind.clone(),
        })
        .collect()
}

fn find_column<'t>(table: &'t Table, name: &str) -> Result<(usize, &'t Column), QueryBuildError> {
    let (index, column) = table
        .columns
        .iter()
        .enumerate()
        .find(|(_, c)| c.name == name)
        .ok_or_else(|| QueryBuildError::UnknownColumn {
            column: name.to_string(),
        })?;
    if !column.is_exposed() {
        return Err(QueryBuildError::UnsupportedColumn {
            column: column.name.clone(),
        });
    }
    Ok((index, column))
}

fn check_operator(column: &Column, op: FilterOp) -> Result<(), QueryBuildError> {
    let supported = match (&column.type_kind, op) {
        (TypeKind::Scalar(_), _) => true,
        (_, FilterOp::Eq) => true,
        _ => false,
    };
    if supported {
        Ok(())
    } else {
        Err(QueryBuildError::UnsupportedOperator {
            column: column.name.clone(),
            operator: op.field_name().to_string(),
        })
    }
}

fn encode_predicate(column: &Column, predicate: &Predicate) -> Result<DbValue, QueryBuildError> {
    let encoded = match (predicate.op, &column.type_kind) {
        (FilterOp::In, TypeKind::Scalar(scalar)) => encode(&TypeKind::List(*scalar), &predicate.value),
        _ => encode(&column.type_kind, &predicate.value),
    };
    encoded
        .map_err(|e| invalid_value(column, e))?
        .ok_or_else(|| QueryBuildError::InvalidValue {
            column: column.name.clone(),
            detail: "null cannot be used in a filter".to_string(),
        })
}

fn encode_key(column: &Column, value: &Value) -> Result<Option<DbValue>, QueryBuildError> {
    match encode(&column.type_kind, value).map_err(|e| invalid_value(column, e))? {
        Some(encoded) => Ok(Some(encoded)),
        None => Err(QueryBuildError::MissingKey {
            column: column.name.clone(),
        }),
    }
}

fn required_key<'v>(values: &'v IndexMap<String, Value>, column: &Column) -> Result<&'v Value, QueryBuildError> {
    values
        .get(&column.name)
        .filter(|v| !matches!(v, Value::Null))
        .ok_or_else(|| QueryBuildError::MissingKey {
            column: column.name.clone(),
        })
}

fn invalid_value(column: &Column, err: crate::error::TypeError) -> QueryBuildError {
    QueryBuildError::InvalidValue {
        column: column.name.clone(),
        detail: err.to_string(),
    }
}

fn check_writable(table: &Table) -> Result<(), QueryBuildError> {
    if table.is_view() {
        return Err(QueryBuildError::InvalidOption(format!(
            "materialized view {} is read-only",
            table.qualified_name()
        )));
    }
    Ok(())
}

fn previous_clustering(table: &Table, name: &str) -> String {
    table
        .clustering_key()
        .take_while(|c| c.name != name)
        .last()
        .map(|c| c.name.clone())
        .unwrap_or_else(|| name.to_string())
}

fn positive_i32(option: &str, value: i64) -> Result<i32, QueryBuildError> {
    if value <= 0 {
        return Err(QueryBuildError::InvalidOption(format!(
            "{} must be positive, got {}",
            option, value
        )));
    }
    i32::try_from(value)
        .map_err(|_| QueryBuildError::InvalidOption(format!("{} is too large: {}", option, value)))
}

/// Whether the restrictions need `ALLOW FILTERING`
///
/// Required for: restrictions on non-key columns other than equality on an
/// indexed column, `!=` anywhere, partition-key restrictions that are not `=`/`IN`
/// or do not cover the whole partition key (unless an index serves the query),
/// and clustering restrictions that skip a clustering column or lack a full
/// partition key.
fn needs_filtering(table: &Table, restrictions: &[(&Column, FilterOp)]) -> bool {
    if restrictions.is_empty() {
        return false;
    }
    if restrictions.iter().any(|(_, op)| *op == FilterOp::NotEq) {
        return true;
    }

    let mut uses_index = false;
    for (column, op) in restrictions {
        if !column.is_primary_key() {
            if column.indexed && *op == FilterOp::Eq {
                uses_index = true;
            } else {
                return true;
            }
        }
    }

    let equality = |column: &Column| {
        restrictions
            .iter()
            .any(|(c, op)| c.name == column.name && matches!(op, FilterOp::Eq | FilterOp::In))
    };

    let restricts_partition = restrictions
        .iter()
        .any(|(c, _)| c.role == ColumnRole::PartitionKey);
    let full_partition = table.partition_key().all(|c| equality(c));
    let partition_range = restrictions
        .iter()
        .any(|(c, op)| c.role == ColumnRole::PartitionKey && !matches!(op, FilterOp::Eq | FilterOp::In));
    if partition_range || (restricts_partition && !full_partition && !uses_index) {
        return true;
    }

    let restricts_clustering = restrictions
        .iter()
        .any(|(c, _)| c.role == ColumnRole::Clustering);
    if restricts_clustering {
        if !full_partition && !uses_index {
            return true;
        }
        // Every clustering column before a restricted one needs an equality restriction
        let mut gap = false;
        for column in table.clustering_key() {
            let restricted = restrictions.iter().any(|(c, _)| c.name == column.name);
            if restricted && gap {
                return true;
            }
            if !equality(column) {
                gap = true;
            }
        }
    }

    false
}
