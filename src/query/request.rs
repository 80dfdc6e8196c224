/// Inbound requests, independent of the protocol they arrived on

use async_graphql::Value;
use indexmap::IndexMap;

use crate::query::plan::PageCursor;
use crate::query::Consistency;

/// Filter operator, declared in the order predicates on one column are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl FilterOp {
    pub const ALL: [FilterOp; 7] = [
        FilterOp::Eq,
        FilterOp::NotEq,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::In,
    ];

    pub fn cql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::NotEq => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::In => "IN",
        }
    }

    /// Field name in filter inputs
    pub fn field_name(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::NotEq => "notEq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        FilterOp::ALL.into_iter().find(|op| op.field_name() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Database column name
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn cql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub column: String,
    pub direction: SortDirection,
}

/// List request; omitted options take the configured defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<SortOrder>,
    pub limit: Option<i64>,
    pub page_size: Option<i64>,
    pub cursor: PageCursor,
    pub consistency: Option<Consistency>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(SortOrder {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_cursor(mut self, cursor: PageCursor) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }
}

/// Insert, update or delete request; `values` is keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationRequest {
    pub values: IndexMap<String, Value>,
    pub if_exists: bool,
    pub if_not_exists: bool,
    pub ttl: Option<i64>,
    pub consistency: Option<Consistency>,
    pub serial_consistency: Option<Consistency>,
}

impl MutationRequest {
    pub fn new(values: IndexMap<String, Value>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    pub fn with_value(mut self, column: impl Into<String>, value: Value) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.if_exists || self.if_not_exists
    }
}
