/// Per-table operations
///
/// `TableOperations` owns everything a resolver needs for one table: the table
/// definition, the statement builder and the gateway. GraphQL resolvers and
/// REST handlers both call through it.

use async_graphql::Value;
use indexmap::IndexMap;

use crate::catalog::Table;
use crate::error::Result;
use crate::gateway::{ExecutionGateway, RequestContext, ResultPage};
use crate::query::{Consistency, MutationRequest, QueryBuilder, QueryRequest};

/// Result of an insert, update or delete
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub applied: bool,
    /// Values written, or the current row when a condition was not met
    pub value: Option<IndexMap<String, Value>>,
}

pub struct TableOperations {
    table: Table,
    builder: QueryBuilder,
    gateway: ExecutionGateway,
}

impl TableOperations {
    pub fn new(table: Table, builder: QueryBuilder, gateway: ExecutionGateway) -> Self {
        Self {
            table,
            builder,
            gateway,
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn is_writable(&self) -> bool {
        !self.table.is_view()
    }

    pub async fn list(&self, request: &QueryRequest, context: &RequestContext) -> Result<ResultPage> {
        let plan = self.builder.build_select(&self.table, request)?;
        self.gateway.execute(&plan, &context.identity, &context.cancel).await
    }

    pub async fn get(
        &self,
        key: &IndexMap<String, Value>,
        consistency: Option<Consistency>,
        context: &RequestContext,
    ) -> Result<Option<IndexMap<String, Value>>> {
        let plan = self.builder.build_lookup(&self.table, key, consistency)?;
        let page = self.gateway.execute(&plan, &context.identity, &context.cancel).await?;
        Ok(page.rows.into_iter().next())
    }

    pub async fn insert(&self, request: &MutationRequest, context: &RequestContext) -> Result<MutationOutcome> {
        let plan = self.builder.build_insert(&self.table, request)?;
        let page = self.gateway.execute(&plan, &context.identity, &context.cancel).await?;
        Ok(outcome(request, page))
    }

    pub async fn update(&self, request: &MutationRequest, context: &RequestContext) -> Result<MutationOutcome> {
        let plan = self.builder.build_update(&self.table, request)?;
        let page = self.gateway.execute(&plan, &context.identity, &context.cancel).await?;
        Ok(outcome(request, page))
    }

    pub async fn delete(&self, request: &MutationRequest, context: &RequestContext) -> Result<MutationOutcome> {
        let plan = self.builder.build_delete(&self.table, request)?;
        let page = self.gateway.execute(&plan, &context.identity, &context.cancel).await?;
        Ok(outcome(request, page))
    }
}

fn outcome(request: &MutationRequest, page: ResultPage) -> MutationOutcome {
    match page.applied {
        Some(false) => MutationOutcome {
            applied: false,
            value: page.rows.into_iter().next().filter(|row| row.values().any(|v| !matches!(v, Value::Null))),
        },
        _ => MutationOutcome {
            applied: true,
            value: Some(request.values.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::gateway::{ResultSet, Row, APPLIED_COLUMN};
    use crate::testing::{catalog_fixture, FakeSession};
    use crate::types::DbValue;

    fn operations(session: Arc<FakeSession>) -> TableOperations {
        let table = catalog_fixture().table("store", "books").cloned().unwrap();
        let gateway = ExecutionGateway::new(session, false, Duration::from_secs(5));
        TableOperations::new(table, QueryBuilder::default(), gateway)
    }

    #[tokio::test]
    async fn test_insert_reports_written_values() {
        let session = Arc::new(FakeSession::new());
        let ops = operations(session.clone());
        let request = MutationRequest::default()
            .with_value("title", Value::String("abc".into()))
            .with_value("pages", Value::from(3));

        let outcome = ops.insert(&request, &RequestContext::default()).await.unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.value, Some(request.values.clone()));
        assert!(session.calls()[0].statement.starts_with("INSERT INTO"));
    }

    #[tokio::test]
    async fn test_failed_condition_returns_existing_row() {
        let session = Arc::new(FakeSession::new());
        let mut row = Row::new();
        row.insert(APPLIED_COLUMN.to_string(), Some(DbValue::Boolean(false)));
        row.insert("title".to_string(), Some(DbValue::Text("abc".into())));
        row.insert("pages".to_string(), Some(DbValue::Int(7)));
        session.respond(ResultSet::new(vec![row]));
        let ops = operations(session);

        let mut request = MutationRequest::default()
            .with_value("title", Value::String("abc".into()))
            .with_value("pages", Value::from(3));
        request.if_not_exists = true;

        let outcome = ops.insert(&request, &RequestContext::default()).await.unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.value.unwrap()["pages"], Value::from(7));
    }

    #[tokio::test]
    async fn test_get_returns_first_row() {
        let session = Arc::new(FakeSession::new());
        let ops = operations(session.clone());
        let mut key = IndexMap::new();
        key.insert("title".to_string(), Value::String("abc".into()));

        assert_eq!(ops.get(&key, None, &RequestContext::default()).await.unwrap(), None);
        assert_eq!(
            session.calls()[0].statement,
            r#"SELECT * FROM "store"."books" WHERE "title" = ?"#
        );
    }
}
