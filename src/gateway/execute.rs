use std::sync::Arc;
use std::time::Duration;

use async_graphql::Value;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::error::{DataApiError, Result};
use crate::gateway::identity::RequestIdentity;
use crate::gateway::session::{ExecuteOptions, Row, Session};
use crate::query::{PageCursor, QueryPlan};
use crate::types::{decode, DbValue};

/// Column the database adds to the result of a conditional mutation
pub const APPLIED_COLUMN: &str = "[applied]";

/// One decoded page of results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    /// Rows keyed by column name, in projection order
    pub rows: Vec<IndexMap<String, Value>>,
    /// Paging state for the next page; empty when exhausted
    pub cursor: PageCursor,
    /// Outcome of a conditional mutation
    pub applied: Option<bool>,
}

/// Runs query plans against the session
#[derive(Clone)]
pub struct ExecutionGateway {
    session: Arc<dyn Session>,
    use_user_or_role: bool,
    request_timeout: Duration,
}

impl ExecutionGateway {
    pub fn new(session: Arc<dyn Session>, use_user_or_role: bool, request_timeout: Duration) -> Self {
        Self {
            session,
            use_user_or_role,
            request_timeout,
        }
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn uses_user_or_role(&self) -> bool {
        self.use_user_or_role
    }

    /// Execute one plan as `identity`
    ///
    /// Fails with `Unauthorized` before touching the database when identity
    /// scoping is on and the caller has no resolved identity.
    pub async fn execute(
        &self,
        plan: &QueryPlan,
        identity: &RequestIdentity,
        cancel: &CancellationToken,
    ) -> Result<ResultPage> {
        let user_or_role = if self.use_user_or_role && plan.identity_scoped {
            match identity.user_or_role() {
                Some(name) => Some(name.to_string()),
                None => return Err(DataApiError::Unauthorized),
            }
        } else {
            None
        };

        let options = ExecuteOptions::new(plan.consistency, plan.page_size)
            .with_serial_consistency(plan.serial_consistency)
            .with_paging_state(plan.cursor.as_bytes().to_vec())
            .with_user_or_role(user_or_role);

        tracing::debug!("Executing: {}", plan.statement);

        let execution = tokio::time::timeout(
            self.request_timeout,
            self.session.execute(&plan.statement, &plan.values, &options),
        );
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(DataApiError::Cancelled("request was cancelled".to_string()));
            }
            result = execution => match result {
                Ok(result) => result,
                Err(_) => {
                    return Err(DataApiError::Cancelled(format!(
                        "request timed out after {} ms",
                        self.request_timeout.as_millis()
                    )))
                }
            },
        };

        let result = result.map_err(|e| DataApiError::Execution(e.to_string()))?;

        let mut applied = None;
        let mut rows = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            if let Some(Some(DbValue::Boolean(flag))) = row.get(APPLIED_COLUMN) {
                applied = Some(*flag);
            }
            rows.push(decode_row(plan, row)?);
        }

        Ok(ResultPage {
            rows,
            cursor: PageCursor::new(result.paging_state),
            applied,
        })
    }
}

fn decode_row(plan: &QueryPlan, row: &Row) -> Result<IndexMap<String, Value>> {
    let mut decoded = IndexMap::with_capacity(plan.projection.len());
    for column in &plan.projection {
        let raw = row.get(&column.name).and_then(Option::as_ref);
        let value = decode(&column.kind, raw).map_err(|source| DataApiError::Decode {
            column: column.name.clone(),
            source,
        })?;
        decoded.insert(column.name.clone(), value);
    }
    Ok(decoded)
}
