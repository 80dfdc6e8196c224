/// `Session` backed by the scylla driver
///
/// Values cross as `CqlValue`. Column types the crate does not expose (tuples,
/// UDTs, durations, dates, counters) come back as `None`; they are never in a
/// plan's projection.

use async_trait::async_trait;
use scylla::frame::response::result::CqlValue;
use scylla::frame::value::{CqlDecimal, CqlTime, CqlTimestamp, CqlTimeuuid, CqlVarint};
use scylla::query::Query;
use scylla::statement::{PagingState, PagingStateResponse, SerialConsistency};
use scylla::SessionBuilder;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{DataApiError, Result};
use crate::gateway::session::{ExecuteOptions, ResultSet, Row, Session, SessionError};
use crate::query::Consistency;
use crate::types::{DbValue, Decimal, Varint};

pub struct ScyllaSession {
    session: scylla::Session,
}

impl ScyllaSession {
    /// Connect to the configured contact points
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        tracing::info!("Connecting to {}", config.hosts.join(", "));

        let mut builder = SessionBuilder::new().known_nodes(&config.hosts);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.user(username, password);
        }

        let session = builder
            .build()
            .await
            .map_err(|e| DataApiError::Config(format!("Failed to connect to database: {}", e)))?;

        Ok(Self { session })
    }
}

#[async_trait]
impl Session for ScyllaSession {
    async fn execute(
        &self,
        statement: &str,
        values: &[Option<DbValue>],
        options: &ExecuteOptions,
    ) -> std::result::Result<ResultSet, SessionError> {
        // The driver has no proxy-execution support
        if let Some(user_or_role) = &options.user_or_role {
            return Err(SessionError::Unsupported(format!(
                "executing as '{}' requires a session with proxy authorization",
                user_or_role
            )));
        }

        let mut query = Query::new(statement);
        query.set_consistency(to_driver_consistency(options.consistency));
        query.set_serial_consistency(options.serial_consistency.and_then(to_serial_consistency));
        query.set_page_size(options.page_size);

        let paging_state = if options.paging_state.is_empty() {
            PagingState::start()
        } else {
            PagingState::new_from_raw_bytes(options.paging_state.clone())
        };

        let binds: Vec<Option<CqlValue>> = values.iter().map(|v| v.as_ref().map(to_cql)).collect();

        let (result, paging) = self
            .session
            .query_single_page(query, &binds[..], paging_state)
            .await
            .map_err(|e| SessionError::Statement(e.to_string()))?;

        let names: Vec<String> = result.col_specs().iter().map(|spec| spec.name.clone()).collect();
        let rows = result
            .rows_or_empty()
            .into_iter()
            .map(|row| {
                names
                    .iter()
                    .cloned()
                    .zip(row.columns.into_iter().map(|value| value.and_then(from_cql)))
                    .collect::<Row>()
            })
            .collect();

        let paging_state = match paging {
            PagingStateResponse::HasMorePages { state } => state
                .as_bytes_slice()
                .map(|bytes| bytes.to_vec())
                .unwrap_or_default(),
            PagingStateResponse::NoMorePages => Vec::new(),
        };

        Ok(ResultSet::new(rows).with_paging_state(paging_state))
    }
}

fn to_driver_consistency(consistency: Consistency) -> scylla::statement::Consistency {
    use scylla::statement::Consistency as Driver;
    match consistency {
        Consistency::Any => Driver::Any,
        Consistency::One => Driver::One,
        Consistency::Two => Driver::Two,
        Consistency::Three => Driver::Three,
        Consistency::Quorum => Driver::Quorum,
        Consistency::All => Driver::All,
        Consistency::LocalQuorum => Driver::LocalQuorum,
        Consistency::EachQuorum => Driver::EachQuorum,
        Consistency::Serial => Driver::Serial,
        Consistency::LocalSerial => Driver::LocalSerial,
        Consistency::LocalOne => Driver::LocalOne,
    }
}

fn to_serial_consistency(consistency: Consistency) -> Option<SerialConsistency> {
    match consistency {
        Consistency::Serial => Some(SerialConsistency::Serial),
        Consistency::LocalSerial => Some(SerialConsistency::LocalSerial),
        _ => None,
    }
}

fn to_cql(value: &DbValue) -> CqlValue {
    match value {
        DbValue::Text(s) => CqlValue::Text(s.clone()),
        DbValue::Ascii(s) => CqlValue::Ascii(s.clone()),
        DbValue::Boolean(b) => CqlValue::Boolean(*b),
        DbValue::TinyInt(i) => CqlValue::TinyInt(*i),
        DbValue::SmallInt(i) => CqlValue::SmallInt(*i),
        DbValue::Int(i) => CqlValue::Int(*i),
        DbValue::BigInt(i) => CqlValue::BigInt(*i),
        DbValue::Float(f) => CqlValue::Float(*f),
        DbValue::Double(f) => CqlValue::Double(*f),
        DbValue::Decimal(d) => CqlValue::Decimal(CqlDecimal::from_signed_be_bytes_and_exponent(
            d.unscaled().to_signed_bytes_be(),
            d.scale(),
        )),
        DbValue::Varint(v) => CqlValue::Varint(CqlVarint::from_signed_bytes_be(v.to_signed_bytes_be())),
        DbValue::Blob(b) => CqlValue::Blob(b.clone()),
        DbValue::Inet(ip) => CqlValue::Inet(*ip),
        DbValue::Timestamp(ms) => CqlValue::Timestamp(CqlTimestamp(*ms)),
        DbValue::Time(ns) => CqlValue::Time(CqlTime(*ns)),
        DbValue::Uuid(u) => CqlValue::Uuid(*u),
        DbValue::TimeUuid(u) => CqlValue::Timeuuid(CqlTimeuuid::from(*u)),
        DbValue::List(items) => CqlValue::List(items.iter().map(to_cql).collect()),
        DbValue::Set(items) => CqlValue::Set(items.iter().map(to_cql).collect()),
        DbValue::Map(entries) => CqlValue::Map(entries.iter().map(|(k, v)| (to_cql(k), to_cql(v))).collect()),
    }
}

fn from_cql(value: CqlValue) -> Option<DbValue> {
    let converted = match value {
        CqlValue::Text(s) => DbValue::Text(s),
        CqlValue::Ascii(s) => DbValue::Ascii(s),
        CqlValue::Boolean(b) => DbValue::Boolean(b),
        CqlValue::TinyInt(i) => DbValue::TinyInt(i),
        CqlValue::SmallInt(i) => DbValue::SmallInt(i),
        CqlValue::Int(i) => DbValue::Int(i),
        CqlValue::BigInt(i) => DbValue::BigInt(i),
        CqlValue::Float(f) => DbValue::Float(f),
        CqlValue::Double(f) => DbValue::Double(f),
        CqlValue::Decimal(d) => {
            let (bytes, scale) = d.as_signed_be_bytes_slice_and_exponent();
            DbValue::Decimal(Decimal::new(Varint::from_signed_bytes_be(bytes), scale))
        }
        CqlValue::Varint(v) => DbValue::Varint(Varint::from_signed_bytes_be(v.as_signed_bytes_be_slice())),
        CqlValue::Blob(b) => DbValue::Blob(b),
        CqlValue::Inet(ip) => DbValue::Inet(ip),
        CqlValue::Timestamp(CqlTimestamp(ms)) => DbValue::Timestamp(ms),
        CqlValue::Time(CqlTime(ns)) => DbValue::Time(ns),
        CqlValue::Uuid(u) => DbValue::Uuid(u),
        CqlValue::Timeuuid(u) => DbValue::TimeUuid(Uuid::from(u)),
        CqlValue::List(items) => DbValue::List(items.into_iter().filter_map(from_cql).collect()),
        CqlValue::Set(items) => DbValue::Set(items.into_iter().filter_map(from_cql).collect()),
        CqlValue::Map(entries) => DbValue::Map(
            entries
                .into_iter()
                .filter_map(|(k, v)| Some((from_cql(k)?, from_cql(v)?)))
                .collect(),
        ),
        _ => return None,
    };
    Some(converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_convert_both_ways() {
        let values = vec![
            DbValue::Text("abc".into()),
            DbValue::BigInt(-5),
            DbValue::Decimal("-12.50".parse().unwrap()),
            DbValue::Varint("123456789012345678901234567890".parse().unwrap()),
            DbValue::Timestamp(1_700_000_000_000),
            DbValue::Map(vec![(DbValue::Text("k".into()), DbValue::Int(1))]),
        ];
        for value in values {
            assert_eq!(from_cql(to_cql(&value)), Some(value));
        }
    }

    #[test]
    fn test_unrepresentable_values_are_dropped() {
        assert_eq!(from_cql(CqlValue::Empty), None);
    }

    #[test]
    fn test_serial_levels() {
        assert!(to_serial_consistency(Consistency::LocalSerial).is_some());
        assert!(to_serial_consistency(Consistency::One).is_none());
    }
}
