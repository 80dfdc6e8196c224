/// Custom GraphQL scalars for CQL types without a built-in GraphQL equivalent
///
/// Validators only check the textual shape; range and version checks happen in
/// the codec so the error can name the column.

use std::net::IpAddr;

use async_graphql::dynamic::Scalar;
use async_graphql::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveTime};

use crate::types::value::{Decimal, Varint};

/// Names of every custom scalar, in registration order
pub const CUSTOM_SCALARS: [&str; 9] = [
    "BigInt",
    "Decimal",
    "Varint",
    "Blob",
    "Inet",
    "Timestamp",
    "Time",
    "Uuid",
    "TimeUuid",
];

/// Register custom scalars in the schema builder
pub fn register_custom_scalars() -> Vec<Scalar> {
    vec![
        bigint_scalar(),
        string_scalar("Decimal", "Arbitrary-precision decimal written as a string", |s| {
            s.parse::<Decimal>().is_ok()
        }),
        string_scalar("Varint", "Arbitrary-precision integer written as a string", |s| {
            s.parse::<Varint>().is_ok()
        }),
        string_scalar("Blob", "Binary data encoded as standard base64", |s| {
            STANDARD.decode(s).is_ok()
        }),
        string_scalar("Inet", "IPv4 or IPv6 address", |s| s.parse::<IpAddr>().is_ok()),
        timestamp_scalar(),
        string_scalar("Time", "Time of day (HH:MM:SS with optional fraction)", |s| {
            NaiveTime::parse_from_str(s, "%H:%M:%S%.f").is_ok()
        }),
        string_scalar("Uuid", "UUID in canonical hyphenated form", |s| {
            uuid::Uuid::parse_str(s).is_ok()
        }),
        string_scalar("TimeUuid", "Version 1 (time-based) UUID", |s| {
            uuid::Uuid::parse_str(s).map_or(false, |u| u.get_version_num() == 1)
        }),
    ]
}

fn string_scalar(name: &str, description: &str, check: fn(&str) -> bool) -> Scalar {
    Scalar::new(name)
        .description(description)
        .validator(move |value| match value {
            Value::String(s) => check(s.as_str()),
            _ => false,
        })
}

/// 64-bit integers are emitted as strings; input also accepts integer literals
fn bigint_scalar() -> Scalar {
    Scalar::new("BigInt")
        .description("64-bit signed integer, emitted as a string")
        .validator(|value| match value {
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            Value::Number(n) => n.is_i64(),
            _ => false,
        })
}

/// RFC 3339 timestamps; integer input is taken as milliseconds since the epoch
fn timestamp_scalar() -> Scalar {
    Scalar::new("Timestamp")
        .description("RFC 3339 timestamp")
        .validator(|value| match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s.as_str()).is_ok(),
            Value::Number(n) => n.is_i64(),
            _ => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_registration() {
        let scalars = register_custom_scalars();
        assert_eq!(scalars.len(), CUSTOM_SCALARS.len());
    }

    #[test]
    fn test_timeuuid_shape() {
        assert!(uuid::Uuid::parse_str("308f185c-7272-11ea-bc55-0242ac130003")
            .map_or(false, |u| u.get_version_num() == 1));
        assert!(!uuid::Uuid::parse_str("d2b99a72-4482-4064-8f96-ca7aba39a1ca")
            .map_or(false, |u| u.get_version_num() == 1));
    }

    #[test]
    fn test_time_validation() {
        assert!(NaiveTime::parse_from_str("10:00:00.5", "%H:%M:%S%.f").is_ok());
        assert!(NaiveTime::parse_from_str("noon", "%H:%M:%S%.f").is_err());
    }
}
