/// Conversion between GraphQL/JSON values and driver values
///
/// `encode` turns a protocol value into a bind value for a column of the given
/// kind; `decode` turns a value read from the database back into its protocol
/// form. A database NULL decodes to `Value::Null` and `Value::Null` encodes to
/// `None`, so absent values never turn into empty strings or zeros.

use std::net::IpAddr;

use async_graphql::{Name, Value};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveTime, SecondsFormat, Timelike, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::error::TypeError;
use crate::types::kind::{ScalarKind, TypeKind};
use crate::types::value::{DbValue, Decimal, Varint};

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SECOND;

/// Encode a protocol value as a bind value
pub fn encode(kind: &TypeKind, value: &Value) -> Result<Option<DbValue>, TypeError> {
    if matches!(value, Value::Null) {
        return Ok(None);
    }

    let encoded = match kind {
        TypeKind::Scalar(scalar) => encode_scalar(*scalar, value)?,
        TypeKind::List(element) => DbValue::List(encode_elements(*element, value, "list")?),
        TypeKind::Set(element) => DbValue::Set(encode_elements(*element, value, "set")?),
        TypeKind::Map(key, item) => DbValue::Map(encode_entries(*key, *item, value)?),
        TypeKind::Unsupported(cql_type) => {
            return Err(TypeError::new(cql_type.as_str(), "type is not supported"))
        }
    };

    Ok(Some(encoded))
}

/// Decode a value read from the database
pub fn decode(kind: &TypeKind, value: Option<&DbValue>) -> Result<Value, TypeError> {
    let value = match value {
        Some(value) => value,
        None => return Ok(Value::Null),
    };

    match (kind, value) {
        (TypeKind::Scalar(scalar), value) => decode_scalar(*scalar, value),
        (TypeKind::List(element), DbValue::List(items) | DbValue::Set(items))
        | (TypeKind::Set(element), DbValue::Set(items) | DbValue::List(items)) => items
            .iter()
            .map(|item| decode_scalar(*element, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        (TypeKind::Map(key, item), DbValue::Map(entries)) => entries
            .iter()
            .map(|(k, v)| {
                let mut entry = IndexMap::new();
                entry.insert(Name::new("key"), decode_scalar(*key, k)?);
                entry.insert(Name::new("value"), decode_scalar(*item, v)?);
                Ok(Value::Object(entry))
            })
            .collect::<Result<Vec<_>, TypeError>>()
            .map(Value::List),
        (TypeKind::Unsupported(cql_type), _) => {
            Err(TypeError::new(cql_type.as_str(), "type is not supported"))
        }
        (kind, other) => Err(TypeError::new(
            kind.cql_type(),
            format!("unexpected {} value", other.type_name()),
        )),
    }
}

/// Interpret text (a URL path segment or a map key) as a protocol value of the given kind
pub fn value_from_text(kind: &TypeKind, text: &str) -> Result<Value, TypeError> {
    let scalar = match kind {
        TypeKind::Scalar(scalar) => *scalar,
        other => {
            return Err(TypeError::new(
                other.cql_type(),
                "collections cannot be written as text",
            ))
        }
    };
    scalar_from_text(scalar, text)
}

fn scalar_from_text(kind: ScalarKind, text: &str) -> Result<Value, TypeError> {
    let invalid = || TypeError::new(kind.cql_name(), format!("'{}' is not valid", text));
    match kind {
        ScalarKind::Boolean => text.parse::<bool>().map(Value::Boolean).map_err(|_| invalid()),
        ScalarKind::TinyInt | ScalarKind::SmallInt | ScalarKind::Int => text
            .trim()
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| invalid()),
        ScalarKind::Float | ScalarKind::Double => text
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid())
            .and_then(|f| float_value(kind, f)),
        _ => Ok(Value::String(text.to_string())),
    }
}

fn encode_elements(element: ScalarKind, value: &Value, collection: &str) -> Result<Vec<DbValue>, TypeError> {
    let items = match value {
        Value::List(items) => items,
        _ => {
            return Err(TypeError::new(
                format!("{}<{}>", collection, element),
                "expected a list",
            ))
        }
    };

    items
        .iter()
        .map(|item| match item {
            Value::Null => Err(TypeError::new(
                format!("{}<{}>", collection, element),
                "collections cannot contain null",
            )),
            item => encode_scalar(element, item),
        })
        .collect()
}

fn encode_entries(key: ScalarKind, item: ScalarKind, value: &Value) -> Result<Vec<(DbValue, DbValue)>, TypeError> {
    let map_type = || format!("map<{}, {}>", key, item);
    let entry_value = |v: &Value| match v {
        Value::Null => Err(TypeError::new(map_type(), "map values cannot be null")),
        v => encode_scalar(item, v),
    };

    match value {
        Value::List(entries) => entries
            .iter()
            .map(|entry| {
                let fields = match entry {
                    Value::Object(fields) => fields,
                    _ => return Err(TypeError::new(map_type(), "expected {key, value} entries")),
                };
                let k = fields
                    .get("key")
                    .filter(|k| !matches!(k, Value::Null))
                    .ok_or_else(|| TypeError::new(map_type(), "entry is missing its key"))?;
                let v = fields.get("value").unwrap_or(&Value::Null);
                Ok((encode_scalar(key, k)?, entry_value(v)?))
            })
            .collect(),
        Value::Object(fields) => fields
            .iter()
            .map(|(name, v)| {
                let k = scalar_from_text(key, name.as_str())?;
                Ok((encode_scalar(key, &k)?, entry_value(v)?))
            })
            .collect(),
        _ => Err(TypeError::new(map_type(), "expected a list of entries or an object")),
    }
}

fn encode_scalar(kind: ScalarKind, value: &Value) -> Result<DbValue, TypeError> {
    let invalid = |detail: String| TypeError::new(kind.cql_name(), detail);

    let encoded = match kind {
        ScalarKind::Text => DbValue::Text(expect_string(kind, value)?.to_string()),
        ScalarKind::Ascii => {
            let s = expect_string(kind, value)?;
            if !s.is_ascii() {
                return Err(invalid("contains non-ASCII characters".to_string()));
            }
            DbValue::Ascii(s.to_string())
        }
        ScalarKind::Boolean => match value {
            Value::Boolean(b) => DbValue::Boolean(*b),
            other => return Err(invalid(format!("expected a boolean, found {}", describe(other)))),
        },
        ScalarKind::TinyInt => DbValue::TinyInt(
            i8::try_from(expect_integer(kind, value)?).map_err(|_| invalid("out of range".to_string()))?,
        ),
        ScalarKind::SmallInt => DbValue::SmallInt(
            i16::try_from(expect_integer(kind, value)?).map_err(|_| invalid("out of range".to_string()))?,
        ),
        ScalarKind::Int => DbValue::Int(
            i32::try_from(expect_integer(kind, value)?).map_err(|_| invalid("out of range".to_string()))?,
        ),
        ScalarKind::BigInt => match value {
            Value::String(s) => DbValue::BigInt(
                s.trim()
                    .parse::<i64>()
                    .map_err(|_| invalid(format!("'{}' is not a 64-bit integer", s)))?,
            ),
            other => DbValue::BigInt(expect_integer(kind, other)?),
        },
        ScalarKind::Float => {
            let f = expect_float(kind, value)?;
            if f.is_finite() && f.abs() > f32::MAX as f64 {
                return Err(invalid("out of range".to_string()));
            }
            DbValue::Float(f as f32)
        }
        ScalarKind::Double => DbValue::Double(expect_float(kind, value)?),
        ScalarKind::Decimal => DbValue::Decimal(match value {
            Value::String(s) => s.parse::<Decimal>().map_err(invalid)?,
            Value::Number(n) => n.to_string().parse::<Decimal>().map_err(invalid)?,
            other => return Err(invalid(format!("expected a decimal string, found {}", describe(other)))),
        }),
        ScalarKind::Varint => DbValue::Varint(match value {
            Value::String(s) => s.parse::<Varint>().map_err(invalid)?,
            Value::Number(n) => n.to_string().parse::<Varint>().map_err(invalid)?,
            other => return Err(invalid(format!("expected an integer string, found {}", describe(other)))),
        }),
        ScalarKind::Blob => DbValue::Blob(
            STANDARD
                .decode(expect_string(kind, value)?)
                .map_err(|e| invalid(format!("invalid base64: {}", e)))?,
        ),
        ScalarKind::Inet => {
            let s = expect_string(kind, value)?;
            DbValue::Inet(
                s.parse::<IpAddr>()
                    .map_err(|_| invalid(format!("'{}' is not an IP address", s)))?,
            )
        }
        ScalarKind::Timestamp => match value {
            Value::String(s) => DbValue::Timestamp(
                DateTime::parse_from_rfc3339(s)
                    .map_err(|e| invalid(format!("'{}' is not an RFC 3339 timestamp: {}", s, e)))?
                    .timestamp_millis(),
            ),
            other => DbValue::Timestamp(expect_integer(kind, other)?),
        },
        ScalarKind::Time => DbValue::Time(parse_time(expect_string(kind, value)?).map_err(invalid)?),
        ScalarKind::Uuid => DbValue::Uuid(parse_uuid(expect_string(kind, value)?).map_err(invalid)?),
        ScalarKind::TimeUuid => {
            let uuid = parse_uuid(expect_string(kind, value)?).map_err(invalid)?;
            if uuid.get_version_num() != 1 {
                return Err(invalid(format!("'{}' is not a version 1 UUID", uuid)));
            }
            DbValue::TimeUuid(uuid)
        }
    };

    Ok(encoded)
}

fn decode_scalar(kind: ScalarKind, value: &DbValue) -> Result<Value, TypeError> {
    let decoded = match (kind, value) {
        (ScalarKind::Text | ScalarKind::Ascii, DbValue::Text(s) | DbValue::Ascii(s)) => {
            Value::String(s.clone())
        }
        (ScalarKind::Boolean, DbValue::Boolean(b)) => Value::Boolean(*b),
        (ScalarKind::TinyInt, DbValue::TinyInt(n)) => Value::Number(i64::from(*n).into()),
        (ScalarKind::SmallInt, DbValue::SmallInt(n)) => Value::Number(i64::from(*n).into()),
        (ScalarKind::Int, DbValue::Int(n)) => Value::Number(i64::from(*n).into()),
        (ScalarKind::BigInt, DbValue::BigInt(n)) => Value::String(n.to_string()),
        // Going through the shortest textual form keeps 1.1f32 as 1.1 instead of 1.100000023841858
        (ScalarKind::Float, DbValue::Float(f)) => {
            let widened = f.to_string().parse::<f64>().unwrap_or(f64::from(*f));
            float_value(kind, widened)?
        }
        (ScalarKind::Double, DbValue::Double(d)) => float_value(kind, *d)?,
        (ScalarKind::Decimal, DbValue::Decimal(d)) => Value::String(d.to_string()),
        (ScalarKind::Varint, DbValue::Varint(v)) => Value::String(v.to_string()),
        (ScalarKind::Blob, DbValue::Blob(bytes)) => Value::String(STANDARD.encode(bytes)),
        (ScalarKind::Inet, DbValue::Inet(ip)) => Value::String(ip.to_string()),
        (ScalarKind::Timestamp, DbValue::Timestamp(millis)) => {
            let datetime = DateTime::<Utc>::from_timestamp_millis(*millis).ok_or_else(|| {
                TypeError::new(kind.cql_name(), format!("{} ms is out of range", millis))
            })?;
            Value::String(datetime.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        (ScalarKind::Time, DbValue::Time(nanos)) => {
            Value::String(format_time(*nanos).map_err(|e| TypeError::new(kind.cql_name(), e))?)
        }
        (ScalarKind::Uuid | ScalarKind::TimeUuid, DbValue::Uuid(uuid) | DbValue::TimeUuid(uuid)) => {
            Value::String(uuid.hyphenated().to_string())
        }
        (kind, other) => {
            return Err(TypeError::new(
                kind.cql_name(),
                format!("unexpected {} value", other.type_name()),
            ))
        }
    };

    Ok(decoded)
}

fn expect_string(kind: ScalarKind, value: &Value) -> Result<&str, TypeError> {
    match value {
        Value::String(s) => Ok(s.as_str()),
        other => Err(TypeError::new(
            kind.cql_name(),
            format!("expected a string, found {}", describe(other)),
        )),
    }
}

fn expect_integer(kind: ScalarKind, value: &Value) -> Result<i64, TypeError> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| {
            TypeError::new(kind.cql_name(), format!("{} is not an integer", n))
        }),
        other => Err(TypeError::new(
            kind.cql_name(),
            format!("expected an integer, found {}", describe(other)),
        )),
    }
}

fn expect_float(kind: ScalarKind, value: &Value) -> Result<f64, TypeError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| TypeError::new(kind.cql_name(), format!("{} is not a number", n))),
        other => Err(TypeError::new(
            kind.cql_name(),
            format!("expected a number, found {}", describe(other)),
        )),
    }
}

fn float_value(kind: ScalarKind, f: f64) -> Result<Value, TypeError> {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| TypeError::new(kind.cql_name(), format!("{} cannot be represented", f)))
}

fn parse_uuid(s: &str) -> Result<Uuid, String> {
    Uuid::parse_str(s.trim()).map_err(|e| format!("'{}' is not a UUID: {}", s, e))
}

fn parse_time(s: &str) -> Result<i64, String> {
    let time = NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
        .map_err(|e| format!("'{}' is not a time of day: {}", s, e))?;
    if time.nanosecond() >= NANOS_PER_SECOND as u32 {
        return Err(format!("'{}' uses a leap second", s));
    }
    Ok(i64::from(time.num_seconds_from_midnight()) * NANOS_PER_SECOND + i64::from(time.nanosecond()))
}

fn format_time(nanos: i64) -> Result<String, String> {
    if !(0..NANOS_PER_DAY).contains(&nanos) {
        return Err(format!("{} ns is outside a day", nanos));
    }
    let time = NaiveTime::from_num_seconds_from_midnight_opt(
        (nanos / NANOS_PER_SECOND) as u32,
        (nanos % NANOS_PER_SECOND) as u32,
    )
    .ok_or_else(|| format!("{} ns is outside a day", nanos))?;
    Ok(time.format("%H:%M:%S%.f").to_string())
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Boolean(_) => "a boolean",
        Value::Binary(_) => "binary data",
        Value::Enum(_) => "an enum",
        Value::List(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::kind::classify;

    fn round_trip(cql_type: &str, value: Value) {
        let kind = classify(cql_type);
        let encoded = encode(&kind, &value).expect("encode");
        let decoded = decode(&kind, encoded.as_ref()).expect("decode");
        assert_eq!(decoded, value, "round trip for {}", cql_type);
    }

    #[test]
    fn test_scalar_round_trips() {
        round_trip("text", Value::String("hello".into()));
        round_trip("ascii", Value::String("plain".into()));
        round_trip("boolean", Value::Boolean(true));
        round_trip("tinyint", Value::Number((-12).into()));
        round_trip("smallint", Value::Number(1234.into()));
        round_trip("int", Value::Number(42.into()));
        round_trip("bigint", Value::String("9007199254740993".into()));
        round_trip("float", Value::Number(serde_json::Number::from_f64(1.5).unwrap()));
        round_trip("double", Value::Number(serde_json::Number::from_f64(2.718).unwrap()));
        round_trip("decimal", Value::String("1.25".into()));
        round_trip("varint", Value::String("-123456789012345678901234567890".into()));
        round_trip("blob", Value::String("AQIDBA==".into()));
        round_trip("inet", Value::String("10.10.150.1".into()));
        round_trip("inet", Value::String("::1".into()));
        round_trip("timestamp", Value::String("2019-12-31T23:59:59.999Z".into()));
        round_trip("time", Value::String("12:30:45.123".into()));
        round_trip("time", Value::String("08:00:00".into()));
        round_trip("uuid", Value::String("d2b99a72-4482-4064-8f96-ca7aba39a1ca".into()));
        round_trip("timeuuid", Value::String("308f185c-7272-11ea-bc55-0242ac130003".into()));
    }

    #[test]
    fn test_null_round_trips_for_every_scalar() {
        for scalar in ScalarKind::ALL {
            let kind = TypeKind::Scalar(scalar);
            assert_eq!(encode(&kind, &Value::Null).unwrap(), None);
            assert_eq!(decode(&kind, None).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_absent_is_not_zero_value() {
        let kind = classify("text");
        assert_eq!(decode(&kind, None).unwrap(), Value::Null);
        assert_eq!(
            decode(&kind, Some(&DbValue::Text(String::new()))).unwrap(),
            Value::String(String::new())
        );
    }

    #[test]
    fn test_collection_round_trips() {
        round_trip(
            "list<int>",
            Value::List(vec![Value::Number(3.into()), Value::Number(1.into()), Value::Number(2.into())]),
        );
        round_trip("set<text>", Value::List(vec![Value::String("a".into())]));

        let mut entry = IndexMap::new();
        entry.insert(Name::new("key"), Value::String("a".into()));
        entry.insert(Name::new("value"), Value::Number(1.into()));
        round_trip("map<text, int>", Value::List(vec![Value::Object(entry)]));
    }

    #[test]
    fn test_map_accepts_object_form() {
        let kind = classify("map<int, text>");
        let mut fields = IndexMap::new();
        fields.insert(Name::new("4"), Value::String("four".into()));
        let encoded = encode(&kind, &Value::Object(fields)).unwrap();
        assert_eq!(
            encoded,
            Some(DbValue::Map(vec![(DbValue::Int(4), DbValue::Text("four".into()))]))
        );
    }

    #[test]
    fn test_decimal_is_not_narrowed_to_float() {
        let kind = classify("decimal");
        let value = Value::String("3.141592653589793238462643383279".into());
        let encoded = encode(&kind, &value).unwrap();
        assert_eq!(decode(&kind, encoded.as_ref()).unwrap(), value);
    }

    #[test]
    fn test_bigint_accepts_numbers() {
        let kind = classify("bigint");
        assert_eq!(
            encode(&kind, &Value::Number(7.into())).unwrap(),
            Some(DbValue::BigInt(7))
        );
    }

    #[test]
    fn test_float_decodes_shortest_form() {
        let kind = classify("float");
        let decoded = decode(&kind, Some(&DbValue::Float(1.1))).unwrap();
        assert_eq!(decoded, Value::Number(serde_json::Number::from_f64(1.1).unwrap()));
    }

    #[test]
    fn test_malformed_text_is_an_error() {
        assert!(encode(&classify("uuid"), &Value::String("not-a-uuid".into())).is_err());
        assert!(encode(&classify("timestamp"), &Value::String("yesterday".into())).is_err());
        assert!(encode(&classify("inet"), &Value::String("300.1.1.1".into())).is_err());
        assert!(encode(&classify("blob"), &Value::String("@@@".into())).is_err());
        assert!(encode(&classify("time"), &Value::String("25:00:00".into())).is_err());
    }

    #[test]
    fn test_timeuuid_requires_version_one() {
        let v4 = Value::String("d2b99a72-4482-4064-8f96-ca7aba39a1ca".into());
        assert!(encode(&classify("timeuuid"), &v4).is_err());
    }

    #[test]
    fn test_integer_ranges() {
        assert!(encode(&classify("tinyint"), &Value::Number(200.into())).is_err());
        assert!(encode(&classify("smallint"), &Value::Number(40000.into())).is_err());
        assert!(encode(&classify("int"), &Value::Number(i64::MAX.into())).is_err());
    }

    #[test]
    fn test_decode_type_mismatch_is_error() {
        let err = decode(&classify("int"), Some(&DbValue::Text("1".into()))).unwrap_err();
        assert_eq!(err.expected, "int");
    }

    #[test]
    fn test_collections_reject_null_elements() {
        let value = Value::List(vec![Value::Null]);
        assert!(encode(&classify("list<int>"), &value).is_err());
    }

    #[test]
    fn test_value_from_text() {
        assert_eq!(
            value_from_text(&classify("int"), "42").unwrap(),
            Value::Number(42.into())
        );
        assert_eq!(
            value_from_text(&classify("text"), "abc").unwrap(),
            Value::String("abc".into())
        );
        assert!(value_from_text(&classify("boolean"), "maybe").is_err());
        assert!(value_from_text(&classify("list<int>"), "1").is_err());
    }
}
