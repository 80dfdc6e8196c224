/// Argument conversion
///
/// Turns protocol values into `QueryRequest`s and `MutationRequest`s. GraphQL
/// and REST share these: REST decodes its JSON into `Value` first. Object keys
/// may be GraphQL field names or column names.

use std::str::FromStr;

use async_graphql::Value;
use indexmap::IndexMap;

use crate::catalog::{Column, Table};
use crate::error::{DataApiError, QueryBuildError, Result};
use crate::query::{Consistency, FilterOp, MutationRequest, PageCursor, Predicate, QueryRequest, SortDirection};

/// Build a list request from the `value`, `filter`, `orderBy` and `options` arguments
pub fn query_request(
    table: &Table,
    value: Option<&Value>,
    filter: Option<&Value>,
    order_by: Option<&Value>,
    options: Option<&Value>,
) -> Result<QueryRequest> {
    let mut request = QueryRequest::new();

    for (column, value) in object_entries(table, value, "value")? {
        request.predicates.push(Predicate::eq(column.name.clone(), value.clone()));
    }

    for (column, operators) in object_entries(table, filter, "filter")? {
        let operators = match operators {
            Value::Object(operators) => operators,
            Value::Null => continue,
            _ => {
                return Err(DataApiError::Validation(format!(
                    "filter for '{}' must be an object of operators",
                    column.field_name
                )))
            }
        };
        for (name, operand) in operators {
            if matches!(operand, Value::Null) {
                continue;
            }
            let op = FilterOp::from_field_name(name.as_str()).ok_or_else(|| {
                QueryBuildError::UnsupportedOperator {
                    column: column.name.clone(),
                    operator: name.to_string(),
                }
            })?;
            request.predicates.push(Predicate::new(column.name.clone(), op, operand.clone()));
        }
    }

    match order_by {
        None | Some(Value::Null) => {}
        Some(Value::List(items)) => {
            for item in items {
                push_order(table, &mut request, item)?;
            }
        }
        Some(single) => push_order(table, &mut request, single)?,
    }

    if let Some(options) = option_object(options, "options")? {
        request.consistency = consistency_option(options, "consistency")?;
        request.limit = int_option(options, "limit")?;
        request.page_size = int_option(options, "pageSize")?;
        if let Some(token) = string_option(options, "pageState")? {
            request.cursor = PageCursor::from_token(&token).map_err(DataApiError::Validation)?;
        }
    }

    Ok(request)
}

/// Build a mutation request from the `value` argument, the condition flag and `options`
pub fn mutation_request(
    table: &Table,
    value: Option<&Value>,
    if_exists: bool,
    if_not_exists: bool,
    options: Option<&Value>,
) -> Result<MutationRequest> {
    let mut values = IndexMap::new();
    for (column, value) in object_entries(table, value, "value")? {
        values.insert(column.name.clone(), value.clone());
    }

    let mut request = MutationRequest::new(values);
    request.if_exists = if_exists;
    request.if_not_exists = if_not_exists;

    if let Some(options) = option_object(options, "options")? {
        request.consistency = consistency_option(options, "consistency")?;
        request.serial_consistency = consistency_option(options, "serialConsistency")?;
        request.ttl = int_option(options, "ttl")?;
    }

    Ok(request)
}

/// Primary-key values keyed by column name
pub fn key_values<'a>(
    table: &Table,
    args: impl IntoIterator<Item = (&'a str, &'a Value)>,
) -> Result<IndexMap<String, Value>> {
    let mut key = IndexMap::new();
    for (name, value) in args {
        let column = find_column(table, name)?;
        key.insert(column.name.clone(), value.clone());
    }
    Ok(key)
}

/// Parse `field_ASC`, `field_DESC`, `column asc`, `column desc` or a bare name
pub fn parse_sort(table: &Table, text: &str) -> Result<(String, SortDirection)> {
    let text = text.trim();
    let split = [text.rsplit_once(' '), text.rsplit_once('_')]
        .into_iter()
        .flatten()
        .find_map(|(name, direction)| match direction.to_ascii_uppercase().as_str() {
            "ASC" => Some((name.trim(), SortDirection::Asc)),
            "DESC" => Some((name.trim(), SortDirection::Desc)),
            _ => None,
        });
    let (name, direction) = split.unwrap_or((text, SortDirection::Asc));
    let column = find_column(table, name)?;
    Ok((column.name.clone(), direction))
}

/// Parse a consistency level from an enum or string value
pub fn parse_consistency(value: &Value) -> Result<Option<Consistency>> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::Enum(name) => name.as_str(),
        Value::String(s) => s.as_str(),
        other => {
            return Err(DataApiError::Validation(format!(
                "consistency must be a level name, got {}",
                other
            )))
        }
    };
    Consistency::from_str(text)
        .map(Some)
        .map_err(DataApiError::Validation)
}

fn push_order(table: &Table, request: &mut QueryRequest, item: &Value) -> Result<()> {
    let text = match item {
        Value::Enum(name) => name.as_str(),
        Value::String(s) => s.as_str(),
        other => {
            return Err(DataApiError::Validation(format!(
                "orderBy entries must be names, got {}",
                other
            )))
        }
    };
    let (column, direction) = parse_sort(table, text)?;
    *request = std::mem::take(request).order(column, direction);
    Ok(())
}

fn object_entries<'t, 'v>(
    table: &'t Table,
    value: Option<&'v Value>,
    argument: &str,
) -> Result<Vec<(&'t Column, &'v Value)>> {
    let object = match option_object(value, argument)? {
        Some(object) => object,
        None => return Ok(Vec::new()),
    };
    object
        .iter()
        .map(|(name, value)| Ok((find_column(table, name.as_str())?, value)))
        .collect()
}

fn option_object<'v>(
    value: Option<&'v Value>,
    argument: &str,
) -> Result<Option<&'v IndexMap<async_graphql::Name, Value>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(object)) => Ok(Some(object)),
        Some(_) => Err(DataApiError::Validation(format!("'{}' must be an object", argument))),
    }
}

fn find_column<'t>(table: &'t Table, name: &str) -> Result<&'t Column> {
    let column = table
        .column_by_field(name)
        .or_else(|| table.column(name))
        .ok_or_else(|| QueryBuildError::UnknownColumn {
            column: name.to_string(),
        })?;
    if !column.is_exposed() {
        return Err(QueryBuildError::UnsupportedColumn {
            column: column.name.clone(),
        }
        .into());
    }
    Ok(column)
}

fn consistency_option(options: &IndexMap<async_graphql::Name, Value>, key: &str) -> Result<Option<Consistency>> {
    match options.get(key) {
        Some(value) => parse_consistency(value),
        None => Ok(None),
    }
}

fn int_option(options: &IndexMap<async_graphql::Name, Value>, key: &str) -> Result<Option<i64>> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| DataApiError::Validation(format!("{} must be an integer", key))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DataApiError::Validation(format!("{} must be an integer", key))),
        Some(_) => Err(DataApiError::Validation(format!("{} must be an integer", key))),
    }
}

fn string_option(options: &IndexMap<async_graphql::Name, Value>, key: &str) -> Result<Option<String>> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DataApiError::Validation(format!("{} must be a string", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::catalog_fixture;

    fn books() -> Table {
        catalog_fixture().table("store", "books").cloned().unwrap()
    }

    fn reviews() -> Table {
        catalog_fixture().table("store", "reviews").cloned().unwrap()
    }

    fn json(text: &str) -> Value {
        Value::from_json(serde_json::from_str(text).unwrap()).unwrap()
    }

    #[test]
    fn test_value_becomes_equality() {
        let request = query_request(&books(), Some(&json(r#"{"title": "abc"}"#)), None, None, None).unwrap();
        assert_eq!(
            request.predicates,
            vec![Predicate::eq("title", Value::String("abc".into()))]
        );
        assert_eq!(request.consistency, None);
        assert_eq!(request.page_size, None);
    }

    #[test]
    fn test_filter_operators() {
        let filter = json(r#"{"pages": {"gt": 10, "lte": 200}, "author": {"in": ["a", "b"]}}"#);
        let request = query_request(&books(), None, Some(&filter), None, None).unwrap();
        let ops: Vec<(&str, FilterOp)> = request
            .predicates
            .iter()
            .map(|p| (p.column.as_str(), p.op))
            .collect();
        assert_eq!(
            ops,
            vec![("pages", FilterOp::Gt), ("pages", FilterOp::Lte), ("author", FilterOp::In)]
        );
    }

    #[test]
    fn test_unknown_operator() {
        let filter = json(r#"{"pages": {"like": 10}}"#);
        let err = query_request(&books(), None, Some(&filter), None, None).unwrap_err();
        assert!(err.to_string().contains("like"));
    }

    #[test]
    fn test_unknown_and_unsupported_fields() {
        let err = query_request(&books(), Some(&json(r#"{"nope": 1}"#)), None, None, None).unwrap_err();
        assert!(err.to_string().contains("nope"));

        let err = query_request(&books(), Some(&json(r#"{"span": "1h"}"#)), None, None, None).unwrap_err();
        assert!(err.to_string().contains("span"));
    }

    #[test]
    fn test_field_names_map_to_columns() {
        let request = query_request(&reviews(), Some(&json(r#"{"bookId": "x"}"#)), None, None, None).unwrap();
        assert_eq!(request.predicates[0].column, "book_id");
    }

    #[test]
    fn test_options() {
        let mut options = IndexMap::new();
        options.insert(async_graphql::Name::new("consistency"), Value::Enum(async_graphql::Name::new("LOCAL_ONE")));
        options.insert(async_graphql::Name::new("limit"), Value::from(3));
        options.insert(async_graphql::Name::new("pageState"), Value::String("AAEC".into()));
        let request = query_request(&books(), None, None, None, Some(&Value::Object(options))).unwrap();

        assert_eq!(request.consistency, Some(Consistency::LocalOne));
        assert_eq!(request.limit, Some(3));
        assert_eq!(request.cursor.as_bytes(), &[0, 1, 2]);
    }

    #[test]
    fn test_bad_page_state() {
        let options = json(r#"{"pageState": "%%%"}"#);
        assert!(matches!(
            query_request(&books(), None, None, None, Some(&options)),
            Err(DataApiError::Validation(_))
        ));
    }

    #[test]
    fn test_order_by_forms() {
        let table = reviews();
        assert_eq!(parse_sort(&table, "posted_DESC").unwrap(), ("posted".to_string(), SortDirection::Desc));
        assert_eq!(parse_sort(&table, "posted asc").unwrap(), ("posted".to_string(), SortDirection::Asc));
        assert_eq!(parse_sort(&table, "posted").unwrap(), ("posted".to_string(), SortDirection::Asc));
        assert_eq!(parse_sort(&table, "book_id").unwrap(), ("book_id".to_string(), SortDirection::Asc));
        assert!(parse_sort(&table, "missing_DESC").is_err());

        let order = Value::List(vec![Value::Enum(async_graphql::Name::new("posted_DESC"))]);
        let request = query_request(&table, None, None, Some(&order), None).unwrap();
        assert_eq!(request.order_by[0].direction, SortDirection::Desc);
    }

    #[test]
    fn test_mutation_request() {
        let value = json(r#"{"title": "abc", "pages": 10}"#);
        let options = json(r#"{"ttl": 60, "consistency": "ONE", "serialConsistency": "LOCAL_SERIAL"}"#);
        let request = mutation_request(&books(), Some(&value), false, true, Some(&options)).unwrap();

        assert_eq!(request.values.len(), 2);
        assert_eq!(request.values["pages"], Value::from(10));
        assert!(request.if_not_exists);
        assert_eq!(request.ttl, Some(60));
        assert_eq!(request.consistency, Some(Consistency::One));
        assert_eq!(request.serial_consistency, Some(Consistency::LocalSerial));
    }
}
