use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::query::Consistency;
use crate::types::{DbValue, TypeKind};

/// Opaque driver paging state; empty means the first page
///
/// The protocol form is the base64 of the bytes. Nothing in the crate looks
/// inside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor(Vec<u8>);

impl PageCursor {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Token handed to clients; `None` once results are exhausted
    pub fn to_token(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(STANDARD.encode(&self.0))
        }
    }

    pub fn from_token(token: &str) -> Result<Self, String> {
        if token.is_empty() {
            return Ok(Self::default());
        }
        STANDARD
            .decode(token)
            .map(Self)
            .map_err(|e| format!("invalid page state: {}", e))
    }
}

/// A column the gateway decodes from each result row
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumn {
    pub name: String,
    pub kind: TypeKind,
}

/// Fully built statement, ready for the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub statement: String,
    pub values: Vec<Option<DbValue>>,
    pub consistency: Consistency,
    pub serial_consistency: Option<Consistency>,
    pub page_size: i32,
    pub cursor: PageCursor,
    pub projection: Vec<ProjectedColumn>,
    /// Executes as the caller's user or role when identity scoping is on
    pub identity_scoped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_token_is_byte_exact() {
        let cursor = PageCursor::new(vec![0, 1, 2, 250, 255]);
        let token = cursor.to_token().unwrap();
        assert_eq!(PageCursor::from_token(&token).unwrap(), cursor);
    }

    #[test]
    fn test_empty_cursor() {
        assert_eq!(PageCursor::default().to_token(), None);
        assert!(PageCursor::from_token("").unwrap().is_empty());
        assert!(PageCursor::from_token("%%%").is_err());
    }
}
