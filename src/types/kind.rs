/// CQL type classification
///
/// Native type text from `system_schema.columns` is parsed once into a closed
/// `TypeKind`, which is stored on the column and drives encoding, decoding and
/// the generated GraphQL types.

use std::fmt;

/// Scalar CQL types the API can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarKind {
    Text,
    Ascii,
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    Varint,
    Blob,
    Inet,
    Timestamp,
    Time,
    Uuid,
    TimeUuid,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 17] = [
        ScalarKind::Text,
        ScalarKind::Ascii,
        ScalarKind::Boolean,
        ScalarKind::TinyInt,
        ScalarKind::SmallInt,
        ScalarKind::Int,
        ScalarKind::BigInt,
        ScalarKind::Float,
        ScalarKind::Double,
        ScalarKind::Decimal,
        ScalarKind::Varint,
        ScalarKind::Blob,
        ScalarKind::Inet,
        ScalarKind::Timestamp,
        ScalarKind::Time,
        ScalarKind::Uuid,
        ScalarKind::TimeUuid,
    ];

    /// Look up a scalar by its CQL name (case-insensitive)
    pub fn from_cql(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "text" | "varchar" => ScalarKind::Text,
            "ascii" => ScalarKind::Ascii,
            "boolean" => ScalarKind::Boolean,
            "tinyint" => ScalarKind::TinyInt,
            "smallint" => ScalarKind::SmallInt,
            "int" => ScalarKind::Int,
            "bigint" => ScalarKind::BigInt,
            "float" => ScalarKind::Float,
            "double" => ScalarKind::Double,
            "decimal" => ScalarKind::Decimal,
            "varint" => ScalarKind::Varint,
            "blob" => ScalarKind::Blob,
            "inet" => ScalarKind::Inet,
            "timestamp" => ScalarKind::Timestamp,
            "time" => ScalarKind::Time,
            "uuid" => ScalarKind::Uuid,
            "timeuuid" => ScalarKind::TimeUuid,
            _ => return None,
        };
        Some(kind)
    }

    pub fn cql_name(&self) -> &'static str {
        match self {
            ScalarKind::Text => "text",
            ScalarKind::Ascii => "ascii",
            ScalarKind::Boolean => "boolean",
            ScalarKind::TinyInt => "tinyint",
            ScalarKind::SmallInt => "smallint",
            ScalarKind::Int => "int",
            ScalarKind::BigInt => "bigint",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
            ScalarKind::Decimal => "decimal",
            ScalarKind::Varint => "varint",
            ScalarKind::Blob => "blob",
            ScalarKind::Inet => "inet",
            ScalarKind::Timestamp => "timestamp",
            ScalarKind::Time => "time",
            ScalarKind::Uuid => "uuid",
            ScalarKind::TimeUuid => "timeuuid",
        }
    }

    /// Name of the GraphQL scalar this kind is exposed as
    pub fn graphql_name(&self) -> &'static str {
        match self {
            ScalarKind::Text | ScalarKind::Ascii => "String",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::TinyInt | ScalarKind::SmallInt | ScalarKind::Int => "Int",
            ScalarKind::BigInt => "BigInt",
            ScalarKind::Float | ScalarKind::Double => "Float",
            ScalarKind::Decimal => "Decimal",
            ScalarKind::Varint => "Varint",
            ScalarKind::Blob => "Blob",
            ScalarKind::Inet => "Inet",
            ScalarKind::Timestamp => "Timestamp",
            ScalarKind::Time => "Time",
            ScalarKind::Uuid => "Uuid",
            ScalarKind::TimeUuid => "TimeUuid",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cql_name())
    }
}

/// Classified column type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar(ScalarKind),
    List(ScalarKind),
    Set(ScalarKind),
    Map(ScalarKind, ScalarKind),
    /// Kept for diagnostics; the payload is the declared CQL type
    Unsupported(String),
}

impl TypeKind {
    pub fn is_supported(&self) -> bool {
        !matches!(self, TypeKind::Unsupported(_))
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, TypeKind::List(_) | TypeKind::Set(_) | TypeKind::Map(_, _))
    }

    pub fn scalar(&self) -> Option<ScalarKind> {
        match self {
            TypeKind::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Canonical CQL text for DDL statements
    pub fn cql_type(&self) -> String {
        match self {
            TypeKind::Scalar(kind) => kind.cql_name().to_string(),
            TypeKind::List(kind) => format!("list<{}>", kind),
            TypeKind::Set(kind) => format!("set<{}>", kind),
            TypeKind::Map(key, value) => format!("map<{}, {}>", key, value),
            TypeKind::Unsupported(text) => text.clone(),
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cql_type())
    }
}

/// Parsed shape of a CQL type expression
#[derive(Debug, PartialEq)]
enum CqlTypeExpr {
    Name(String),
    Generic(String, Vec<CqlTypeExpr>),
}

/// Classify a declared CQL type
///
/// `frozen<...>` wrappers are transparent. Collections are supported only over
/// scalars; tuples, user-defined types, `duration`, `date`, `counter` and nested
/// collections classify as `Unsupported`.
pub fn classify(native: &str) -> TypeKind {
    let unsupported = || TypeKind::Unsupported(native.trim().to_string());

    let expr = match parse_type(native) {
        Some(expr) => expr,
        None => return unsupported(),
    };

    match unfreeze(&expr) {
        CqlTypeExpr::Name(name) => ScalarKind::from_cql(name)
            .map(TypeKind::Scalar)
            .unwrap_or_else(unsupported),
        CqlTypeExpr::Generic(name, args) => {
            let scalars: Option<Vec<ScalarKind>> = args
                .iter()
                .map(|arg| match unfreeze(arg) {
                    CqlTypeExpr::Name(inner) => ScalarKind::from_cql(inner),
                    CqlTypeExpr::Generic(_, _) => None,
                })
                .collect();

            match (name.as_str(), scalars.as_deref()) {
                ("list", Some([element])) => TypeKind::List(*element),
                ("set", Some([element])) => TypeKind::Set(*element),
                ("map", Some([key, value])) => TypeKind::Map(*key, *value),
                _ => unsupported(),
            }
        }
    }
}

fn unfreeze(expr: &CqlTypeExpr) -> &CqlTypeExpr {
    match expr {
        CqlTypeExpr::Generic(name, args) if name == "frozen" && args.len() == 1 => unfreeze(&args[0]),
        other => other,
    }
}

fn parse_type(text: &str) -> Option<CqlTypeExpr> {
    let mut chars = text.trim().chars().peekable();
    let expr = parse_expr(&mut chars)?;
    skip_whitespace(&mut chars);
    if chars.peek().is_some() {
        return None;
    }
    Some(expr)
}

fn parse_expr(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<CqlTypeExpr> {
    skip_whitespace(chars);
    let mut name = String::new();

    if chars.peek() == Some(&'"') {
        // Quoted identifiers only appear for user-defined types; keep them verbatim
        chars.next();
        name.push('"');
        loop {
            let c = chars.next()?;
            name.push(c);
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    name.push(chars.next()?);
                    continue;
                }
                break;
            }
        }
    } else {
        while let Some(&c) = chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == '\'' {
                name.push(c.to_ascii_lowercase());
                chars.next();
            } else {
                break;
            }
        }
    }

    if name.is_empty() {
        return None;
    }

    skip_whitespace(chars);
    if chars.peek() != Some(&'<') {
        return Some(CqlTypeExpr::Name(name));
    }
    chars.next();

    let mut args = Vec::new();
    loop {
        args.push(parse_expr(chars)?);
        skip_whitespace(chars);
        match chars.next()? {
            ',' => continue,
            '>' => break,
            _ => return None,
        }
    }

    Some(CqlTypeExpr::Generic(name, args))
}

fn skip_whitespace(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while chars.peek().map_or(false, |c| c.is_whitespace()) {
        chars.next();
    }
}
