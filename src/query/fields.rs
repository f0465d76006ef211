use std::cmp::Ordering;

use serde_json::Value;
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use uuid::Uuid;

use crate::{access::EntityKind, results::repo_types::Verdict, users::repo_types::Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Uuid,
    Text,
    Int,
    Float,
    Bool,
    Timestamp,
    Date,
    Role,
    Verdict,
}

/// A typed value read from a record or parsed from a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Uuid(Uuid),
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(OffsetDateTime),
    Date(Date),
    Role(Role),
    Verdict(Verdict),
}

impl FieldValue {
    /// Total order used for in-memory sorting. Nulls sort after every value,
    /// matching PostgreSQL's default `NULLS LAST` for ascending order.
    pub fn cmp_for_sort(&self, other: &FieldValue) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Greater,
            (_, Null) => Ordering::Less,
            (Uuid(a), Uuid(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Role(a), Role(b)) => a.cmp(b),
            (Verdict(a), Verdict(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// What a list request may do with a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caps {
    pub filter: bool,
    pub sort: bool,
    pub search: bool,
}

impl Caps {
    pub const ALL: Caps = Caps { filter: true, sort: true, search: false };
    pub const SEARCHABLE: Caps = Caps { filter: true, sort: true, search: true };
    pub const SEARCH_ONLY: Caps = Caps { filter: false, sort: false, search: true };
}

/// One entry of an entity's field allow-list.
pub struct Field<T> {
    pub name: &'static str,
    /// Qualified SQL expression for the column.
    pub column: &'static str,
    pub kind: FieldKind,
    pub caps: Caps,
    pub get: fn(&T) -> FieldValue,
}

/// A record type that can be listed through the query builder.
pub trait Listable: Sized + Send + Sync + 'static {
    const KIND: EntityKind;
    /// Field used when the requested order column is missing or not sortable.
    const DEFAULT_ORDER: &'static str;
    /// Unique field appended to every ordering so pages are stable.
    const KEY: &'static str = "id";

    fn fields() -> &'static [Field<Self>];

    fn field(name: &str) -> Option<&'static Field<Self>> {
        Self::fields().iter().find(|f| f.name == name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("expected {expected} for field `{field}`")]
pub struct ConvertError {
    pub field: &'static str,
    pub expected: &'static str,
}

impl<T> Field<T> {
    /// Converts a JSON filter value into this field's type.
    pub fn convert(&self, value: &Value) -> Result<FieldValue, ConvertError> {
        if value.is_null() {
            return Ok(FieldValue::Null);
        }
        let err = |expected| ConvertError {
            field: self.name,
            expected,
        };
        let converted = match self.kind {
            FieldKind::Uuid => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(FieldValue::Uuid)
                .ok_or_else(|| err("a UUID string"))?,
            FieldKind::Text => match value {
                Value::String(s) => FieldValue::Text(s.clone()),
                Value::Number(n) => FieldValue::Text(n.to_string()),
                _ => return Err(err("a string")),
            },
            FieldKind::Int => value
                .as_i64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                .map(FieldValue::Int)
                .ok_or_else(|| err("an integer"))?,
            FieldKind::Float => value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                .map(FieldValue::Float)
                .ok_or_else(|| err("a number"))?,
            FieldKind::Bool => match value {
                Value::Bool(b) => FieldValue::Bool(*b),
                Value::String(s) if s == "true" => FieldValue::Bool(true),
                Value::String(s) if s == "false" => FieldValue::Bool(false),
                _ => return Err(err("a boolean")),
            },
            FieldKind::Timestamp => value
                .as_str()
                .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
                .map(FieldValue::Timestamp)
                .ok_or_else(|| err("an RFC 3339 timestamp"))?,
            FieldKind::Date => value
                .as_str()
                .and_then(|s| Date::parse(s, format_description!("[year]-[month]-[day]")).ok())
                .map(FieldValue::Date)
                .ok_or_else(|| err("a YYYY-MM-DD date"))?,
            FieldKind::Role => value
                .as_str()
                .and_then(Role::parse)
                .map(FieldValue::Role)
                .ok_or_else(|| err("one of admin, counselor, user"))?,
            FieldKind::Verdict => value
                .as_str()
                .and_then(Verdict::parse)
                .map(FieldValue::Verdict)
                .ok_or_else(|| err("CANCER or NON CANCER"))?,
        };
        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(kind: FieldKind) -> Field<()> {
        Field {
            name: "f",
            column: "t.f",
            kind,
            caps: Caps::ALL,
            get: |_| FieldValue::Null,
        }
    }

    #[test]
    fn converts_typed_values() {
        assert_eq!(field(FieldKind::Int).convert(&json!(42)).unwrap(), FieldValue::Int(42));
        assert_eq!(field(FieldKind::Int).convert(&json!("42")).unwrap(), FieldValue::Int(42));
        assert_eq!(
            field(FieldKind::Bool).convert(&json!("true")).unwrap(),
            FieldValue::Bool(true)
        );
        assert_eq!(
            field(FieldKind::Role).convert(&json!("counselor")).unwrap(),
            FieldValue::Role(Role::Counselor)
        );
        assert_eq!(
            field(FieldKind::Verdict).convert(&json!("NON CANCER")).unwrap(),
            FieldValue::Verdict(Verdict::NonCancer)
        );
        assert_eq!(field(FieldKind::Text).convert(&Value::Null).unwrap(), FieldValue::Null);
    }

    #[test]
    fn rejects_mismatched_types() {
        let err = field(FieldKind::Int).convert(&json!("old")).unwrap_err();
        assert_eq!(err.to_string(), "expected an integer for field `f`");
        assert!(field(FieldKind::Uuid).convert(&json!("nope")).is_err());
        assert!(field(FieldKind::Role).convert(&json!("root")).is_err());
        assert!(field(FieldKind::Text).convert(&json!(["a"])).is_err());
    }

    #[test]
    fn nulls_sort_last() {
        let mut v = vec![FieldValue::Null, FieldValue::Int(3), FieldValue::Int(1)];
        v.sort_by(|a, b| a.cmp_for_sort(b));
        assert_eq!(v, vec![FieldValue::Int(1), FieldValue::Int(3), FieldValue::Null]);
    }
}
