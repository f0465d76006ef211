use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::access::EntityKind;
use crate::query::{sql::SqlListable, Caps, Field, FieldKind, FieldValue, Listable};

/// Classification label of a single image or of a whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "verdict")]
pub enum Verdict {
    #[serde(rename = "CANCER")]
    #[sqlx(rename = "CANCER")]
    Cancer,
    #[serde(rename = "NON CANCER")]
    #[sqlx(rename = "NON CANCER")]
    NonCancer,
}

impl Verdict {
    pub fn parse(s: &str) -> Option<Verdict> {
        match s {
            "CANCER" => Some(Verdict::Cancer),
            "NON CANCER" => Some(Verdict::NonCancer),
            _ => None,
        }
    }
}

/// A result row joined with its subject's name and email.
#[derive(Debug, Clone, FromRow)]
pub struct ResultView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_by: Uuid,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub result: Option<Verdict>,
    pub confidence: Option<f64>,
    pub images: Vec<String>,
    pub date: OffsetDateTime,
    pub subject_name: String,
    pub subject_email: String,
}

#[derive(Debug, Clone)]
pub struct NewResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_by: Uuid,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub result: Option<Verdict>,
    pub confidence: Option<f64>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultPatch {
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub result: Option<Verdict>,
    pub confidence: Option<f64>,
}

fn opt_text(v: &Option<String>) -> FieldValue {
    v.clone().map(FieldValue::Text).unwrap_or(FieldValue::Null)
}

// Search order: subject email, subject name, gender.
static RESULT_FIELDS: &[Field<ResultView>] = &[
    Field { name: "id", column: "r.id", kind: FieldKind::Uuid, caps: Caps::ALL, get: |r| FieldValue::Uuid(r.id) },
    Field { name: "user_id", column: "r.user_id", kind: FieldKind::Uuid, caps: Caps::ALL, get: |r| FieldValue::Uuid(r.user_id) },
    Field { name: "created_by", column: "r.created_by", kind: FieldKind::Uuid, caps: Caps::ALL, get: |r| FieldValue::Uuid(r.created_by) },
    Field { name: "subject_email", column: "u.email", kind: FieldKind::Text, caps: Caps::SEARCH_ONLY, get: |r| FieldValue::Text(r.subject_email.clone()) },
    Field { name: "subject_name", column: "u.name", kind: FieldKind::Text, caps: Caps::SEARCH_ONLY, get: |r| FieldValue::Text(r.subject_name.clone()) },
    Field { name: "age", column: "r.age", kind: FieldKind::Int, caps: Caps::ALL, get: |r| r.age.map(|a| FieldValue::Int(a as i64)).unwrap_or(FieldValue::Null) },
    Field { name: "gender", column: "r.gender", kind: FieldKind::Text, caps: Caps::SEARCHABLE, get: |r| opt_text(&r.gender) },
    Field { name: "result", column: "r.result", kind: FieldKind::Verdict, caps: Caps::ALL, get: |r| r.result.map(FieldValue::Verdict).unwrap_or(FieldValue::Null) },
    Field { name: "confidence", column: "r.confidence", kind: FieldKind::Float, caps: Caps::ALL, get: |r| r.confidence.map(FieldValue::Float).unwrap_or(FieldValue::Null) },
    Field { name: "date", column: "r.date", kind: FieldKind::Timestamp, caps: Caps::ALL, get: |r| FieldValue::Timestamp(r.date) },
];

impl Listable for ResultView {
    const KIND: EntityKind = EntityKind::Result;
    const DEFAULT_ORDER: &'static str = "date";

    fn fields() -> &'static [Field<Self>] {
        RESULT_FIELDS
    }
}

impl SqlListable for ResultView {
    const SELECT: &'static str = "SELECT r.id, r.user_id, r.created_by, r.age, r.gender, r.result, \
         r.confidence, r.images, r.date, u.name AS subject_name, u.email AS subject_email";
    const FROM: &'static str = "FROM results r JOIN users u ON u.id = r.user_id";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_wire_labels() {
        assert_eq!(serde_json::to_value(Verdict::NonCancer).unwrap(), "NON CANCER");
        assert_eq!(serde_json::to_value(Verdict::Cancer).unwrap(), "CANCER");
        let v: Verdict = serde_json::from_str("\"NON CANCER\"").unwrap();
        assert_eq!(v, Verdict::NonCancer);
        assert_eq!(Verdict::parse("cancer"), None);
    }

    #[test]
    fn subject_columns_are_search_only() {
        let email = ResultView::field("subject_email").unwrap();
        assert!(email.caps.search && !email.caps.filter && !email.caps.sort);
        let searchable: Vec<_> = ResultView::fields()
            .iter()
            .filter(|f| f.caps.search)
            .map(|f| f.name)
            .collect();
        assert_eq!(searchable, ["subject_email", "subject_name", "gender"]);
    }
}
