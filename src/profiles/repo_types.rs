use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::access::EntityKind;
use crate::query::{sql::SqlListable, Caps, Field, FieldKind, FieldValue, Listable};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Profile record: a one-to-one extension of a user.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[serde(with = "iso_date::option")]
    pub date_of_birth: Option<Date>,
    pub bio: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Editable profile columns. On update, `None` leaves a column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileFields {
    pub phone: Option<String>,
    pub address: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub date_of_birth: Option<Date>,
    pub bio: Option<String>,
}

fn opt_text(v: &Option<String>) -> FieldValue {
    v.clone().map(FieldValue::Text).unwrap_or(FieldValue::Null)
}

static PROFILE_FIELDS: &[Field<Profile>] = &[
    Field { name: "id", column: "profiles.id", kind: FieldKind::Uuid, caps: Caps::ALL, get: |p| FieldValue::Uuid(p.id) },
    Field { name: "user_id", column: "profiles.user_id", kind: FieldKind::Uuid, caps: Caps::ALL, get: |p| FieldValue::Uuid(p.user_id) },
    Field { name: "phone", column: "profiles.phone", kind: FieldKind::Text, caps: Caps::SEARCHABLE, get: |p| opt_text(&p.phone) },
    Field { name: "address", column: "profiles.address", kind: FieldKind::Text, caps: Caps::SEARCHABLE, get: |p| opt_text(&p.address) },
    Field { name: "date_of_birth", column: "profiles.date_of_birth", kind: FieldKind::Date, caps: Caps::ALL, get: |p| p.date_of_birth.map(FieldValue::Date).unwrap_or(FieldValue::Null) },
    Field { name: "bio", column: "profiles.bio", kind: FieldKind::Text, caps: Caps::SEARCHABLE, get: |p| opt_text(&p.bio) },
    Field { name: "created_at", column: "profiles.created_at", kind: FieldKind::Timestamp, caps: Caps::ALL, get: |p| FieldValue::Timestamp(p.created_at) },
];

impl Listable for Profile {
    const KIND: EntityKind = EntityKind::Profile;
    const DEFAULT_ORDER: &'static str = "created_at";

    fn fields() -> &'static [Field<Self>] {
        PROFILE_FIELDS
    }
}

impl SqlListable for Profile {
    const SELECT: &'static str = "SELECT profiles.id, profiles.user_id, profiles.phone, profiles.address, \
         profiles.date_of_birth, profiles.bio, profiles.created_at";
    const FROM: &'static str = "FROM profiles";
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn date_of_birth_is_an_iso_date() {
        let fields: ProfileFields =
            serde_json::from_str(r#"{"phone":"555-0100","date_of_birth":"1990-04-01"}"#).unwrap();
        assert_eq!(fields.date_of_birth, Some(date!(1990 - 04 - 01)));
        assert_eq!(fields.bio, None);

        let profile = Profile {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            phone: fields.phone,
            address: None,
            date_of_birth: fields.date_of_birth,
            bio: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["date_of_birth"], "1990-04-01");
        assert!(json["bio"].is_null());
    }
}
