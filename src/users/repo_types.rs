use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::access::EntityKind;
use crate::query::{sql::SqlListable, Caps, Field, FieldKind, FieldValue, Listable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Admin,
    Counselor,
    User,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "counselor" => Some(Role::Counselor),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Counselor => "counselor",
            Role::User => "user",
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub role: Role,
    #[serde(skip_serializing)]
    pub otp_code: Option<String>,
    #[serde(skip_serializing)]
    pub otp_expires_at: Option<OffsetDateTime>,
    pub otp_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub otp_code: Option<String>,
    pub otp_expires_at: Option<OffsetDateTime>,
    pub otp_verified: bool,
}

/// Partial update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OtpState {
    pub code: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
    pub verified: bool,
}

// Secret columns are deliberately absent from this table.
static USER_FIELDS: &[Field<User>] = &[
    Field { name: "id", column: "users.id", kind: FieldKind::Uuid, caps: Caps::ALL, get: |u| FieldValue::Uuid(u.id) },
    Field { name: "name", column: "users.name", kind: FieldKind::Text, caps: Caps::SEARCHABLE, get: |u| FieldValue::Text(u.name.clone()) },
    Field { name: "email", column: "users.email", kind: FieldKind::Text, caps: Caps::SEARCHABLE, get: |u| FieldValue::Text(u.email.clone()) },
    Field { name: "role", column: "users.role", kind: FieldKind::Role, caps: Caps::ALL, get: |u| FieldValue::Role(u.role) },
    Field { name: "otp_verified", column: "users.otp_verified", kind: FieldKind::Bool, caps: Caps::ALL, get: |u| FieldValue::Bool(u.otp_verified) },
    Field { name: "created_at", column: "users.created_at", kind: FieldKind::Timestamp, caps: Caps::ALL, get: |u| FieldValue::Timestamp(u.created_at) },
];

impl Listable for User {
    const KIND: EntityKind = EntityKind::User;
    const DEFAULT_ORDER: &'static str = "created_at";

    fn fields() -> &'static [Field<Self>] {
        USER_FIELDS
    }
}

impl SqlListable for User {
    const SELECT: &'static str = "SELECT users.id, users.name, users.email, users.password_hash, users.role, \
         users.otp_code, users.otp_expires_at, users.otp_verified, users.created_at";
    const FROM: &'static str = "FROM users";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_not_serialized_or_listable() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            role: Role::User,
            otp_code: Some("123456".into()),
            otp_expires_at: None,
            otp_verified: false,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("otp_code").is_none());
        assert_eq!(json["role"], "user");

        for secret in ["password_hash", "password", "otp_code", "otp_expires_at"] {
            assert!(User::field(secret).is_none(), "{secret} must not be listable");
        }
    }

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::Admin, Role::Counselor, Role::User] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }
}
