//! Role and ownership rules for every read, mutation and list operation.

use uuid::Uuid;

use crate::users::repo_types::Role;

/// The authenticated identity a request acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

/// Ownership fields of the resource an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Result { subject_id: Uuid, author_id: Uuid },
    Profile { owner_id: Uuid },
    Account { id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("Users cannot create results")]
    UsersCannotCreateResults,
    #[error("Users cannot edit or delete results")]
    UsersCannotModifyResults,
    #[error("You can only access results you created")]
    NotAuthor,
    #[error("Access denied")]
    NotOwner,
    #[error("Admin role required")]
    AdminOnly,
}

impl Denial {
    /// Stable code placed in the error envelope's `details.reason`.
    pub fn code(&self) -> &'static str {
        match self {
            Denial::UsersCannotCreateResults => "users_cannot_create_results",
            Denial::UsersCannotModifyResults => "users_cannot_modify_results",
            Denial::NotAuthor => "not_author",
            Denial::NotOwner => "not_owner",
            Denial::AdminOnly => "admin_only",
        }
    }
}

pub fn authorize(caller: &Caller, resource: &Resource, action: Action) -> Result<(), Denial> {
    if caller.role == Role::Admin {
        return Ok(());
    }
    match (*resource, action) {
        (Resource::Result { .. }, Action::Create) => match caller.role {
            Role::Counselor => Ok(()),
            _ => Err(Denial::UsersCannotCreateResults),
        },
        (Resource::Result { author_id, .. }, Action::Update | Action::Delete) => match caller.role {
            Role::User => Err(Denial::UsersCannotModifyResults),
            _ if author_id == caller.id => Ok(()),
            _ => Err(Denial::NotAuthor),
        },
        (Resource::Result { subject_id, author_id }, Action::Read) => match caller.role {
            Role::User if subject_id == caller.id => Ok(()),
            Role::Counselor if author_id == caller.id => Ok(()),
            Role::Counselor => Err(Denial::NotAuthor),
            _ => Err(Denial::NotOwner),
        },
        (Resource::Profile { owner_id }, _) if owner_id == caller.id => Ok(()),
        (Resource::Profile { .. }, _) => Err(Denial::NotOwner),
        (Resource::Account { .. }, Action::Create | Action::Delete) => Err(Denial::AdminOnly),
        (Resource::Account { id }, _) if id == caller.id => Ok(()),
        (Resource::Account { .. }, _) => Err(Denial::NotOwner),
    }
}

/// Only admins may hand out staff roles or change anyone's role.
pub fn authorize_role_grant(caller: Option<&Caller>, role: Role) -> Result<(), Denial> {
    match (caller, role) {
        (_, Role::User) => Ok(()),
        (Some(c), _) if c.role == Role::Admin => Ok(()),
        _ => Err(Denial::AdminOnly),
    }
}

pub fn require_admin(caller: &Caller) -> Result<(), Denial> {
    if caller.role == Role::Admin {
        Ok(())
    } else {
        Err(Denial::AdminOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Profile,
    Result,
}

/// Mandatory row restriction for list queries: `Some((field, id))` keeps only rows
/// whose `field` equals `id`; `None` means unrestricted.
pub fn list_scope(caller: &Caller, entity: EntityKind) -> Option<(&'static str, Uuid)> {
    match (caller.role, entity) {
        (Role::Admin, _) => None,
        (Role::User, EntityKind::Result) => Some(("user_id", caller.id)),
        (Role::Counselor, EntityKind::Result) => Some(("created_by", caller.id)),
        (_, EntityKind::Profile) => Some(("user_id", caller.id)),
        (_, EntityKind::User) => Some(("id", caller.id)),
    }
}
