//! Persistence layer. Handlers and services talk to `dyn Store`; `PgStore` backs
//! production and `MemoryStore` backs tests and local development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::profiles::repo_types::{Profile, ProfileFields};
use crate::query::ListPlan;
use crate::results::repo_types::{NewResult, ResultPatch, ResultView};
use crate::users::repo_types::{NewUser, OtpState, Role, User, UserPatch};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // --- users ---
    /// Fails with `Conflict` when `(email, role)` is already taken.
    async fn insert_user(&self, new: NewUser) -> StoreResult<User>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str, role: Role) -> StoreResult<Option<User>>;
    async fn any_user_with_role(&self, role: Role) -> StoreResult<bool>;
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>>;
    async fn set_otp(&self, id: Uuid, otp: OtpState) -> StoreResult<Option<User>>;
    /// Deletes the user and the results about or by them. Returns the image keys
    /// of the removed results, or `None` when the user does not exist.
    async fn delete_user(&self, id: Uuid) -> StoreResult<Option<Vec<String>>>;
    async fn list_users(&self, plan: &ListPlan<User>) -> StoreResult<(Vec<User>, i64)>;

    // --- profiles ---
    /// Fails with `Conflict` when the user already has a profile.
    async fn insert_profile(&self, user_id: Uuid, fields: ProfileFields) -> StoreResult<Profile>;
    /// Returns the user's profile, creating a blank one if none exists. Safe
    /// under concurrent calls for the same user.
    async fn get_or_create_profile(&self, user_id: Uuid) -> StoreResult<Profile>;
    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>>;
    async fn update_profile(&self, id: Uuid, fields: ProfileFields) -> StoreResult<Option<Profile>>;
    async fn delete_profile(&self, id: Uuid) -> StoreResult<bool>;
    async fn list_profiles(&self, plan: &ListPlan<Profile>) -> StoreResult<(Vec<Profile>, i64)>;

    // --- results ---
    async fn insert_result(&self, new: NewResult) -> StoreResult<ResultView>;
    async fn find_result(&self, id: Uuid) -> StoreResult<Option<ResultView>>;
    async fn update_result(&self, id: Uuid, patch: ResultPatch) -> StoreResult<Option<ResultView>>;
    async fn delete_result(&self, id: Uuid) -> StoreResult<bool>;
    async fn list_results(&self, plan: &ListPlan<ResultView>) -> StoreResult<(Vec<ResultView>, i64)>;
}
