use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::profiles::repo_types::{Profile, ProfileFields};
use crate::query::ListPlan;
use crate::results::repo_types::{NewResult, ResultPatch, ResultView, Verdict};
use crate::users::repo_types::{NewUser, OtpState, Role, User, UserPatch};

#[derive(Debug, Clone)]
struct ResultRow {
    id: Uuid,
    user_id: Uuid,
    created_by: Uuid,
    age: Option<i32>,
    gender: Option<String>,
    result: Option<Verdict>,
    confidence: Option<f64>,
    images: Vec<String>,
    date: OffsetDateTime,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, Profile>,
    results: HashMap<Uuid, ResultRow>,
}

impl Tables {
    fn email_taken(&self, email: &str, role: Role, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && u.role == role && Some(u.id) != except)
    }

    /// Inner join with the subject, like the SQL view.
    fn view(&self, row: &ResultRow) -> Option<ResultView> {
        let subject = self.users.get(&row.user_id)?;
        Some(ResultView {
            id: row.id,
            user_id: row.user_id,
            created_by: row.created_by,
            age: row.age,
            gender: row.gender.clone(),
            result: row.result,
            confidence: row.confidence,
            images: row.images.clone(),
            date: row.date,
            subject_name: subject.name.clone(),
            subject_email: subject.email.clone(),
        })
    }
}

/// In-process store with the same uniqueness and list semantics as `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_result_insert: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `insert_result` fail as if the database rejected the commit.
    pub fn fail_next_result_insert(&self) {
        self.fail_result_insert.store(true, Ordering::SeqCst);
    }

    pub async fn result_count(&self) -> usize {
        self.tables.lock().await.results.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        let mut t = self.tables.lock().await;
        if t.email_taken(&new.email, new.role, None) {
            return Err(StoreError::Conflict(
                "Email already registered for this role".into(),
            ));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            otp_code: new.otp_code,
            otp_expires_at: new.otp_expires_at,
            otp_verified: new.otp_verified,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str, role: Role) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t
            .users
            .values()
            .find(|u| u.email == email && u.role == role)
            .cloned())
    }

    async fn any_user_with_role(&self, role: Role) -> StoreResult<bool> {
        Ok(self.tables.lock().await.users.values().any(|u| u.role == role))
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>> {
        let mut t = self.tables.lock().await;
        let Some(current) = t.users.get(&id).cloned() else {
            return Ok(None);
        };
        let email = patch.email.unwrap_or(current.email);
        let role = patch.role.unwrap_or(current.role);
        if t.email_taken(&email, role, Some(id)) {
            return Err(StoreError::Conflict(
                "Email already registered for this role".into(),
            ));
        }
        let updated = User {
            name: patch.name.unwrap_or(current.name),
            email,
            role,
            password_hash: patch.password_hash.unwrap_or(current.password_hash),
            ..current
        };
        t.users.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn set_otp(&self, id: Uuid, otp: OtpState) -> StoreResult<Option<User>> {
        let mut t = self.tables.lock().await;
        Ok(t.users.get_mut(&id).map(|u| {
            u.otp_code = otp.code;
            u.otp_expires_at = otp.expires_at;
            u.otp_verified = otp.verified;
            u.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<Option<Vec<String>>> {
        let mut t = self.tables.lock().await;
        if t.users.remove(&id).is_none() {
            return Ok(None);
        }
        t.profiles.retain(|_, p| p.user_id != id);
        let mut images = Vec::new();
        t.results.retain(|_, r| {
            let linked = r.user_id == id || r.created_by == id;
            if linked {
                images.extend(r.images.iter().cloned());
            }
            !linked
        });
        Ok(Some(images))
    }

    async fn list_users(&self, plan: &ListPlan<User>) -> StoreResult<(Vec<User>, i64)> {
        let t = self.tables.lock().await;
        Ok(plan.apply(t.users.values().cloned()))
    }

    async fn insert_profile(&self, user_id: Uuid, fields: ProfileFields) -> StoreResult<Profile> {
        let mut t = self.tables.lock().await;
        if t.profiles.values().any(|p| p.user_id == user_id) {
            return Err(StoreError::Conflict(
                "Profile already exists for this user".into(),
            ));
        }
        let profile = Profile {
            id: Uuid::new_v4(),
            user_id,
            phone: fields.phone,
            address: fields.address,
            date_of_birth: fields.date_of_birth,
            bio: fields.bio,
            created_at: OffsetDateTime::now_utc(),
        };
        t.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn get_or_create_profile(&self, user_id: Uuid) -> StoreResult<Profile> {
        let mut t = self.tables.lock().await;
        if let Some(p) = t.profiles.values().find(|p| p.user_id == user_id) {
            return Ok(p.clone());
        }
        let profile = Profile {
            id: Uuid::new_v4(),
            user_id,
            phone: None,
            address: None,
            date_of_birth: None,
            bio: None,
            created_at: OffsetDateTime::now_utc(),
        };
        t.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.tables.lock().await.profiles.get(&id).cloned())
    }

    async fn update_profile(&self, id: Uuid, fields: ProfileFields) -> StoreResult<Option<Profile>> {
        let mut t = self.tables.lock().await;
        Ok(t.profiles.get_mut(&id).map(|p| {
            if fields.phone.is_some() {
                p.phone = fields.phone;
            }
            if fields.address.is_some() {
                p.address = fields.address;
            }
            if fields.date_of_birth.is_some() {
                p.date_of_birth = fields.date_of_birth;
            }
            if fields.bio.is_some() {
                p.bio = fields.bio;
            }
            p.clone()
        }))
    }

    async fn delete_profile(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.lock().await.profiles.remove(&id).is_some())
    }

    async fn list_profiles(&self, plan: &ListPlan<Profile>) -> StoreResult<(Vec<Profile>, i64)> {
        let t = self.tables.lock().await;
        Ok(plan.apply(t.profiles.values().cloned()))
    }

    async fn insert_result(&self, new: NewResult) -> StoreResult<ResultView> {
        if self.fail_result_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&new.user_id) || !t.users.contains_key(&new.created_by) {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        let row = ResultRow {
            id: new.id,
            user_id: new.user_id,
            created_by: new.created_by,
            age: new.age,
            gender: new.gender,
            result: new.result,
            confidence: new.confidence,
            images: new.images,
            date: OffsetDateTime::now_utc(),
        };
        let view = t.view(&row).ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        t.results.insert(row.id, row);
        Ok(view)
    }

    async fn find_result(&self, id: Uuid) -> StoreResult<Option<ResultView>> {
        let t = self.tables.lock().await;
        Ok(t.results.get(&id).and_then(|r| t.view(r)))
    }

    async fn update_result(&self, id: Uuid, patch: ResultPatch) -> StoreResult<Option<ResultView>> {
        let mut t = self.tables.lock().await;
        let Some(row) = t.results.get_mut(&id) else {
            return Ok(None);
        };
        if patch.age.is_some() {
            row.age = patch.age;
        }
        if patch.gender.is_some() {
            row.gender = patch.gender;
        }
        if patch.result.is_some() {
            row.result = patch.result;
        }
        if patch.confidence.is_some() {
            row.confidence = patch.confidence;
        }
        let row = row.clone();
        Ok(t.view(&row))
    }

    async fn delete_result(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.lock().await.results.remove(&id).is_some())
    }

    async fn list_results(
        &self,
        plan: &ListPlan<ResultView>,
    ) -> StoreResult<(Vec<ResultView>, i64)> {
        let t = self.tables.lock().await;
        let views: Vec<ResultView> = t.results.values().filter_map(|r| t.view(r)).collect();
        Ok(plan.apply(views))
    }
}
