use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::profiles::repo_types::{Profile, ProfileFields};
use crate::query::{sql::SqlListable, ListPlan};
use crate::results::repo_types::{NewResult, ResultPatch, ResultView};
use crate::users::repo_types::{NewUser, OtpState, Role, User, UserPatch};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, otp_code, otp_expires_at, otp_verified, created_at";
const PROFILE_COLUMNS: &str = "id, user_id, phone, address, date_of_birth, bio, created_at";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    async fn list<T>(&self, plan: &ListPlan<T>) -> StoreResult<(Vec<T>, i64)>
    where
        T: SqlListable + for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Unpin,
    {
        let (total,) = plan
            .count_query()
            .build_query_as::<(i64,)>()
            .fetch_one(&self.db)
            .await?;
        let rows = plan
            .page_query()
            .build_query_as::<T>()
            .fetch_all(&self.db)
            .await?;
        Ok((rows, total))
    }
}

/// Maps unique violations to `StoreError::Conflict`.
fn conflict(e: sqlx::Error, msg: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(msg.into()),
        _ => StoreError::Database(e),
    }
}

async fn select_result<'e, E>(exec: E, id: Uuid) -> StoreResult<Option<ResultView>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let sql = format!("{} {} WHERE r.id = $1", ResultView::SELECT, ResultView::FROM);
    let row = sqlx::query_as::<_, ResultView>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(row)
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, otp_code, otp_expires_at, otp_verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.role)
            .bind(&new.otp_code)
            .bind(new.otp_expires_at)
            .bind(new.otp_verified)
            .fetch_one(&self.db)
            .await
            .map_err(|e| conflict(e, "Email already registered for this role"))
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str, role: Role) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND role = $2");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(role)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn any_user_with_role(&self, role: Role) -> StoreResult<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE role = $1)")
                .bind(role)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   email = COALESCE($3, email),
                   role = COALESCE($4, role),
                   password_hash = COALESCE($5, password_hash)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(patch.name)
            .bind(patch.email)
            .bind(patch.role)
            .bind(patch.password_hash)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| conflict(e, "Email already registered for this role"))
    }

    async fn set_otp(&self, id: Uuid, otp: OtpState) -> StoreResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET otp_code = $2, otp_expires_at = $3, otp_verified = $4
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(otp.code)
            .bind(otp.expires_at)
            .bind(otp.verified)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<Option<Vec<String>>> {
        let mut tx = self.db.begin().await?;
        let images: Vec<(Vec<String>,)> = sqlx::query_as(
            "SELECT images FROM results WHERE user_id = $1 OR created_by = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(images.into_iter().flat_map(|(keys,)| keys).collect()))
    }

    async fn list_users(&self, plan: &ListPlan<User>) -> StoreResult<(Vec<User>, i64)> {
        self.list(plan).await
    }

    async fn insert_profile(&self, user_id: Uuid, fields: ProfileFields) -> StoreResult<Profile> {
        let sql = format!(
            r#"
            INSERT INTO profiles (id, user_id, phone, address, date_of_birth, bio)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PROFILE_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Profile>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(fields.phone)
            .bind(fields.address)
            .bind(fields.date_of_birth)
            .bind(fields.bio)
            .fetch_one(&self.db)
            .await
            .map_err(|e| conflict(e, "Profile already exists for this user"))
    }

    async fn get_or_create_profile(&self, user_id: Uuid) -> StoreResult<Profile> {
        sqlx::query(
            "INSERT INTO profiles (id, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .execute(&self.db)
        .await?;
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1");
        let profile = sqlx::query_as::<_, Profile>(&sql)
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;
        Ok(profile)
    }

    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        let profile = sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(profile)
    }

    async fn update_profile(&self, id: Uuid, fields: ProfileFields) -> StoreResult<Option<Profile>> {
        let sql = format!(
            r#"
            UPDATE profiles
               SET phone = COALESCE($2, phone),
                   address = COALESCE($3, address),
                   date_of_birth = COALESCE($4, date_of_birth),
                   bio = COALESCE($5, bio)
             WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        );
        let profile = sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .bind(fields.phone)
            .bind(fields.address)
            .bind(fields.date_of_birth)
            .bind(fields.bio)
            .fetch_optional(&self.db)
            .await?;
        Ok(profile)
    }

    async fn delete_profile(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_profiles(&self, plan: &ListPlan<Profile>) -> StoreResult<(Vec<Profile>, i64)> {
        self.list(plan).await
    }

    async fn insert_result(&self, new: NewResult) -> StoreResult<ResultView> {
        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO results (id, user_id, created_by, age, gender, result, confidence, images)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(new.id)
        .bind(new.user_id)
        .bind(new.created_by)
        .bind(new.age)
        .bind(&new.gender)
        .bind(new.result)
        .bind(new.confidence)
        .bind(&new.images)
        .execute(&mut *tx)
        .await?;
        let view = select_result(&mut *tx, new.id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        tx.commit().await?;
        Ok(view)
    }

    async fn find_result(&self, id: Uuid) -> StoreResult<Option<ResultView>> {
        select_result(&self.db, id).await
    }

    async fn update_result(&self, id: Uuid, patch: ResultPatch) -> StoreResult<Option<ResultView>> {
        let updated = sqlx::query(
            r#"
            UPDATE results
               SET age = COALESCE($2, age),
                   gender = COALESCE($3, gender),
                   result = COALESCE($4, result),
                   confidence = COALESCE($5, confidence)
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(patch.age)
        .bind(patch.gender)
        .bind(patch.result)
        .bind(patch.confidence)
        .execute(&self.db)
        .await?
        .rows_affected();
        if updated == 0 {
            return Ok(None);
        }
        select_result(&self.db, id).await
    }

    async fn delete_result(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM results WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_results(
        &self,
        plan: &ListPlan<ResultView>,
    ) -> StoreResult<(Vec<ResultView>, i64)> {
        self.list(plan).await
    }
}
