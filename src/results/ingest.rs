//! Upload → store → classify → aggregate → persist.
//!
//! All files are stored before any classifier call, and all classifier calls
//! finish before the result row is written. If any step fails, the files
//! stored by this request are deleted again and no row is left behind.

use std::time::Duration;

use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::repo_types::{NewResult, ResultView};
use super::verdict::aggregate;
use crate::{
    access::{authorize, Action, Caller, Resource},
    auth::password::{hash_password, random_password},
    classifier::Prediction,
    error::AppError,
    mail::{self, templates},
    state::AppState,
    storage::result_image_key,
    store::StoreError,
    users::{
        repo_types::{NewUser, Role, User},
        services::{is_valid_email, normalize_email},
    },
};

#[derive(Debug, Clone)]
pub struct Upload {
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub email: String,
    pub name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub files: Vec<Upload>,
}

#[instrument(skip(state, req), fields(caller = %caller.id, files = req.files.len()))]
pub async fn ingest(state: &AppState, caller: &Caller, req: IngestRequest) -> Result<ResultView, AppError> {
    authorize(
        caller,
        &Resource::Result {
            subject_id: Uuid::nil(),
            author_id: caller.id,
        },
        Action::Create,
    )?;

    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("A valid subject email is required"));
    }
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::validation("Subject name is required"));
    }
    if req.files.is_empty() {
        return Err(AppError::validation("At least one image file is required"));
    }
    if matches!(req.age, Some(a) if a < 0) {
        return Err(AppError::validation("age must not be negative"));
    }

    let subject = resolve_subject(state, &email, &name).await?;

    let keys = store_images(state, subject.id, &req.files).await?;

    let predictions = match classify_all(state, &req.files).await {
        Ok(p) => p,
        Err(e) => {
            remove_images(state, &keys).await;
            return Err(e);
        }
    };
    let verdict = aggregate(&predictions);

    let new = NewResult {
        id: Uuid::new_v4(),
        user_id: subject.id,
        created_by: caller.id,
        age: req.age,
        gender: req.gender.map(|g| g.trim().to_string()).filter(|g| !g.is_empty()),
        result: verdict.map(|v| v.label),
        confidence: verdict.map(|v| v.confidence),
        images: keys.clone(),
    };
    match state.store.insert_result(new).await {
        Ok(view) => {
            info!(result_id = %view.id, subject = %subject.id, label = ?view.result, "result ingested");
            Ok(view)
        }
        Err(e) => {
            remove_images(state, &keys).await;
            Err(e.into())
        }
    }
}

/// Finds the subject's `user` account or opens one with a generated password.
async fn resolve_subject(state: &AppState, email: &str, name: &str) -> Result<User, AppError> {
    if let Some(user) = state.store.find_user_by_email(email, Role::User).await? {
        return Ok(user);
    }

    let password = random_password();
    let new = NewUser {
        name: name.to_string(),
        email: email.to_string(),
        password_hash: hash_password(&password)?,
        role: Role::User,
        otp_code: None,
        otp_expires_at: None,
        otp_verified: true,
    };
    match state.store.insert_user(new).await {
        Ok(user) => {
            info!(user_id = %user.id, "subject account created by staff");
            mail::dispatch(
                state.mailer.clone(),
                templates::subject_account(&user.email, &user.name, &password),
            );
            Ok(user)
        }
        // Lost a race with a concurrent upload for the same subject.
        Err(StoreError::Conflict(_)) => state
            .store
            .find_user_by_email(email, Role::User)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("subject vanished after conflict"))),
        Err(e) => Err(e.into()),
    }
}

async fn store_images(state: &AppState, subject_id: Uuid, files: &[Upload]) -> Result<Vec<String>, AppError> {
    let mut keys = Vec::with_capacity(files.len());
    for (idx, file) in files.iter().enumerate() {
        let key = result_image_key(subject_id, &file.content_type);
        if let Err(e) = state
            .storage
            .put_object(&key, file.bytes.clone(), &file.content_type)
            .await
        {
            warn!(error = %e, file = idx, "image store failed; rolling back batch");
            remove_images(state, &keys).await;
            return Err(AppError::Internal(e.context(format!("store image {idx}"))));
        }
        keys.push(key);
    }
    Ok(keys)
}

async fn classify_all(state: &AppState, files: &[Upload]) -> Result<Vec<Prediction>, AppError> {
    let limit = Duration::from_secs(state.config.classifier.timeout_secs);
    let mut out = Vec::with_capacity(files.len());
    for (idx, file) in files.iter().enumerate() {
        let call = state.classifier.predict(file.bytes.clone(), &file.content_type);
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(p)) => out.push(p),
            Ok(Err(e)) => {
                warn!(error = ?e, file = idx, "classifier failed");
                return Err(AppError::dependency("Image classification failed", format!("{e:#}")));
            }
            Err(_) => {
                warn!(file = idx, timeout_secs = limit.as_secs(), "classifier timed out");
                return Err(AppError::dependency(
                    "Image classification timed out",
                    format!("no answer within {}s", limit.as_secs()),
                ));
            }
        }
    }
    Ok(out)
}

/// Best effort; failures are logged.
pub(crate) async fn remove_images(state: &AppState, keys: &[String]) {
    for key in keys {
        if let Err(e) = state.storage.delete_object(key).await {
            warn!(error = %e, key = %key, "failed to remove stored image");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::repo_types::Verdict;
    use crate::store::Store;
    use crate::testing::Harness;

    fn upload(ct: &str) -> Upload {
        Upload {
            content_type: ct.into(),
            bytes: Bytes::from_static(b"\xff\xd8\xff"),
        }
    }

    fn request(files: usize) -> IngestRequest {
        IngestRequest {
            email: " Subject@Example.com ".into(),
            name: "Sam Subject".into(),
            age: Some(47),
            gender: Some("male".into()),
            files: (0..files).map(|_| upload("image/jpeg")).collect(),
        }
    }

    #[tokio::test]
    async fn creates_subject_and_aggregates_predictions() {
        let h = Harness::new();
        let staff = h.caller(Role::Counselor).await;
        h.classifier.push(Verdict::Cancer, 0.9);
        h.classifier.push(Verdict::NonCancer, 0.7);

        let view = ingest(&h.state, &staff, request(2)).await.unwrap();
        assert_eq!(view.result, Some(Verdict::NonCancer));
        assert_eq!(view.confidence, Some(80.0));
        assert_eq!(view.created_by, staff.id);
        assert_eq!(view.subject_email, "subject@example.com");
        assert_eq!(view.images.len(), 2);
        for key in &view.images {
            assert!(key.starts_with(&format!("results/{}/{}_", view.user_id, view.user_id)));
            assert!(h.storage.contains(key));
        }

        let subject = h.store.find_user(view.user_id).await.unwrap().unwrap();
        assert_eq!(subject.role, Role::User);
        assert!(subject.otp_verified);
        h.mailer.wait_for(1).await;
        assert_eq!(h.mailer.sent()[0].to, ["subject@example.com"]);
    }

    #[tokio::test]
    async fn reuses_existing_subject() {
        let h = Harness::new();
        let staff = h.caller(Role::Admin).await;
        h.classifier.push(Verdict::Cancer, 0.5);
        h.classifier.push(Verdict::Cancer, 0.5);
        let first = ingest(&h.state, &staff, request(1)).await.unwrap();
        let second = ingest(&h.state, &staff, request(1)).await.unwrap();
        assert_eq!(first.user_id, second.user_id);
        assert_eq!(second.result, Some(Verdict::Cancer));
    }

    #[tokio::test]
    async fn failed_store_rolls_back_earlier_files() {
        let h = Harness::new();
        let staff = h.caller(Role::Counselor).await;
        h.storage.fail_on_put(2);

        let err = ingest(&h.state, &staff, request(3)).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(h.store.result_count().await, 0);
        assert_eq!(h.storage.object_count(), 0, "file #1 must be removed");
        assert_eq!(h.storage.put_attempts(), 2, "file #3 is never attempted");
        assert_eq!(h.classifier.calls(), 0, "nothing is classified before all files are stored");
    }

    #[tokio::test]
    async fn classifier_failure_aborts_without_partial_verdict() {
        let h = Harness::new();
        let staff = h.caller(Role::Counselor).await;
        h.classifier.push(Verdict::Cancer, 0.9);
        h.classifier.push_error("model crashed");

        let err = ingest(&h.state, &staff, request(2)).await.unwrap_err();
        assert!(matches!(err, AppError::Dependency { .. }));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
        assert_eq!(h.store.result_count().await, 0);
        assert_eq!(h.storage.object_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_classifier_times_out() {
        let h = Harness::new();
        let staff = h.caller(Role::Counselor).await;
        h.classifier.push_hang();

        let err = ingest(&h.state, &staff, request(1)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(h.storage.object_count(), 0);
    }

    #[tokio::test]
    async fn insert_failure_removes_stored_files() {
        let h = Harness::new();
        let staff = h.caller(Role::Counselor).await;
        h.classifier.push(Verdict::NonCancer, 0.2);
        h.store.fail_next_result_insert();

        assert!(ingest(&h.state, &staff, request(1)).await.is_err());
        assert_eq!(h.store.result_count().await, 0);
        assert_eq!(h.storage.object_count(), 0);
    }

    #[tokio::test]
    async fn users_cannot_ingest() {
        let h = Harness::new();
        let user = h.caller(Role::User).await;
        let err = ingest(&h.state, &user, request(1)).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
        assert_eq!(h.storage.put_attempts(), 0);
    }

    #[tokio::test]
    async fn rejects_missing_files_and_bad_email() {
        let h = Harness::new();
        let staff = h.caller(Role::Counselor).await;
        let err = ingest(&h.state, &staff, request(0)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        let mut bad = request(1);
        bad.email = "nope".into();
        let err = ingest(&h.state, &staff, bad).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
