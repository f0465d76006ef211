use axum::{
    extract::{multipart::{MultipartError, MultipartRejection}, Multipart, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::ResultResponse,
    ingest::{self, IngestRequest, Upload},
    repo_types::{ResultPatch, ResultView},
};
use crate::{
    access::{authorize, list_scope, Action, Caller, EntityKind, Resource},
    auth::AuthUser,
    error::{ApiJson, ApiPath, ApiQuery, AppError},
    query::{ListParams, ListPlan, ListRequest, Page},
    state::AppState,
    storage::presign_many,
};

const IMAGE_URL_TTL_SECS: u64 = 30 * 60;

fn bad_multipart(e: MultipartError) -> AppError {
    AppError::Validation {
        message: "Invalid multipart body".into(),
        details: json!({ "error": e.body_text() }),
    }
}

fn resource(view: &ResultView) -> Resource {
    Resource::Result {
        subject_id: view.user_id,
        author_id: view.created_by,
    }
}

/// Authorizes before revealing existence: a missing result is judged as one
/// authored by and about nobody.
async fn load(state: &AppState, caller: &Caller, id: Uuid, action: Action) -> Result<ResultView, AppError> {
    let found = state.store.find_result(id).await?;
    let target = match &found {
        Some(view) => resource(view),
        None => Resource::Result {
            subject_id: Uuid::nil(),
            author_id: Uuid::nil(),
        },
    };
    authorize(caller, &target, action)?;
    found.ok_or_else(|| AppError::NotFound("Result not found".into()))
}

async fn respond(state: &AppState, view: ResultView) -> Result<ResultResponse, AppError> {
    let urls = presign_many(state.storage.as_ref(), &view.images, IMAGE_URL_TTL_SECS).await?;
    Ok(ResultResponse::new(view, urls))
}

async fn read_form(mut multipart: Multipart) -> Result<IngestRequest, AppError> {
    let mut req = IngestRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "files[]" | "file" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                if !bytes.is_empty() {
                    req.files.push(Upload { content_type, bytes });
                }
            }
            "email" => req.email = field.text().await.map_err(bad_multipart)?,
            "name" => req.name = field.text().await.map_err(bad_multipart)?,
            "gender" => req.gender = Some(field.text().await.map_err(bad_multipart)?),
            "age" => {
                let raw = field.text().await.map_err(bad_multipart)?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    let age = raw.parse::<i32>().map_err(|_| AppError::Validation {
                        message: "age must be an integer".into(),
                        details: json!({ "age": raw }),
                    })?;
                    req.age = Some(age);
                }
            }
            _ => {}
        }
    }
    Ok(req)
}

#[instrument(skip(state, multipart))]
pub async fn create_result(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ResultResponse>), AppError> {
    let multipart = multipart.map_err(|r| AppError::Validation {
        message: "Expected a multipart/form-data body".into(),
        details: json!({ "error": r.body_text() }),
    })?;
    let req = read_form(multipart).await?;
    let view = ingest::ingest(&state, &caller, req).await?;
    Ok((StatusCode::CREATED, Json(respond(&state, view).await?)))
}

#[instrument(skip(state))]
pub async fn list_results(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Page<ResultResponse>>, AppError> {
    let req = ListRequest::from_params(params)?;
    let plan = ListPlan::<ResultView>::build(&req, list_scope(&caller, EntityKind::Result))?;
    let (rows, total) = state.store.list_results(&plan).await?;
    let mut data = Vec::with_capacity(rows.len());
    for view in rows {
        data.push(respond(&state, view).await?);
    }
    Ok(Json(Page::new(data, total, plan.page, plan.limit)))
}

#[instrument(skip(state))]
pub async fn get_result(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ResultResponse>, AppError> {
    let view = load(&state, &caller, id, Action::Read).await?;
    Ok(Json(respond(&state, view).await?))
}

#[instrument(skip(state, patch))]
pub async fn update_result(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<ResultPatch>,
) -> Result<Json<ResultResponse>, AppError> {
    let view = load(&state, &caller, id, Action::Update).await?;
    if matches!(patch.confidence, Some(c) if !(0.0..=100.0).contains(&c)) {
        return Err(AppError::validation("confidence must be between 0 and 100"));
    }
    if matches!(patch.age, Some(a) if a < 0) {
        return Err(AppError::validation("age must not be negative"));
    }
    let updated = state
        .store
        .update_result(id, patch)
        .await?
        .ok_or_else(|| AppError::NotFound("Result not found".into()))?;
    info!(result_id = %id, editor = %caller.id, "result updated");
    Ok(Json(respond(&state, updated).await?))
}

#[instrument(skip(state))]
pub async fn delete_result(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    let view = load(&state, &caller, id, Action::Delete).await?;
    if !state.store.delete_result(id).await? {
        return Err(AppError::NotFound("Result not found".into()));
    }
    ingest::remove_images(&state, &view.images).await;
    info!(result_id = %id, by = %caller.id, images = view.images.len(), "result deleted");
    Ok(StatusCode::NO_CONTENT)
}
