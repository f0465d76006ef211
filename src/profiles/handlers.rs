use axum::{extract::State, http::StatusCode, Json};
use tracing::{info, instrument};
use uuid::Uuid;

use super::repo_types::{Profile, ProfileFields};
use crate::{
    access::{authorize, list_scope, Action, Caller, EntityKind, Resource},
    auth::AuthUser,
    error::{ApiJson, ApiPath, ApiQuery, AppError},
    query::{ListParams, ListPlan, ListRequest, Page},
    state::AppState,
};

/// A missing profile is judged as one owned by nobody, so only admins can
/// tell it apart from someone else's.
async fn load(state: &AppState, caller: &Caller, id: Uuid, action: Action) -> Result<Profile, AppError> {
    let found = state.store.find_profile(id).await?;
    let owner_id = found.as_ref().map(|p| p.user_id).unwrap_or(Uuid::nil());
    authorize(caller, &Resource::Profile { owner_id }, action)?;
    found.ok_or_else(|| AppError::NotFound("Profile not found".into()))
}

#[instrument(skip(state, body))]
pub async fn create_profile(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(body): ApiJson<ProfileFields>,
) -> Result<(StatusCode, Json<Profile>), AppError> {
    let profile = state.store.insert_profile(caller.id, body).await?;
    info!(profile_id = %profile.id, user_id = %caller.id, "profile created");
    Ok((StatusCode::CREATED, Json(profile)))
}

#[instrument(skip(state))]
pub async fn my_profile(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(state.store.get_or_create_profile(caller.id).await?))
}

#[instrument(skip(state))]
pub async fn list_profiles(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Page<Profile>>, AppError> {
    let req = ListRequest::from_params(params)?;
    let plan = ListPlan::<Profile>::build(&req, list_scope(&caller, EntityKind::Profile))?;
    let (rows, total) = state.store.list_profiles(&plan).await?;
    Ok(Json(Page::new(rows, total, plan.page, plan.limit)))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(load(&state, &caller, id, Action::Read).await?))
}

#[instrument(skip(state, body))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ProfileFields>,
) -> Result<Json<Profile>, AppError> {
    load(&state, &caller, id, Action::Update).await?;
    let profile = state
        .store
        .update_profile(id, body)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".into()))?;
    Ok(Json(profile))
}

#[instrument(skip(state))]
pub async fn delete_profile(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    load(&state, &caller, id, Action::Delete).await?;
    if !state.store.delete_profile(id).await? {
        return Err(AppError::NotFound("Profile not found".into()));
    }
    info!(profile_id = %id, by = %caller.id, "profile deleted");
    Ok(StatusCode::NO_CONTENT)
}
