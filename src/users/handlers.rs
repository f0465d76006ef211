use axum::{extract::State, http::StatusCode, Json};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        AuthResponse, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest,
        RegisterResponse, ResendOtpRequest, UpdateUserRequest, VerifyOtpRequest,
    },
    repo_types::User,
    services,
};
use crate::{
    access::{list_scope, EntityKind},
    auth::{AuthUser, MaybeAuthUser},
    error::{ApiJson, ApiPath, ApiQuery, AppError},
    query::{ListParams, ListPlan, ListRequest, Page},
    state::AppState,
};

#[instrument(skip(state, req), fields(email = %req.email, role = ?req.role))]
pub async fn register(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let resp = services::register(&state, caller.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[instrument(skip(state, req), fields(email = %req.email))]
pub async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyOtpRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(services::verify_otp(&state, req).await?))
}

#[instrument(skip(state, req), fields(email = %req.email))]
pub async fn resend_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResendOtpRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    services::resend_otp(&state, &req.email).await?;
    Ok(Json(MessageResponse {
        message: "New OTP sent successfully.".into(),
    }))
}

#[instrument(skip(state, req), fields(email = %req.email))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(services::login(&state, req).await?))
}

#[instrument(skip(state, req))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(services::refresh(&state, &req.refresh_token).await?))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::find_visible(&state, &caller, caller.id).await?))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Page<User>>, AppError> {
    let req = ListRequest::from_params(params)?;
    let plan = ListPlan::<User>::build(&req, list_scope(&caller, EntityKind::User))?;
    let (rows, total) = state.store.list_users(&plan).await?;
    Ok(Json(Page::new(rows, total, plan.page, plan.limit)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::find_visible(&state, &caller, id).await?))
}

#[instrument(skip(state, req))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::update(&state, &caller, id, req).await?))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete(&state, &caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
