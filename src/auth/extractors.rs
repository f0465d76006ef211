use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::jwt::{JwtKeys, TokenError};
use crate::{access::Caller, error::AppError, state::AppState};

/// Authenticated caller. The role comes from the stored account, so a
/// demoted or deleted user loses access with their next request.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Caller);

/// Like `AuthUser`, but a request without an `Authorization` header yields
/// `None`. A header that is present must still be valid.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthUser(pub Option<Caller>);

fn bearer(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(header) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| AppError::Authentication("Invalid Authorization header".into()))?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(Some)
        .ok_or_else(|| AppError::Authentication("Invalid Authorization header".into()))
}

async fn resolve(token: &str, state: &AppState) -> Result<Caller, AppError> {
    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify_access(token).map_err(|e| {
        warn!(error = %e, "rejected bearer token");
        match e {
            TokenError::Expired => AppError::Authentication("Token has expired".into()),
            TokenError::Invalid => AppError::Authentication("Invalid token".into()),
        }
    })?;
    let user = state
        .store
        .find_user(claims.sub)
        .await?
        .ok_or_else(|| AppError::Authentication("User not found".into()))?;
    Ok(Caller {
        id: user.id,
        role: user.role,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts)?
            .ok_or_else(|| AppError::Authentication("Missing Authorization header".into()))?;
        Ok(AuthUser(resolve(token, state).await?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer(parts)? {
            Some(token) => Ok(MaybeAuthUser(Some(resolve(token, state).await?))),
            None => Ok(MaybeAuthUser(None)),
        }
    }
}
