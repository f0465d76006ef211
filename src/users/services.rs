use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dto::{
    AuthResponse, LoginRequest, RegisterRequest, RegisterResponse, UpdateUserRequest,
    VerifyOtpRequest,
};
use super::repo_types::{NewUser, OtpState, Role, User, UserPatch};
use crate::{
    access::{authorize, authorize_role_grant, require_admin, Action, Caller, Resource},
    auth::{
        password::{generate_otp, hash_password, random_password, verify_password, MIN_PASSWORD_LEN},
        JwtKeys, TokenError,
    },
    config::AdminSeed,
    error::AppError,
    mail::{self, templates},
    results::ingest::remove_images,
    state::AppState,
    store::Store,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn checked_email(raw: &str) -> Result<String, AppError> {
    let email = normalize_email(raw);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    Ok(email)
}

fn checked_password(password: Option<&str>) -> Result<&str, AppError> {
    match password {
        Some(p) if p.len() >= MIN_PASSWORD_LEN => Ok(p),
        Some(_) => Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        ))),
        None => Err(AppError::validation("Password is required")),
    }
}

fn fresh_otp(state: &AppState) -> OtpState {
    OtpState {
        code: Some(generate_otp()),
        expires_at: Some(OffsetDateTime::now_utc() + Duration::minutes(state.config.otp_ttl_minutes)),
        verified: false,
    }
}

fn issue_tokens(state: &AppState, user: User, message: &str) -> Result<AuthResponse, AppError> {
    let keys = JwtKeys::from_ref(state);
    Ok(AuthResponse {
        message: message.to_string(),
        access_token: keys.sign_access(&user)?,
        refresh_token: keys.sign_refresh(&user)?,
        user,
    })
}

/// Registration flow per role:
/// - `user`: caller-chosen password, OTP mailed, must verify before login.
/// - `counselor`: generated password mailed, pre-verified.
/// - `admin`: caller-chosen password, pre-verified.
///
/// Staff roles can only be created by an admin.
pub async fn register(
    state: &AppState,
    caller: Option<&Caller>,
    req: RegisterRequest,
) -> Result<RegisterResponse, AppError> {
    let role = req.role.unwrap_or(Role::User);
    authorize_role_grant(caller, role)?;

    let email = checked_email(&req.email)?;
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }

    let (password, otp) = match role {
        Role::User => (
            checked_password(req.password.as_deref())?.to_string(),
            Some(fresh_otp(state)),
        ),
        Role::Counselor => (random_password(), None),
        Role::Admin => (checked_password(req.password.as_deref())?.to_string(), None),
    };

    let new = NewUser {
        name,
        email,
        password_hash: hash_password(&password)?,
        role,
        otp_code: otp.as_ref().and_then(|o| o.code.clone()),
        otp_expires_at: otp.as_ref().and_then(|o| o.expires_at),
        otp_verified: otp.is_none(),
    };
    let user = state.store.insert_user(new).await?;
    info!(user_id = %user.id, role = user.role.as_str(), "user registered");

    let message = match (role, &user.otp_code) {
        (Role::User, Some(code)) => {
            mail::dispatch(
                state.mailer.clone(),
                templates::otp_verification(&user.email, &user.name, code, state.config.otp_ttl_minutes),
            );
            "User registered successfully. Please verify OTP sent to your email."
        }
        (Role::Counselor, _) => {
            mail::dispatch(
                state.mailer.clone(),
                templates::counselor_credentials(&user.email, &user.name, &password),
            );
            "Account created successfully and credentials sent via email."
        }
        _ => "Account created successfully.",
    };

    Ok(RegisterResponse {
        message: message.into(),
        user_id: user.id,
        email: user.email,
        role: user.role,
    })
}

pub async fn verify_otp(state: &AppState, req: VerifyOtpRequest) -> Result<AuthResponse, AppError> {
    let email = normalize_email(&req.email);
    let user = state
        .store
        .find_user_by_email(&email, Role::User)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if user.otp_verified {
        return Err(AppError::validation("User already verified"));
    }
    if user.otp_code.as_deref() != Some(req.otp_code.trim()) {
        return Err(AppError::validation("Invalid OTP code"));
    }
    if matches!(user.otp_expires_at, Some(exp) if exp < OffsetDateTime::now_utc()) {
        return Err(AppError::validation("OTP code has expired"));
    }

    let cleared = OtpState {
        code: None,
        expires_at: None,
        verified: true,
    };
    let user = state
        .store
        .set_otp(user.id, cleared)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    info!(user_id = %user.id, "otp verified");
    issue_tokens(state, user, "OTP verified successfully. Account activated.")
}

pub async fn resend_otp(state: &AppState, email: &str) -> Result<(), AppError> {
    let email = normalize_email(email);
    let user = state
        .store
        .find_user_by_email(&email, Role::User)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if user.otp_verified {
        return Err(AppError::validation("User already verified"));
    }

    let otp = fresh_otp(state);
    let code = otp.code.clone().unwrap_or_default();
    state.store.set_otp(user.id, otp).await?;
    mail::dispatch(
        state.mailer.clone(),
        templates::otp_resend(&user.email, &user.name, &code, state.config.otp_ttl_minutes),
    );
    debug!(user_id = %user.id, "otp regenerated");
    Ok(())
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<AuthResponse, AppError> {
    let email = checked_email(&req.email)?;
    let role = req.role.unwrap_or(Role::User);
    let invalid = || AppError::Authentication("Invalid email or password".into());

    let Some(user) = state.store.find_user_by_email(&email, role).await? else {
        warn!(email = %email, role = role.as_str(), "login unknown account");
        return Err(invalid());
    };
    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid());
    }
    if user.role == Role::User && !user.otp_verified {
        return Err(AppError::Authentication(
            "Account not verified. Please verify your OTP before logging in.".into(),
        ));
    }

    info!(user_id = %user.id, role = user.role.as_str(), "user logged in");
    issue_tokens(state, user, "Login successful")
}

pub async fn refresh(state: &AppState, token: &str) -> Result<AuthResponse, AppError> {
    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify_refresh(token).map_err(|e| match e {
        TokenError::Expired => AppError::Authentication("Refresh token has expired".into()),
        TokenError::Invalid => AppError::Authentication("Invalid refresh token".into()),
    })?;
    let user = state
        .store
        .find_user(claims.sub)
        .await?
        .ok_or_else(|| AppError::Authentication("User not found".into()))?;
    issue_tokens(state, user, "Token refreshed")
}

pub async fn find_visible(state: &AppState, caller: &Caller, id: Uuid) -> Result<User, AppError> {
    authorize(caller, &Resource::Account { id }, Action::Read)?;
    state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub async fn update(
    state: &AppState,
    caller: &Caller,
    id: Uuid,
    req: UpdateUserRequest,
) -> Result<User, AppError> {
    authorize(caller, &Resource::Account { id }, Action::Update)?;
    let current = state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if matches!(req.role, Some(r) if r != current.role) {
        require_admin(caller)?;
    }

    let name = match req.name {
        Some(n) if n.trim().is_empty() => return Err(AppError::validation("Name must not be empty")),
        Some(n) => Some(n.trim().to_string()),
        None => None,
    };
    let email = req.email.as_deref().map(checked_email).transpose()?;
    let password_hash = match req.password.as_deref() {
        Some(p) => Some(hash_password(checked_password(Some(p))?)?),
        None => None,
    };

    let patch = UserPatch {
        name,
        email,
        role: req.role,
        password_hash,
    };
    let user = state
        .store
        .update_user(id, patch)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    info!(user_id = %id, by = %caller.id, "user updated");
    Ok(user)
}

pub async fn delete(state: &AppState, caller: &Caller, id: Uuid) -> Result<(), AppError> {
    authorize(caller, &Resource::Account { id }, Action::Delete)?;
    let images = state
        .store
        .delete_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    remove_images(state, &images).await;
    info!(user_id = %id, by = %caller.id, images = images.len(), "user deleted");
    Ok(())
}

/// Creates the configured admin account unless one with that email exists.
pub async fn seed_admin(store: &dyn Store, seed: &AdminSeed) -> anyhow::Result<()> {
    let email = normalize_email(&seed.email);
    if store.find_user_by_email(&email, Role::Admin).await?.is_some() {
        debug!(email = %email, "default admin already present");
        return Ok(());
    }
    let admin = store
        .insert_user(NewUser {
            name: seed.name.clone(),
            email,
            password_hash: hash_password(&seed.password)?,
            role: Role::Admin,
            otp_code: None,
            otp_expires_at: None,
            otp_verified: true,
        })
        .await?;
    info!(user_id = %admin.id, email = %admin.email, "default admin created");
    Ok(())
}
