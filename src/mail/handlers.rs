use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::{Email, MailError};
use crate::{
    access::require_admin,
    auth::AuthUser,
    error::{ApiJson, AppError},
    state::AppState,
};

#[instrument(skip(state, email))]
pub async fn send_mail(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(email): ApiJson<Email>,
) -> Result<Json<Value>, AppError> {
    require_admin(&caller)?;
    if email.to.is_empty() {
        return Err(AppError::validation("`to` must contain at least one address"));
    }
    let recipients = email.envelope_recipients();
    state
        .mailer
        .send(email)
        .await
        .map_err(|e| match e {
            MailError::NoRecipients | MailError::Address(_) => AppError::Validation {
                message: e.to_string(),
                details: json!({}),
            },
            MailError::Delivery(_) => AppError::dependency("Failed to send email", e),
        })?;
    info!(sender = %caller.id, count = recipients.len(), "mail sent by admin");
    Ok(Json(json!({
        "success": true,
        "message": "Email sent",
        "data": { "recipients": recipients },
    })))
}
