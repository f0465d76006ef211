use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::{Claims, TokenKind};
use crate::{config::JwtConfig, state::AppState, users::repo_types::User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_minutes as u64) * 60),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from(&state.config.jwt)
    }
}

impl JwtKeys {
    fn sign_with_kind(&self, user: &User, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user.id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user: &User) -> anyhow::Result<String> {
        self.sign_with_kind(user, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user: &User) -> anyhow::Result<String> {
        self.sign_with_kind(user, TokenKind::Refresh)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Access {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Role;
    use serde_json::json;
    use uuid::Uuid;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Nurse".into(),
            email: "nurse@example.com".into(),
            password_hash: String::new(),
            role,
            otp_code: None,
            otp_expires_at: None,
            otp_verified: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let u = user(Role::Counselor);
        let token = keys.sign_access(&u).expect("sign access");
        let claims = keys.verify_access(&token).expect("verify token");
        assert_eq!(claims.sub, u.id);
        assert_eq!(claims.role, Role::Counselor);
        assert_eq!(claims.email, "nurse@example.com");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn verify_refresh_rejects_access_token_and_vice_versa() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let u = user(Role::User);
        let access = keys.sign_access(&u).expect("sign access");
        let refresh = keys.sign_refresh(&u).expect("sign refresh");
        assert_eq!(keys.verify_refresh(&access).unwrap_err(), TokenError::Invalid);
        assert_eq!(keys.verify_access(&refresh).unwrap_err(), TokenError::Invalid);
        assert_eq!(keys.verify_refresh(&refresh).unwrap().sub, u.id);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.sign_access(&user(Role::Admin)).expect("sign access");
        assert_eq!(bad_keys.verify(&token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = json!({
            "sub": Uuid::new_v4(), "email": "a@b.io", "role": "user",
            "iat": now - 7200, "exp": now - 3600,
            "iss": "iss", "aud": "aud", "kind": "access",
        });
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert_eq!(keys.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn unknown_role_does_not_decode() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = json!({
            "sub": Uuid::new_v4(), "email": "a@b.io", "role": "superuser",
            "iat": now, "exp": now + 600,
            "iss": "iss", "aud": "aud", "kind": "access",
        });
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert_eq!(keys.verify(&token).unwrap_err(), TokenError::Invalid);
    }
}
