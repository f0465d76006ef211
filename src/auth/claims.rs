use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo_types::Role;

/// Type of JWT: access or refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT payload. `role` is a closed enum, so a token naming any other role
/// fails to decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,       // user ID
    pub email: String,
    pub role: Role,
    pub iat: usize,      // issued at (unix timestamp)
    pub exp: usize,      // expires at (unix timestamp)
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}
