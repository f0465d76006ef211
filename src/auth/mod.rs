//! Token issuing/verification, password hashing and the request extractors
//! that turn a bearer token into a `Caller`.

pub mod claims;
pub mod extractors;
pub mod jwt;
pub mod password;

pub use extractors::{AuthUser, MaybeAuthUser};
pub use jwt::{JwtKeys, TokenError};
