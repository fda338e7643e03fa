//! Bearer token verification.
//!
//! Tokens are issued by the identity provider; this service only checks the
//! HS256 signature and expiry and reads the subject as the user id.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Claims read from an access token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (timestamp)
    #[serde(default)]
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
}

/// Validates and decodes a token
///
/// # Errors
///
/// `AppError::Unauthorized` for an expired, malformed or wrongly signed
/// token, or one without a subject.
pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::Unauthorized {
            message: "Token has expired".to_string(),
        },
        ErrorKind::InvalidToken => AppError::Unauthorized {
            message: "Invalid token".to_string(),
        },
        ErrorKind::InvalidSignature => AppError::Unauthorized {
            message: "Invalid token signature".to_string(),
        },
        _ => AppError::Unauthorized {
            message: format!("Token validation failed: {}", e),
        },
    })?;

    if claims.sub.trim().is_empty() {
        return Err(AppError::Unauthorized {
            message: "Token has no subject".to_string(),
        });
    }

    Ok(claims)
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::Claims;

    pub const SECRET: &str = "test_secret_key_at_least_32_characters_long";

    /// Signs a token the way the identity provider does.
    pub fn issue(sub: &str, secret: &str, valid_for: Duration) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            iat: now.timestamp(),
            exp: (now + valid_for).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }
}
