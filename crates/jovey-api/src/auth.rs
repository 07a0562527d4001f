//! Bearer-token authentication.
//!
//! Every route except `/health` requires `Authorization: Bearer <jwt>`,
//! signed HS256 with the configured secret and carrying `sub`, `role` and
//! `exp`. Handlers ask for `AuthenticatedUser` (any role) or `StaffUser`.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Role carried in the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Retail customer.
    Consumer,
    /// Approved business customer.
    Dealer,
    /// Back-office staff.
    Staff,
}

/// Token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id).
    pub sub: String,
    /// Role of the subject.
    pub role: Role,
    /// Expiry, seconds since the epoch.
    pub exp: usize,
}

/// Any caller with a valid token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Subject claim.
    pub subject: String,
    /// Role claim.
    pub role: Role,
}

impl AuthenticatedUser {
    /// The subject as a user id, when it is a UUID.
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.subject).ok()
    }
}

/// A caller whose token carries the `staff` role.
#[derive(Debug, Clone)]
pub struct StaffUser(pub AuthenticatedUser);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Verifies `token` against `secret`.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` for a malformed, badly signed or expired
/// token.
pub fn verify(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub"]);
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| ApiError::Unauthorized(format!("invalid bearer token: {e}")))
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        let claims = verify(token, &state.jwt_secret)?;
        Ok(Self {
            subject: claims.sub,
            role: claims.role,
        })
    }
}

impl FromRequestParts<AppState> for StaffUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if user.role != Role::Staff {
            return Err(ApiError::Forbidden("this route requires the staff role".into()));
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header};

    use super::*;

    fn mint(secret: &str, role: Role, exp: usize) -> String {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role,
            exp,
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_one_hour() -> usize {
        usize::try_from(chrono::Utc::now().timestamp() + 3600).unwrap()
    }

    #[test]
    fn test_verify_accepts_token_signed_with_secret() {
        let token = mint("s3cret", Role::Dealer, in_one_hour());

        let claims = verify(&token, "s3cret").unwrap();

        assert_eq!(claims.role, Role::Dealer);
        assert!(Uuid::parse_str(&claims.sub).is_ok());
    }

    #[test]
    fn test_verify_rejects_wrong_secret_and_expired_token() {
        let wrong_secret = mint("other", Role::Staff, in_one_hour());
        let expired = mint("s3cret", Role::Staff, 1_000);

        assert!(matches!(verify(&wrong_secret, "s3cret"), Err(ApiError::Unauthorized(_))));
        assert!(matches!(verify(&expired, "s3cret"), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_user_id_is_parsed_from_uuid_subject() {
        let user = AuthenticatedUser {
            subject: "not-a-uuid".into(),
            role: Role::Consumer,
        };
        assert!(user.user_id().is_none());
    }
}
