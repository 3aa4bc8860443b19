use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{errors::ServiceError, AppState};

/// Marketplace roles. Providers handle quotations and connect payment
/// accounts; clients request quotations and pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Provider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    pub email: Option<String>,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller, extracted from a `Bearer` JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Role,
}

impl AuthUser {
    pub fn require_client(&self) -> Result<(), ServiceError> {
        match self.role {
            Role::Client => Ok(()),
            Role::Provider => Err(ServiceError::Forbidden(
                "this operation is reserved for clients".to_string(),
            )),
        }
    }

    pub fn require_provider(&self) -> Result<(), ServiceError> {
        match self.role {
            Role::Provider => Ok(()),
            Role::Client => Err(ServiceError::Forbidden(
                "this operation is reserved for providers".to_string(),
            )),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing authorization header".into()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("expected bearer token".into()))?
            .trim();

        let claims = decode_token(token, &state.config.jwt_secret)?;

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {e}")))?;
    Ok(data.claims)
}

/// Issues an HS256 token for the given user. Used by tests and tooling; token
/// issuance for real sessions lives in the identity service, not here.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    email: Option<String>,
    role: Role,
    ttl_secs: i64,
) -> Result<String, ServiceError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        email,
        role,
        iat: now,
        exp: now + ttl_secs,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to encode token: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_preserves_claims() {
        let user_id = Uuid::new_v4();
        let token = issue_token(
            "test-secret",
            user_id,
            Some("prov@example.com".into()),
            Role::Provider,
            3600,
        )
        .unwrap();

        let claims = decode_token(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Provider);
        assert_eq!(claims.email.as_deref(), Some("prov@example.com"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token =
            issue_token("test-secret", Uuid::new_v4(), None, Role::Client, 3600).unwrap();
        assert!(decode_token(&token, "other-secret").is_err());
    }

    #[test]
    fn role_gates() {
        let user = AuthUser {
            user_id: Uuid::new_v4(),
            email: None,
            role: Role::Client,
        };
        assert!(user.require_client().is_ok());
        assert!(matches!(
            user.require_provider(),
            Err(ServiceError::Forbidden(_))
        ));
    }
}
