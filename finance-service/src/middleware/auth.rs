use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    Representative,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "Administrator",
            Role::Representative => "Representative",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bearer token claims issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Display name
    pub name: String,
    pub role: Role,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// HS256 keys derived from the shared secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtKeys {
    pub fn new(secret: &Secret<String>) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
        }
    }

    /// Sign a token. The service never issues tokens itself; tests and
    /// tooling do.
    pub fn issue(
        &self,
        user_id: &str,
        name: &str,
        role: Role,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            name: name.to_string(),
            role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }
}

/// Who is acting, as recorded in history entries and transaction logs.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
    pub ip_address: Option<String>,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Administrator role required"
            )))
        }
    }
}

/// Authenticated caller.
///
/// Validates the `Authorization: Bearer` token and records `user_id` on the
/// request span.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
            })?;

        let claims = JwtKeys::from_ref(state).verify(token)?;

        tracing::Span::current().record("user_id", claims.sub.as_str());

        // First hop in X-Forwarded-For is the client
        let ip_address = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());

        Ok(AuthUser(Actor {
            user_id: claims.sub,
            user_name: claims.name,
            role: claims.role,
            ip_address,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new(&Secret::new("test-secret".to_string()))
    }

    #[test]
    fn issued_tokens_verify() {
        let keys = keys();
        let token = keys
            .issue("admin-1", "Admin", Role::Administrator, Duration::hours(1))
            .unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "admin-1");
        assert_eq!(claims.role, Role::Administrator);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let keys = keys();
        let token = keys
            .issue("rep-1", "Rep", Role::Representative, Duration::hours(-2))
            .unwrap();
        assert!(matches!(keys.verify(&token), Err(AppError::InvalidToken(_))));
    }

    #[test]
    fn foreign_signatures_are_rejected() {
        let other = JwtKeys::new(&Secret::new("another-secret".to_string()));
        let token = other
            .issue("rep-1", "Rep", Role::Representative, Duration::hours(1))
            .unwrap();
        assert!(keys().verify(&token).is_err());
    }

    #[test]
    fn representatives_are_not_admins() {
        let actor = Actor {
            user_id: "rep-1".into(),
            user_name: "Rep".into(),
            role: Role::Representative,
            ip_address: None,
        };
        assert!(matches!(actor.require_admin(), Err(AppError::Forbidden(_))));
    }
}
