use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::{AppError, AppResult};
use crate::models::user::User;
use crate::AppState;

/// Token claims. Only identity is carried: roles are always re-read from the
/// store, so a role change takes effect on the next request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub token_type: Option<String>, // "access" or "refresh"
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
}

fn sign(user_id: Uuid, token_type: &str, ttl_secs: i64, secret: &str) -> AppResult<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        token_type: Some(token_type.to_string()),
        exp: now + ttl_secs,
        iat: now,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Returns `(access_token, refresh_token)`.
pub fn generate_tokens(user_id: Uuid, jwt: &JwtConfig) -> AppResult<(String, String)> {
    let access = sign(user_id, "access", jwt.access_expiry_secs, &jwt.secret)?;
    let refresh = sign(user_id, "refresh", jwt.refresh_expiry_secs, &jwt.secret)?;
    Ok((access, refresh))
}

pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

pub fn subject(claims: &Claims) -> AppResult<Uuid> {
    Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token subject".into()))
}

fn extract_bearer(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(String::from)
}

/// Middleware: requires a valid access token. Sets `AuthUser` in extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer(&req)
        .ok_or_else(|| AppError::Unauthorized("No token provided".into()))?;

    let claims = verify_token(&token, &state.config.jwt.secret)?;
    if claims.token_type.as_deref() == Some("refresh") {
        return Err(AppError::Unauthorized("Access token required".into()));
    }

    let id = subject(&claims)?;
    req.extensions_mut().insert(AuthUser { id });
    Ok(next.run(req).await)
}

/// Loads the caller's current record. A token whose user was deleted is no
/// longer accepted.
pub async fn current_user(state: &AppState, auth: &AuthUser) -> AppResult<User> {
    state
        .store
        .get_user(auth.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".into(),
            access_expiry_secs: 3600,
            refresh_expiry_secs: 86400,
        }
    }

    #[test]
    fn tokens_carry_subject_and_type() {
        let id = Uuid::new_v4();
        let (access, refresh) = generate_tokens(id, &jwt()).unwrap();

        let claims = verify_token(&access, "test-secret").unwrap();
        assert_eq!(subject(&claims).unwrap(), id);
        assert_eq!(claims.token_type.as_deref(), Some("access"));

        let claims = verify_token(&refresh, "test-secret").unwrap();
        assert_eq!(claims.token_type.as_deref(), Some("refresh"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (access, _) = generate_tokens(Uuid::new_v4(), &jwt()).unwrap();
        assert!(verify_token(&access, "other-secret").is_err());
    }
}
