use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{generate_tokens, subject, verify_token};
use crate::models::user::*;
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const BCRYPT_COST: u32 = 12;

fn token_response(state: &AppState, user: &User) -> AppResult<Json<Value>> {
    let (token, refresh_token) = generate_tokens(user.id, &state.config.jwt)?;
    Ok(Json(json!({
        "token": token,
        "refreshToken": refresh_token,
        "user": UserPublic::from(user),
    })))
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let email = normalize_email(&body.email);
    if !email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }
    if body.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if body.full_name.trim().is_empty() {
        return Err(AppError::BadRequest("Full name is required".into()));
    }

    let password_hash = bcrypt::hash(&body.password, BCRYPT_COST)?;
    let user = User::new(&body.full_name, &email, Some(password_hash));
    state.store.create_user(&user).await?;

    tracing::info!(user_id = %user.id, "Account registered");
    Ok((StatusCode::CREATED, token_response(&state, &user)?))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    let invalid = || AppError::Unauthorized("Invalid email or password".into());

    let user = state
        .store
        .find_user_by_email(&body.email)
        .await?
        .ok_or_else(invalid)?;
    // Imported accounts have no password until they reset it.
    let hash = user.password_hash.as_deref().ok_or_else(invalid)?;
    if !bcrypt::verify(&body.password, hash)? {
        return Err(invalid());
    }

    token_response(&state, &user)
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<Value>> {
    let claims = verify_token(&body.refresh_token, &state.config.jwt.secret)?;
    if claims.token_type.as_deref() != Some("refresh") {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }

    let user = state
        .store
        .get_user(subject(&claims)?)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))?;

    token_response(&state, &user)
}
