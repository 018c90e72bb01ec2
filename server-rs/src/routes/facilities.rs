use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::admin::{ensure_club_admin, load_club};
use crate::middleware::auth::AuthUser;
use crate::models::club::*;
use crate::AppState;

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

// --- courts ---

pub async fn list_courts(
    State(state): State<AppState>,
    Path(club_id): Path<String>,
) -> AppResult<Json<Value>> {
    load_club(&state, &club_id).await?;
    let courts = state.store.list_courts(&club_id).await?;
    Ok(Json(json!({ "courts": courts })))
}

pub async fn create_court(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
    Json(body): Json<CourtRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let (_, club) = ensure_club_admin(&state, &auth, &club_id).await?;
    let court = Court {
        id: Uuid::new_v4(),
        club_id: club.id,
        name: required("Court name", &body.name)?,
        surface: body.surface.unwrap_or(club.court_type),
        indoor: body.indoor.unwrap_or(false),
        is_active: body.is_active.unwrap_or(true),
        created_at: Utc::now(),
    };
    state.store.insert_court(&court).await?;
    Ok((StatusCode::CREATED, Json(json!({ "court": court }))))
}

pub async fn update_court(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path((club_id, court_id)): Path<(String, Uuid)>,
    Json(body): Json<CourtRequest>,
) -> AppResult<Json<Value>> {
    ensure_club_admin(&state, &auth, &club_id).await?;
    let existing = state
        .store
        .list_courts(&club_id)
        .await?
        .into_iter()
        .find(|c| c.id == court_id)
        .ok_or_else(|| AppError::NotFound("Court not found".into()))?;

    let court = Court {
        name: required("Court name", &body.name)?,
        surface: body.surface.unwrap_or(existing.surface.clone()),
        indoor: body.indoor.unwrap_or(existing.indoor),
        is_active: body.is_active.unwrap_or(existing.is_active),
        ..existing
    };
    if !state.store.update_court(&court).await? {
        return Err(AppError::NotFound("Court not found".into()));
    }
    Ok(Json(json!({ "court": court })))
}

pub async fn delete_court(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path((club_id, court_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    ensure_club_admin(&state, &auth, &club_id).await?;
    if !state.store.delete_court(&club_id, court_id).await? {
        return Err(AppError::NotFound("Court not found".into()));
    }
    Ok(Json(json!({ "success": true })))
}

// --- coaches ---

pub async fn list_coaches(
    State(state): State<AppState>,
    Path(club_id): Path<String>,
) -> AppResult<Json<Value>> {
    load_club(&state, &club_id).await?;
    let coaches = state.store.list_coaches(&club_id).await?;
    Ok(Json(json!({ "coaches": coaches })))
}

pub async fn create_coach(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
    Json(body): Json<CoachRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    ensure_club_admin(&state, &auth, &club_id).await?;
    if body.hourly_rate_cents.is_some_and(|r| r < 0) {
        return Err(AppError::BadRequest("Hourly rate cannot be negative".into()));
    }
    let coach = Coach {
        id: Uuid::new_v4(),
        club_id,
        name: required("Coach name", &body.name)?,
        email: body.email,
        bio: body.bio,
        hourly_rate_cents: body.hourly_rate_cents,
        created_at: Utc::now(),
    };
    state.store.insert_coach(&coach).await?;
    Ok((StatusCode::CREATED, Json(json!({ "coach": coach }))))
}

pub async fn delete_coach(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path((club_id, coach_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    ensure_club_admin(&state, &auth, &club_id).await?;
    if !state.store.delete_coach(&club_id, coach_id).await? {
        return Err(AppError::NotFound("Coach not found".into()));
    }
    Ok(Json(json!({ "success": true })))
}

// --- group lessons ---

pub async fn list_lessons(
    State(state): State<AppState>,
    Path(club_id): Path<String>,
) -> AppResult<Json<Value>> {
    load_club(&state, &club_id).await?;
    let lessons = state.store.list_group_lessons(&club_id).await?;
    Ok(Json(json!({ "groupLessons": lessons })))
}

pub async fn create_lesson(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
    Json(body): Json<GroupLessonRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    ensure_club_admin(&state, &auth, &club_id).await?;

    if let Some(coach_id) = body.coach_id {
        let coaches = state.store.list_coaches(&club_id).await?;
        if !coaches.iter().any(|c| c.id == coach_id) {
            return Err(AppError::BadRequest("Coach does not belong to this club".into()));
        }
    }
    let capacity = body.capacity.unwrap_or(8);
    if capacity <= 0 {
        return Err(AppError::BadRequest("Capacity must be positive".into()));
    }
    let price_cents = body.price_cents.unwrap_or(0);
    if price_cents < 0 {
        return Err(AppError::BadRequest("Price cannot be negative".into()));
    }

    let lesson = GroupLesson {
        id: Uuid::new_v4(),
        club_id,
        title: required("Title", &body.title)?,
        coach_id: body.coach_id,
        description: body.description,
        schedule: required("Schedule", &body.schedule)?,
        capacity,
        price_cents,
        created_at: Utc::now(),
    };
    state.store.insert_group_lesson(&lesson).await?;
    Ok((StatusCode::CREATED, Json(json!({ "groupLesson": lesson }))))
}

pub async fn delete_lesson(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path((club_id, lesson_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    ensure_club_admin(&state, &auth, &club_id).await?;
    if !state.store.delete_group_lesson(&club_id, lesson_id).await? {
        return Err(AppError::NotFound("Group lesson not found".into()));
    }
    Ok(Json(json!({ "success": true })))
}
