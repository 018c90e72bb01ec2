use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::admin::{ensure_club_admin, load_club};
use crate::middleware::auth::{current_user, AuthUser};
use crate::models::request::*;
use crate::services::directory;
use crate::services::listing::{filter_by_search, sort_by_created, ListQuery};
use crate::AppState;

fn status_filter(q: &ListQuery) -> AppResult<Option<RequestStatus>> {
    match q.status.as_deref() {
        None | Some("") | Some("all") => Ok(None),
        Some(s) => RequestStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown status '{s}'"))),
    }
}

// --- join requests ---

pub async fn request_to_join(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
    Json(body): Json<JoinClubRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let club = load_club(&state, &club_id).await?;
    if !club.is_active {
        return Err(AppError::NotFound("Club not found".into()));
    }
    let user = current_user(&state, &auth).await?;
    if user.belongs_to(&club_id) || state.store.get_membership(&club_id, user.id).await?.is_some() {
        return Err(AppError::Conflict("You are already a member of this club".into()));
    }

    let request = ClubJoinRequest {
        id: Uuid::new_v4(),
        club_id,
        user_id: user.id,
        user_name: user.full_name.clone(),
        user_email: user.email.clone(),
        message: body.message.filter(|m| !m.trim().is_empty()),
        status: RequestStatus::Pending,
        created_at: Utc::now(),
        resolved_at: None,
    };
    state.store.insert_join_request(&request).await?;

    tracing::info!(club_id = %request.club_id, user_id = %user.id, "Join request created");
    Ok((StatusCode::CREATED, Json(json!({ "request": request }))))
}

pub async fn list_join_requests(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    ensure_club_admin(&state, &auth, &club_id).await?;
    let status = status_filter(&q)?;

    let requests: Vec<_> = state
        .store
        .list_join_requests(&club_id)
        .await?
        .into_iter()
        .filter(|r| status.map_or(true, |s| r.status == s))
        .collect();
    let mut requests = filter_by_search(requests, q.search.as_deref());
    sort_by_created(&mut requests, q.sort.unwrap_or_default());

    Ok(Json(json!({
        "total": requests.len(),
        "requests": requests,
    })))
}

async fn resolve_join(
    state: AppState,
    auth: AuthUser,
    club_id: String,
    request_id: Uuid,
    decision: RequestStatus,
) -> AppResult<Json<Value>> {
    let (admin, _) = ensure_club_admin(&state, &auth, &club_id).await?;
    let request = state
        .store
        .resolve_join_request(&club_id, request_id, decision, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Join request not found".into()))?;
    if decision == RequestStatus::Approved {
        directory::invalidate(&state.cache).await;
    }

    tracing::info!(
        %club_id,
        %request_id,
        user_id = %request.user_id,
        decision = decision.as_str(),
        by = %admin.id,
        "Join request resolved"
    );
    Ok(Json(json!({ "request": request })))
}

pub async fn approve_join_request(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path((club_id, request_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    resolve_join(state, *auth, club_id, request_id, RequestStatus::Approved).await
}

pub async fn decline_join_request(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path((club_id, request_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    resolve_join(state, *auth, club_id, request_id, RequestStatus::Declined).await
}

// --- lesson requests ---

pub async fn request_lesson(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
    Json(body): Json<NewLessonRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let club = load_club(&state, &club_id).await?;
    if !club.is_active {
        return Err(AppError::NotFound("Club not found".into()));
    }
    let user = current_user(&state, &auth).await?;

    if body.coach_id.is_none() && body.lesson_id.is_none() {
        return Err(AppError::BadRequest("coachId or lessonId is required".into()));
    }
    if let Some(coach_id) = body.coach_id {
        let coaches = state.store.list_coaches(&club_id).await?;
        if !coaches.iter().any(|c| c.id == coach_id) {
            return Err(AppError::NotFound("Coach not found".into()));
        }
    }
    if let Some(lesson_id) = body.lesson_id {
        let lessons = state.store.list_group_lessons(&club_id).await?;
        if !lessons.iter().any(|l| l.id == lesson_id) {
            return Err(AppError::NotFound("Group lesson not found".into()));
        }
    }

    let request = LessonRequest {
        id: Uuid::new_v4(),
        club_id,
        user_id: user.id,
        user_name: user.full_name.clone(),
        coach_id: body.coach_id,
        lesson_id: body.lesson_id,
        preferred_time: body.preferred_time,
        notes: body.notes,
        status: RequestStatus::Pending,
        created_at: Utc::now(),
        resolved_at: None,
    };
    state.store.insert_lesson_request(&request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "request": request }))))
}

pub async fn list_lesson_requests(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    ensure_club_admin(&state, &auth, &club_id).await?;
    let status = status_filter(&q)?;

    let mut requests: Vec<_> = state
        .store
        .list_lesson_requests(&club_id)
        .await?
        .into_iter()
        .filter(|r| status.map_or(true, |s| r.status == s))
        .collect();
    sort_by_created(&mut requests, q.sort.unwrap_or_default());

    Ok(Json(json!({
        "total": requests.len(),
        "requests": requests,
    })))
}

async fn resolve_lesson(
    state: AppState,
    auth: AuthUser,
    club_id: String,
    request_id: Uuid,
    decision: RequestStatus,
) -> AppResult<Json<Value>> {
    ensure_club_admin(&state, &auth, &club_id).await?;
    let request = state
        .store
        .resolve_lesson_request(&club_id, request_id, decision, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Lesson request not found".into()))?;
    Ok(Json(json!({ "request": request })))
}

pub async fn approve_lesson_request(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path((club_id, request_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    resolve_lesson(state, *auth, club_id, request_id, RequestStatus::Approved).await
}

pub async fn decline_lesson_request(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path((club_id, request_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    resolve_lesson(state, *auth, club_id, request_id, RequestStatus::Declined).await
}
