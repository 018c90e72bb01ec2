use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::admin::{load_club, StaffUser};
use crate::models::club::{AssignAdminRequest, ClubStatusRequest};
use crate::models::user::{LegacyUserDocument, UserPublic};
use crate::services::listing::{filter_by_search, sort_by_created, ListQuery};
use crate::services::{approval, directory};
use crate::AppState;

pub async fn list_submissions(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    let submissions = state.store.list_submissions().await?;
    let mut submissions = filter_by_search(submissions, q.search.as_deref());
    sort_by_created(&mut submissions, q.sort.unwrap_or_default());
    Ok(Json(json!({
        "total": submissions.len(),
        "submissions": submissions,
    })))
}

pub async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let submission = state
        .store
        .get_submission(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".into()))?;
    Ok(Json(json!({ "submission": submission })))
}

pub async fn approve_submission(
    State(state): State<AppState>,
    staff: axum::Extension<StaffUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let approval =
        approval::approve_submission(state.store.as_ref(), &state.cache, id, staff.0 .0.id)
            .await?;
    Ok(Json(json!({
        "success": true,
        "clubId": approval.club.id,
        "submitterId": approval.submitter.id,
        "submitterRole": approval.submitter.user_type,
        "club": approval.club,
        "courts": approval.courts,
    })))
}

pub async fn decline_submission(
    State(state): State<AppState>,
    staff: axum::Extension<StaffUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    approval::decline_submission(state.store.as_ref(), id, staff.0 .0.id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let pending = state.store.list_submissions().await?.len();
    let clubs = state.store.list_clubs(false).await?;
    let active = clubs.iter().filter(|c| c.is_active).count();
    let users: serde_json::Map<String, Value> = state
        .store
        .count_users_by_type()
        .await?
        .into_iter()
        .map(|(user_type, n)| (user_type.as_str().to_string(), json!(n)))
        .collect();

    Ok(Json(json!({
        "pendingSubmissions": pending,
        "clubs": clubs.len(),
        "activeClubs": active,
        "users": users,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ImportUsersRequest {
    pub users: Vec<LegacyUserDocument>,
}

/// Upserts legacy user documents, normalizing their `organization` field.
pub async fn import_users(
    State(state): State<AppState>,
    staff: axum::Extension<StaffUser>,
    Json(body): Json<ImportUsersRequest>,
) -> AppResult<Json<Value>> {
    let mut imported = Vec::with_capacity(body.users.len());
    let mut skipped = Vec::new();
    for doc in &body.users {
        if !doc.email.contains('@') {
            skipped.push(doc.email.clone());
            continue;
        }
        let user = state.store.import_user(doc).await?;
        imported.push(UserPublic::from(&user));
    }

    tracing::info!(
        imported = imported.len(),
        skipped = skipped.len(),
        by = %staff.0 .0.id,
        "Legacy users imported"
    );
    Ok(Json(json!({
        "imported": imported.len(),
        "skipped": skipped,
        "users": imported,
    })))
}

pub async fn assign_admin(
    State(state): State<AppState>,
    staff: axum::Extension<StaffUser>,
    Path(club_id): Path<String>,
    Json(body): Json<AssignAdminRequest>,
) -> AppResult<Json<Value>> {
    load_club(&state, &club_id).await?;

    let target = match (body.user_id, body.email.as_deref()) {
        (Some(id), _) => state.store.get_user(id).await?,
        (None, Some(email)) => state.store.find_user_by_email(email).await?,
        (None, None) => {
            return Err(AppError::BadRequest("userId or email is required".into()));
        }
    }
    .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let user = state
        .store
        .assign_club_admin(&club_id, target.id, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Club or user not found".into()))?;
    directory::invalidate(&state.cache).await;

    tracing::info!(%club_id, user_id = %user.id, by = %staff.0 .0.id, "Club admin assigned");
    Ok(Json(json!({
        "success": true,
        "user": UserPublic::from(&user),
    })))
}

pub async fn remove_admin(
    State(state): State<AppState>,
    staff: axum::Extension<StaffUser>,
    Path((club_id, user_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    if !state.store.remove_club_admin(&club_id, user_id).await? {
        return Err(AppError::NotFound("Assigned admin not found".into()));
    }
    directory::invalidate(&state.cache).await;
    tracing::info!(%club_id, %user_id, by = %staff.0 .0.id, "Club admin removed");
    Ok(Json(json!({ "success": true })))
}

pub async fn set_club_status(
    State(state): State<AppState>,
    staff: axum::Extension<StaffUser>,
    Path(club_id): Path<String>,
    Json(body): Json<ClubStatusRequest>,
) -> AppResult<Json<Value>> {
    let club = state
        .store
        .set_club_status(&club_id, body.is_verified, body.is_active, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Club not found".into()))?;
    directory::invalidate(&state.cache).await;

    tracing::info!(
        %club_id,
        is_verified = club.is_verified,
        is_active = club.is_active,
        by = %staff.0 .0.id,
        "Club status changed"
    );
    Ok(Json(json!({ "club": club })))
}

pub async fn delete_club(
    State(state): State<AppState>,
    staff: axum::Extension<StaffUser>,
    Path(club_id): Path<String>,
) -> AppResult<Json<Value>> {
    if !state.store.delete_club(&club_id).await? {
        return Err(AppError::NotFound("Club not found".into()));
    }
    directory::invalidate(&state.cache).await;
    tracing::info!(%club_id, by = %staff.0 .0.id, "Club deleted");
    Ok(Json(json!({ "success": true })))
}
