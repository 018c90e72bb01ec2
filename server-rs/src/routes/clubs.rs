use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::admin::{ensure_club_admin, load_club};
use crate::middleware::auth::AuthUser;
use crate::models::club::{is_clock_time, UpdateClubRequest, WEEKDAYS};
use crate::models::plan::membership_tiers;
use crate::models::user::UserPublic;
use crate::services::directory;
use crate::services::listing::{filter_by_search, ListQuery};
use crate::AppState;

fn non_blank(field: &str, value: String) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

pub async fn list_clubs(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    let clubs = directory::active_clubs(
        state.store.as_ref(),
        &state.cache,
        state.config.directory.cache_seconds,
    )
    .await?;
    let clubs = filter_by_search(clubs, q.search.as_deref());
    Ok(Json(json!({
        "total": clubs.len(),
        "clubs": clubs,
    })))
}

pub async fn get_club(
    State(state): State<AppState>,
    Path(club_id): Path<String>,
) -> AppResult<Json<Value>> {
    let club = load_club(&state, &club_id).await?;
    if !club.is_active {
        return Err(AppError::NotFound("Club not found".into()));
    }

    let courts = state.store.list_courts(&club_id).await?;
    let coaches = state.store.list_coaches(&club_id).await?;
    let lessons = state.store.list_group_lessons(&club_id).await?;
    let plans = state.store.list_plans(&club_id).await?;
    let tiers = membership_tiers(&plans);
    let active_plans: Vec<_> = plans.into_iter().filter(|p| p.is_active).collect();

    Ok(Json(json!({
        "club": club,
        "courts": courts,
        "coaches": coaches,
        "groupLessons": lessons,
        "membershipPlans": active_plans,
        "membershipTiers": tiers,
    })))
}

pub async fn update_club(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
    Json(body): Json<UpdateClubRequest>,
) -> AppResult<Json<Value>> {
    let (user, _) = ensure_club_admin(&state, &auth, &club_id).await?;
    let patch = validate_profile(body)?;

    let club = state
        .store
        .update_club_profile(&club_id, &patch, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Club not found".into()))?;
    directory::invalidate(&state.cache).await;

    tracing::info!(%club_id, by = %user.id, "Club updated");
    Ok(Json(json!({ "club": club })))
}

/// Trims required text fields and checks hours and booking settings.
fn validate_profile(mut body: UpdateClubRequest) -> AppResult<UpdateClubRequest> {
    body.name = body.name.map(|v| non_blank("Name", v)).transpose()?;
    body.city = body.city.map(|v| non_blank("City", v)).transpose()?;
    body.state = body.state.map(|v| non_blank("State", v)).transpose()?;
    body.court_type = body
        .court_type
        .map(|v| non_blank("Court type", v))
        .transpose()?;
    if let Some(email) = body.email.take() {
        let email = non_blank("Email", email)?;
        if !email.contains('@') {
            return Err(AppError::BadRequest("A valid email is required".into()));
        }
        body.email = Some(email);
    }
    if let Some(hours) = &body.operating_hours {
        for h in hours {
            if !WEEKDAYS.contains(&h.day.as_str()) {
                return Err(AppError::BadRequest(format!("Unknown day '{}'", h.day)));
            }
            if !h.closed && (!is_clock_time(&h.open) || !is_clock_time(&h.close) || h.open >= h.close)
            {
                return Err(AppError::BadRequest(format!(
                    "Invalid hours for {}: expected HH:MM with open before close",
                    h.day
                )));
            }
        }
    }
    if let Some(settings) = &body.booking_settings {
        if settings.slot_minutes <= 0
            || settings.advance_booking_days < 0
            || settings.max_bookings_per_day <= 0
            || settings.cancellation_hours < 0
        {
            return Err(AppError::BadRequest("Invalid booking settings".into()));
        }
    }
    Ok(body)
}

pub async fn list_members(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
) -> AppResult<Json<Value>> {
    ensure_club_admin(&state, &auth, &club_id).await?;

    let memberships = state.store.list_memberships(&club_id).await?;
    let mut members = Vec::with_capacity(memberships.len());
    for m in memberships {
        let Some(user) = state.store.get_user(m.user_id).await? else {
            continue;
        };
        members.push(json!({
            "user": UserPublic::from(&user),
            "role": m.role,
            "planId": m.plan_id,
            "status": m.status,
            "joinedAt": m.joined_at,
        }));
    }
    Ok(Json(json!({ "members": members })))
}
