use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::auth::{current_user, AuthUser};
use crate::models::request::RequestStatus;
use crate::models::user::{User, UserPublic};
use crate::AppState;

/// The caller's clubs with the role held in each. Ids left behind by a
/// deleted club are skipped.
async fn my_clubs(state: &AppState, user: &User) -> AppResult<Vec<Value>> {
    let mut clubs = Vec::with_capacity(user.organizations.len());
    for club_id in &user.organizations {
        let Some(club) = state.store.get_club(club_id).await? else {
            continue;
        };
        let membership = state.store.get_membership(club_id, user.id).await?;
        let role = membership
            .as_ref()
            .map(|m| m.role.as_str())
            .or_else(|| club.is_assigned_admin(user.id).then_some("admin"))
            .unwrap_or("member");
        clubs.push(json!({
            "id": club.id,
            "name": club.name,
            "city": club.city,
            "state": club.state,
            "role": role,
            "planId": membership.and_then(|m| m.plan_id),
        }));
    }
    Ok(clubs)
}

pub async fn me(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let user = current_user(&state, &auth).await?;
    let clubs = my_clubs(&state, &user).await?;
    Ok(Json(json!({
        "user": UserPublic::from(&user),
        "clubs": clubs,
    })))
}

pub async fn dashboard(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let user = current_user(&state, &auth).await?;
    let clubs = my_clubs(&state, &user).await?;

    let join_requests: Vec<_> = state
        .store
        .list_join_requests_by_user(user.id)
        .await?
        .into_iter()
        .filter(|r| r.status == RequestStatus::Pending)
        .collect();
    let lesson_requests: Vec<_> = state
        .store
        .list_lesson_requests_by_user(user.id)
        .await?
        .into_iter()
        .filter(|r| r.status == RequestStatus::Pending)
        .collect();
    let submissions = state.store.list_submissions_by_user(user.id).await?;

    Ok(Json(json!({
        "user": UserPublic::from(&user),
        "clubs": clubs,
        "pendingJoinRequests": join_requests,
        "pendingLessonRequests": lesson_requests,
        "pendingSubmissions": submissions,
    })))
}
