use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::auth::{current_user, AuthUser};
use crate::models::submission::NewSubmissionRequest;
use crate::services::listing::{sort_by_created, SortOrder};
use crate::AppState;

pub async fn create_submission(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Json(body): Json<NewSubmissionRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let user = current_user(&state, &auth).await?;
    let submission = body.into_submission(&user, Utc::now())?;
    state.store.insert_submission(&submission).await?;

    tracing::info!(
        submission_id = %submission.id,
        submitted_by = %user.id,
        club = %submission.name,
        "Club submission received"
    );
    Ok((StatusCode::CREATED, Json(json!({ "submission": submission }))))
}

pub async fn my_submissions(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let mut submissions = state.store.list_submissions_by_user(auth.id).await?;
    sort_by_created(&mut submissions, SortOrder::Recent);
    Ok(Json(json!({ "submissions": submissions })))
}
