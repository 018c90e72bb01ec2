use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cache::Cache;
use crate::error::{AppError, AppResult};
use crate::models::club::{default_courts, Club, Court, MemberRole};
use crate::models::submission::ClubSubmission;
use crate::models::user::User;
use crate::services::directory;
use crate::services::membership::{grant_membership, MembershipGrant};
use crate::store::ClubStore;

/// Writes a store performs to turn one submission into one club.
#[derive(Debug, Clone)]
pub struct ApprovalPlan {
    pub club: Club,
    pub courts: Vec<Court>,
    pub grant: MembershipGrant,
}

/// Derives the new club, its default courts and the submitter's ownership
/// grant. Pure; stores call this inside their transaction after claiming the
/// submission and locking the submitter.
pub fn plan_approval(
    submission: &ClubSubmission,
    submitter: &User,
    club_id: &str,
    now: DateTime<Utc>,
) -> ApprovalPlan {
    let club = Club::from_submission(club_id.to_string(), submission, now);
    let courts = default_courts(&club.id, club.court_count, &club.court_type, now);
    let grant = grant_membership(submitter, None, &club.id, MemberRole::Owner, now);
    ApprovalPlan {
        club,
        courts,
        grant,
    }
}

/// Result of a committed approval.
#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    #[serde(rename = "submissionId")]
    pub submission_id: Uuid,
    pub club: Club,
    pub courts: Vec<Court>,
    pub submitter: User,
}

pub async fn approve_submission(
    store: &dyn ClubStore,
    cache: &Cache,
    submission_id: Uuid,
    reviewer: Uuid,
) -> AppResult<Approval> {
    let club_id = Uuid::new_v4().to_string();
    let approval = store
        .approve_submission(submission_id, &club_id, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".into()))?;

    directory::invalidate(cache).await;
    tracing::info!(
        %submission_id,
        club_id = %approval.club.id,
        submitter = %approval.submitter.id,
        submitter_role = %approval.submitter.user_type,
        %reviewer,
        "Club submission approved"
    );
    Ok(approval)
}

pub async fn decline_submission(
    store: &dyn ClubStore,
    submission_id: Uuid,
    reviewer: Uuid,
) -> AppResult<()> {
    if !store.decline_submission(submission_id).await? {
        return Err(AppError::NotFound("Submission not found".into()));
    }
    tracing::info!(%submission_id, %reviewer, "Club submission declined");
    Ok(())
}
