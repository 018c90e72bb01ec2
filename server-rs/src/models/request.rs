use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Declined,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "declined" => Some(RequestStatus::Declined),
            _ => None,
        }
    }

    /// Only pending requests can be resolved, and only to a final state.
    pub fn can_become(&self, next: RequestStatus) -> bool {
        *self == RequestStatus::Pending && next != RequestStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubJoinRequest {
    pub id: Uuid,
    pub club_id: String,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub message: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRequest {
    pub id: Uuid,
    pub club_id: String,
    pub user_id: Uuid,
    pub user_name: String,
    pub coach_id: Option<Uuid>,
    pub lesson_id: Option<Uuid>,
    pub preferred_time: Option<String>,
    pub notes: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct JoinClubRequest {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewLessonRequest {
    #[serde(rename = "coachId")]
    pub coach_id: Option<Uuid>,
    #[serde(rename = "lessonId")]
    pub lesson_id: Option<Uuid>,
    #[serde(rename = "preferredTime")]
    pub preferred_time: Option<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_requests_resolve() {
        assert!(RequestStatus::Pending.can_become(RequestStatus::Approved));
        assert!(RequestStatus::Pending.can_become(RequestStatus::Declined));
        assert!(!RequestStatus::Pending.can_become(RequestStatus::Pending));
        assert!(!RequestStatus::Approved.can_become(RequestStatus::Declined));
        assert!(!RequestStatus::Declined.can_become(RequestStatus::Approved));
    }
}
