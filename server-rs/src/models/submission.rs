use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::user::User;

/// Approval creates one court row per declared court.
pub const MAX_COURTS: i32 = 100;

/// A pending request to register a new club.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClubSubmission {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: Option<String>,
    pub description: Option<String>,
    pub courts: i32,
    pub court_type: String,
    pub status: String,
    pub submitted_by: Uuid,
    pub submitter_email: String,
    pub submitter_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewSubmissionRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: Option<String>,
    pub description: Option<String>,
    pub courts: i32,
    #[serde(rename = "courtType")]
    pub court_type: Option<String>,
}

fn required(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl NewSubmissionRequest {
    pub fn into_submission(self, submitter: &User, now: DateTime<Utc>) -> AppResult<ClubSubmission> {
        let name = required(&self.name, "Club name")?;
        let email = required(&self.email, "Email")?;
        if !email.contains('@') {
            return Err(AppError::BadRequest("Email must be a valid address".into()));
        }
        let city = required(&self.city, "City")?;
        let state = required(&self.state, "State")?;
        if self.courts < 1 {
            return Err(AppError::BadRequest("A club needs at least one court".into()));
        }
        if self.courts > MAX_COURTS {
            return Err(AppError::BadRequest(format!(
                "A club can list at most {MAX_COURTS} courts"
            )));
        }

        Ok(ClubSubmission {
            id: Uuid::new_v4(),
            name,
            email,
            phone: optional(self.phone),
            website: optional(self.website),
            address: optional(self.address),
            city,
            state,
            zip: optional(self.zip),
            description: optional(self.description),
            courts: self.courts,
            court_type: optional(self.court_type).unwrap_or_else(|| "hard".to_string()),
            status: "pending".to_string(),
            submitted_by: submitter.id,
            submitter_email: submitter.email.clone(),
            submitter_name: submitter.full_name.clone(),
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewSubmissionRequest {
        NewSubmissionRequest {
            name: " Ace Tennis ".into(),
            email: "hello@ace.example".into(),
            phone: Some("  ".into()),
            website: None,
            address: None,
            city: "Austin".into(),
            state: "TX".into(),
            zip: None,
            description: None,
            courts: 4,
            court_type: None,
        }
    }

    #[test]
    fn valid_request_becomes_pending_submission() {
        let user = User::new("Sam", "sam@example.com", None);
        let sub = request().into_submission(&user, Utc::now()).unwrap();
        assert_eq!(sub.name, "Ace Tennis");
        assert_eq!(sub.status, "pending");
        assert_eq!(sub.phone, None);
        assert_eq!(sub.court_type, "hard");
        assert_eq!(sub.submitted_by, user.id);
        assert_eq!(sub.submitter_email, "sam@example.com");
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let user = User::new("Sam", "sam@example.com", None);

        let mut req = request();
        req.city = "   ".into();
        let err = req.into_submission(&user, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "City is required"));

        let mut req = request();
        req.email = "not-an-email".into();
        assert!(req.into_submission(&user, Utc::now()).is_err());

        let mut req = request();
        req.courts = 0;
        assert!(req.into_submission(&user, Utc::now()).is_err());
    }

    #[test]
    fn court_count_is_capped() {
        let user = User::new("Sam", "sam@example.com", None);

        let mut req = request();
        req.courts = MAX_COURTS;
        assert!(req.into_submission(&user, Utc::now()).is_ok());

        let mut req = request();
        req.courts = i32::MAX;
        let err = req.into_submission(&user, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("at most")));
    }
}
