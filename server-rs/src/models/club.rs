use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::submission::ClubSubmission;

pub const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    pub day: String,
    pub open: String,
    pub close: String,
    #[serde(default)]
    pub closed: bool,
}

pub fn default_operating_hours() -> Vec<OperatingHours> {
    WEEKDAYS
        .iter()
        .map(|day| OperatingHours {
            day: day.to_string(),
            open: "06:00".to_string(),
            close: "22:00".to_string(),
            closed: false,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingSettings {
    #[serde(rename = "slotMinutes")]
    pub slot_minutes: i32,
    #[serde(rename = "advanceBookingDays")]
    pub advance_booking_days: i32,
    #[serde(rename = "maxBookingsPerDay")]
    pub max_bookings_per_day: i32,
    #[serde(rename = "cancellationHours")]
    pub cancellation_hours: i32,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            slot_minutes: 60,
            advance_booking_days: 14,
            max_bookings_per_day: 2,
            cancellation_hours: 24,
        }
    }
}

/// An approved club (an "organization").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Club {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: Option<String>,
    pub description: Option<String>,
    pub court_count: i32,
    pub court_type: String,
    pub assigned_admins: Vec<Uuid>,
    pub membership_enabled: bool,
    pub is_verified: bool,
    pub is_active: bool,
    pub stripe_account_id: Option<String>,
    pub operating_hours: Vec<OperatingHours>,
    pub booking_settings: BookingSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Club {
    /// Builds the club record for an approved submission. The submitter is
    /// the first assigned admin.
    pub fn from_submission(id: String, submission: &ClubSubmission, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: submission.name.clone(),
            email: submission.email.clone(),
            phone: submission.phone.clone(),
            website: submission.website.clone(),
            address: submission.address.clone(),
            city: submission.city.clone(),
            state: submission.state.clone(),
            zip: submission.zip.clone(),
            description: submission.description.clone(),
            court_count: submission.courts,
            court_type: submission.court_type.clone(),
            assigned_admins: vec![submission.submitted_by],
            membership_enabled: false,
            is_verified: true,
            is_active: true,
            stripe_account_id: None,
            operating_hours: default_operating_hours(),
            booking_settings: BookingSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_assigned_admin(&self, user_id: Uuid) -> bool {
        self.assigned_admins.contains(&user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Court {
    pub id: Uuid,
    pub club_id: String,
    pub name: String,
    pub surface: String,
    pub indoor: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Courts created alongside a newly approved club: `Court 1..=count`.
pub fn default_courts(
    club_id: &str,
    count: i32,
    surface: &str,
    now: DateTime<Utc>,
) -> Vec<Court> {
    (1..=count.max(0))
        .map(|n| Court {
            id: Uuid::new_v4(),
            club_id: club_id.to_string(),
            name: format!("Court {n}"),
            surface: surface.to_string(),
            indoor: false,
            is_active: true,
            created_at: now,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Coach {
    pub id: Uuid,
    pub club_id: String,
    pub name: String,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub hourly_rate_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GroupLesson {
    pub id: Uuid,
    pub club_id: String,
    pub title: String,
    pub coach_id: Option<Uuid>,
    pub description: Option<String>,
    pub schedule: String,
    pub capacity: i32,
    pub price_cents: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(MemberRole::Owner),
            "admin" => Some(MemberRole::Admin),
            "member" => Some(MemberRole::Member),
            _ => None,
        }
    }

    pub fn can_manage(&self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Admin)
    }

    fn rank(&self) -> u8 {
        match self {
            MemberRole::Member => 0,
            MemberRole::Admin => 1,
            MemberRole::Owner => 2,
        }
    }

    /// The stronger of two roles; re-granting never demotes.
    pub fn max(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// A user's membership in one club, keyed by `(club_id, user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub club_id: String,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub plan_id: Option<Uuid>,
    pub status: String,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(club_id: &str, user_id: Uuid, role: MemberRole, now: DateTime<Utc>) -> Self {
        Self {
            club_id: club_id.to_string(),
            user_id,
            role,
            plan_id: None,
            status: "active".to_string(),
            joined_at: now,
        }
    }
}

/// Profile edits from a club admin. Absent fields are left untouched, and
/// staff-owned fields (status, admins, payment account) are not part of it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateClubRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "courtType")]
    pub court_type: Option<String>,
    #[serde(rename = "membershipEnabled")]
    pub membership_enabled: Option<bool>,
    #[serde(rename = "operatingHours")]
    pub operating_hours: Option<Vec<OperatingHours>>,
    #[serde(rename = "bookingSettings")]
    pub booking_settings: Option<BookingSettings>,
}

impl UpdateClubRequest {
    pub fn apply_to(&self, club: &mut Club) {
        fn set<T: Clone>(field: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *field = v.clone();
            }
        }
        fn set_opt<T: Clone>(field: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *field = value.clone();
            }
        }
        set(&mut club.name, &self.name);
        set(&mut club.email, &self.email);
        set(&mut club.city, &self.city);
        set(&mut club.state, &self.state);
        set(&mut club.court_type, &self.court_type);
        set(&mut club.membership_enabled, &self.membership_enabled);
        set(&mut club.operating_hours, &self.operating_hours);
        set(&mut club.booking_settings, &self.booking_settings);
        set_opt(&mut club.phone, &self.phone);
        set_opt(&mut club.website, &self.website);
        set_opt(&mut club.address, &self.address);
        set_opt(&mut club.zip, &self.zip);
        set_opt(&mut club.description, &self.description);
    }
}

#[derive(Debug, Deserialize)]
pub struct ClubStatusRequest {
    #[serde(rename = "isVerified")]
    pub is_verified: Option<bool>,
    #[serde(rename = "isActive")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AssignAdminRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CourtRequest {
    pub name: String,
    pub surface: Option<String>,
    pub indoor: Option<bool>,
    #[serde(rename = "isActive")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CoachRequest {
    pub name: String,
    pub email: Option<String>,
    pub bio: Option<String>,
    #[serde(rename = "hourlyRateCents")]
    pub hourly_rate_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GroupLessonRequest {
    pub title: String,
    #[serde(rename = "coachId")]
    pub coach_id: Option<Uuid>,
    pub description: Option<String>,
    pub schedule: String,
    pub capacity: Option<i32>,
    #[serde(rename = "priceCents")]
    pub price_cents: Option<i64>,
}

/// Validates a `HH:MM` 24-hour clock value.
pub fn is_clock_time(s: &str) -> bool {
    let Some((h, m)) = s.split_once(':') else {
        return false;
    };
    if h.len() != 2 || m.len() != 2 {
        return false;
    }
    matches!((h.parse::<u8>(), m.parse::<u8>()), (Ok(h), Ok(m)) if h < 24 && m < 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::submission::ClubSubmission;

    fn submission() -> ClubSubmission {
        ClubSubmission {
            id: Uuid::new_v4(),
            name: "Ace Tennis".into(),
            email: "hello@ace.example".into(),
            phone: None,
            website: Some("https://ace.example".into()),
            address: None,
            city: "Austin".into(),
            state: "TX".into(),
            zip: None,
            description: None,
            courts: 3,
            court_type: "hard".into(),
            status: "pending".into(),
            submitted_by: Uuid::new_v4(),
            submitter_email: "owner@ace.example".into(),
            submitter_name: "Owner".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn club_from_submission_copies_fields_and_defaults() {
        let sub = submission();
        let now = Utc::now();
        let club = Club::from_submission("club-1".into(), &sub, now);
        assert_eq!(club.name, "Ace Tennis");
        assert_eq!(club.website.as_deref(), Some("https://ace.example"));
        assert_eq!(club.court_count, 3);
        assert_eq!(club.assigned_admins, vec![sub.submitted_by]);
        assert!(club.is_active);
        assert!(!club.membership_enabled);
        assert_eq!(club.operating_hours.len(), 7);
        assert_eq!(club.booking_settings, BookingSettings::default());
    }

    #[test]
    fn default_courts_are_numbered_from_one() {
        let courts = default_courts("club-1", 3, "clay", Utc::now());
        let names: Vec<_> = courts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Court 1", "Court 2", "Court 3"]);
        assert!(courts.iter().all(|c| c.surface == "clay" && c.club_id == "club-1"));
        assert!(default_courts("club-1", 0, "clay", Utc::now()).is_empty());
        assert!(default_courts("club-1", -2, "clay", Utc::now()).is_empty());
    }

    #[test]
    fn member_role_max_never_demotes() {
        assert_eq!(MemberRole::Owner.max(MemberRole::Member), MemberRole::Owner);
        assert_eq!(MemberRole::Member.max(MemberRole::Admin), MemberRole::Admin);
        assert!(MemberRole::Admin.can_manage());
        assert!(!MemberRole::Member.can_manage());
    }

    #[test]
    fn test_is_clock_time() {
        assert!(is_clock_time("06:00"));
        assert!(is_clock_time("23:59"));
        assert!(!is_clock_time("24:00"));
        assert!(!is_clock_time("6:00"));
        assert!(!is_clock_time("noon"));
    }
}
