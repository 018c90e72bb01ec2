use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::{Config, StoreBackend};
use crate::error::AppResult;
use crate::models::*;
use crate::services::approval::Approval;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence for users, clubs and everything hanging off a club.
///
/// Operations that touch more than one record (approval, membership grants,
/// club deletion, request resolution) are atomic: implementations either
/// apply every write or none of them.
#[async_trait]
pub trait ClubStore: Send + Sync {
    async fn ping(&self) -> bool;

    // --- users ---
    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, user: &User) -> AppResult<()>;
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    /// Upserts a user keyed by email, merging organization ids into any
    /// existing list.
    async fn import_user(&self, doc: &LegacyUserDocument) -> AppResult<User>;
    async fn count_users_by_type(&self) -> AppResult<Vec<(UserType, i64)>>;

    // --- club submissions ---
    async fn insert_submission(&self, submission: &ClubSubmission) -> AppResult<()>;
    async fn get_submission(&self, id: Uuid) -> AppResult<Option<ClubSubmission>>;
    async fn list_submissions(&self) -> AppResult<Vec<ClubSubmission>>;
    async fn list_submissions_by_user(&self, user_id: Uuid) -> AppResult<Vec<ClubSubmission>>;
    /// Claims the submission and turns it into club `club_id`. Returns `None`
    /// when the submission does not exist or was already claimed.
    async fn approve_submission(
        &self,
        submission_id: Uuid,
        club_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Approval>>;
    /// Returns `false` when there was nothing to decline.
    async fn decline_submission(&self, submission_id: Uuid) -> AppResult<bool>;

    // --- clubs ---
    async fn list_clubs(&self, active_only: bool) -> AppResult<Vec<Club>>;
    async fn get_club(&self, id: &str) -> AppResult<Option<Club>>;
    /// Applies profile edits only; admins, status and the payment account
    /// keep whatever value the store holds. `None` when the club is missing.
    async fn update_club_profile(
        &self,
        club_id: &str,
        patch: &UpdateClubRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Club>>;
    async fn set_club_status(
        &self,
        club_id: &str,
        is_verified: Option<bool>,
        is_active: Option<bool>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Club>>;
    /// Removes the club, all of its sub-collections and requests, and its id
    /// from every user's organization list.
    async fn delete_club(&self, id: &str) -> AppResult<bool>;
    /// Adds `user_id` to the club's assigned admins and grants an admin
    /// membership. Returns the updated user, or `None` if either is missing.
    async fn assign_club_admin(
        &self,
        club_id: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<User>>;
    async fn remove_club_admin(&self, club_id: &str, user_id: Uuid) -> AppResult<bool>;
    async fn set_stripe_account(&self, club_id: &str, account_id: &str) -> AppResult<()>;

    // --- memberships ---
    async fn get_membership(&self, club_id: &str, user_id: Uuid) -> AppResult<Option<Membership>>;
    async fn list_memberships(&self, club_id: &str) -> AppResult<Vec<Membership>>;

    // --- courts, coaches, group lessons ---
    async fn list_courts(&self, club_id: &str) -> AppResult<Vec<Court>>;
    async fn insert_court(&self, court: &Court) -> AppResult<()>;
    async fn update_court(&self, court: &Court) -> AppResult<bool>;
    async fn delete_court(&self, club_id: &str, court_id: Uuid) -> AppResult<bool>;
    async fn list_coaches(&self, club_id: &str) -> AppResult<Vec<Coach>>;
    async fn insert_coach(&self, coach: &Coach) -> AppResult<()>;
    async fn delete_coach(&self, club_id: &str, coach_id: Uuid) -> AppResult<bool>;
    async fn list_group_lessons(&self, club_id: &str) -> AppResult<Vec<GroupLesson>>;
    async fn insert_group_lesson(&self, lesson: &GroupLesson) -> AppResult<()>;
    async fn delete_group_lesson(&self, club_id: &str, lesson_id: Uuid) -> AppResult<bool>;

    // --- membership plans ---
    async fn list_plans(&self, club_id: &str) -> AppResult<Vec<MembershipPlan>>;
    async fn get_plan(&self, club_id: &str, plan_id: Uuid) -> AppResult<Option<MembershipPlan>>;
    /// Fails with `Conflict` when the club already has a plan with that name.
    async fn insert_plan(&self, plan: &MembershipPlan) -> AppResult<()>;
    async fn update_plan(&self, plan: &MembershipPlan) -> AppResult<bool>;
    async fn delete_plan(&self, club_id: &str, plan_id: Uuid) -> AppResult<PlanRemoval>;

    // --- join requests ---
    /// Fails with `Conflict` when the user already has a pending request for
    /// the club.
    async fn insert_join_request(&self, request: &ClubJoinRequest) -> AppResult<()>;
    async fn list_join_requests(&self, club_id: &str) -> AppResult<Vec<ClubJoinRequest>>;
    async fn list_join_requests_by_user(&self, user_id: Uuid) -> AppResult<Vec<ClubJoinRequest>>;
    /// Moves a pending request to `decision`; approval also grants a member
    /// membership. `None` when missing; `Conflict` when already resolved.
    async fn resolve_join_request(
        &self,
        club_id: &str,
        request_id: Uuid,
        decision: RequestStatus,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ClubJoinRequest>>;

    // --- lesson requests ---
    async fn insert_lesson_request(&self, request: &LessonRequest) -> AppResult<()>;
    async fn list_lesson_requests(&self, club_id: &str) -> AppResult<Vec<LessonRequest>>;
    async fn list_lesson_requests_by_user(&self, user_id: Uuid) -> AppResult<Vec<LessonRequest>>;
    async fn resolve_lesson_request(
        &self,
        club_id: &str,
        request_id: Uuid,
        decision: RequestStatus,
        now: DateTime<Utc>,
    ) -> AppResult<Option<LessonRequest>>;

    // --- payment provider events ---
    /// Records a webhook event id. Returns `false` if it was already seen.
    async fn record_stripe_event(&self, event_id: &str, event_type: &str) -> AppResult<bool>;
    /// Records a paid checkout event and grants the plan membership in one
    /// step. Nothing is recorded unless the grant succeeds, so a failed
    /// event can be redelivered.
    async fn complete_checkout(
        &self,
        event_id: &str,
        checkout: &CheckoutGrant,
        now: DateTime<Utc>,
    ) -> AppResult<CheckoutOutcome>;
}

pub type SharedStore = Arc<dyn ClubStore>;

pub async fn connect(config: &Config) -> AppResult<SharedStore> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = crate::db::create_pool(config).await?;
            crate::db::run_migrations(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}
