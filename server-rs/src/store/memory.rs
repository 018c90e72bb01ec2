use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::approval::{plan_approval, Approval};
use crate::services::membership::{self, grant_membership};
use crate::store::ClubStore;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    submissions: HashMap<Uuid, ClubSubmission>,
    clubs: HashMap<String, Club>,
    memberships: HashMap<(String, Uuid), Membership>,
    courts: HashMap<Uuid, Court>,
    coaches: HashMap<Uuid, Coach>,
    lessons: HashMap<Uuid, GroupLesson>,
    plans: HashMap<Uuid, MembershipPlan>,
    join_requests: HashMap<Uuid, ClubJoinRequest>,
    lesson_requests: HashMap<Uuid, LessonRequest>,
    stripe_events: HashSet<String>,
}

impl Tables {
    /// Applies a membership grant to the user and membership tables. Callers
    /// hold the write lock, so the read-modify-write cannot interleave.
    fn apply_grant(
        &mut self,
        club_id: &str,
        user_id: Uuid,
        role: MemberRole,
        plan_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Option<User> {
        let user = self.users.get(&user_id)?;
        let key = (club_id.to_string(), user_id);
        let mut grant = grant_membership(user, self.memberships.get(&key), club_id, role, now);
        if plan_id.is_some() {
            grant.membership.plan_id = plan_id;
        }

        let user = self.users.get_mut(&user_id)?;
        user.organizations = grant.organizations;
        user.user_type = grant.user_type;
        let updated = user.clone();
        self.memberships.insert(key, grant.membership);
        Some(updated)
    }
}

/// Store kept entirely in process memory. Every operation runs under one
/// lock, which makes multi-record operations atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_created<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl ClubStore for MemoryStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn create_user(&self, user: &User) -> AppResult<()> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = normalize_email(email);
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn import_user(&self, doc: &LegacyUserDocument) -> AppResult<User> {
        let email = normalize_email(&doc.email);
        let user_type = doc.user_type.as_deref().and_then(UserType::parse);
        let mut t = self.tables.write().await;

        let existing = t.users.values_mut().find(|u| u.email == email);
        let user = match existing {
            Some(user) => {
                user.organizations = doc
                    .organizations
                    .iter()
                    .fold(user.organizations.clone(), |acc, id| {
                        membership::add_organization(&acc, id)
                    });
                if let Some(user_type) = user_type {
                    user.user_type = user_type;
                }
                if let Some(name) = doc.full_name.as_deref().filter(|n| !n.trim().is_empty()) {
                    user.full_name = name.trim().to_string();
                }
                user.clone()
            }
            None => {
                let mut user = User::new(doc.full_name.as_deref().unwrap_or(""), &email, None);
                user.organizations = doc.organizations.clone();
                user.user_type = user_type.unwrap_or(UserType::Member);
                t.users.insert(user.id, user.clone());
                user
            }
        };
        Ok(user)
    }

    async fn count_users_by_type(&self) -> AppResult<Vec<(UserType, i64)>> {
        let t = self.tables.read().await;
        let counts = [UserType::Member, UserType::Admin, UserType::Courtly]
            .into_iter()
            .map(|ut| {
                let n = t.users.values().filter(|u| u.user_type == ut).count() as i64;
                (ut, n)
            })
            .collect();
        Ok(counts)
    }

    async fn insert_submission(&self, submission: &ClubSubmission) -> AppResult<()> {
        let mut t = self.tables.write().await;
        t.submissions.insert(submission.id, submission.clone());
        Ok(())
    }

    async fn get_submission(&self, id: Uuid) -> AppResult<Option<ClubSubmission>> {
        Ok(self.tables.read().await.submissions.get(&id).cloned())
    }

    async fn list_submissions(&self) -> AppResult<Vec<ClubSubmission>> {
        let t = self.tables.read().await;
        let items = t.submissions.values().cloned().collect();
        Ok(by_created(items, |s: &ClubSubmission| s.created_at))
    }

    async fn list_submissions_by_user(&self, user_id: Uuid) -> AppResult<Vec<ClubSubmission>> {
        let t = self.tables.read().await;
        let items = t
            .submissions
            .values()
            .filter(|s| s.submitted_by == user_id)
            .cloned()
            .collect();
        Ok(by_created(items, |s: &ClubSubmission| s.created_at))
    }

    async fn approve_submission(
        &self,
        submission_id: Uuid,
        club_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Approval>> {
        let mut t = self.tables.write().await;
        let Some(submission) = t.submissions.get(&submission_id).cloned() else {
            return Ok(None);
        };
        let submitter = t
            .users
            .get(&submission.submitted_by)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Submitter account not found".into()))?;

        let plan = plan_approval(&submission, &submitter, club_id, now);

        t.submissions.remove(&submission_id);
        t.clubs.insert(plan.club.id.clone(), plan.club.clone());
        for court in &plan.courts {
            t.courts.insert(court.id, court.clone());
        }
        let user = t
            .users
            .get_mut(&submitter.id)
            .ok_or_else(|| AppError::Internal("Submitter vanished under lock".into()))?;
        user.organizations = plan.grant.organizations.clone();
        user.user_type = plan.grant.user_type;
        let submitter = user.clone();
        t.memberships.insert(
            (plan.club.id.clone(), submitter.id),
            plan.grant.membership.clone(),
        );

        Ok(Some(Approval {
            submission_id,
            club: plan.club,
            courts: plan.courts,
            submitter,
        }))
    }

    async fn decline_submission(&self, submission_id: Uuid) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        Ok(t.submissions.remove(&submission_id).is_some())
    }

    async fn list_clubs(&self, active_only: bool) -> AppResult<Vec<Club>> {
        let t = self.tables.read().await;
        let mut clubs: Vec<Club> = t
            .clubs
            .values()
            .filter(|c| !active_only || c.is_active)
            .cloned()
            .collect();
        clubs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(clubs)
    }

    async fn get_club(&self, id: &str) -> AppResult<Option<Club>> {
        Ok(self.tables.read().await.clubs.get(id).cloned())
    }

    async fn update_club_profile(
        &self,
        club_id: &str,
        patch: &UpdateClubRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Club>> {
        let mut t = self.tables.write().await;
        let Some(club) = t.clubs.get_mut(club_id) else {
            return Ok(None);
        };
        patch.apply_to(club);
        club.updated_at = now;
        Ok(Some(club.clone()))
    }

    async fn set_club_status(
        &self,
        club_id: &str,
        is_verified: Option<bool>,
        is_active: Option<bool>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Club>> {
        let mut t = self.tables.write().await;
        let Some(club) = t.clubs.get_mut(club_id) else {
            return Ok(None);
        };
        if let Some(v) = is_verified {
            club.is_verified = v;
        }
        if let Some(v) = is_active {
            club.is_active = v;
        }
        club.updated_at = now;
        Ok(Some(club.clone()))
    }

    async fn delete_club(&self, id: &str) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        if t.clubs.remove(id).is_none() {
            return Ok(false);
        }
        t.memberships.retain(|(club_id, _), _| club_id != id);
        t.courts.retain(|_, c| c.club_id != id);
        t.coaches.retain(|_, c| c.club_id != id);
        t.lessons.retain(|_, l| l.club_id != id);
        t.plans.retain(|_, p| p.club_id != id);
        t.join_requests.retain(|_, r| r.club_id != id);
        t.lesson_requests.retain(|_, r| r.club_id != id);
        for user in t.users.values_mut() {
            user.organizations = membership::remove_organization(&user.organizations, id);
        }
        Ok(true)
    }

    async fn assign_club_admin(
        &self,
        club_id: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<User>> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&user_id) {
            return Ok(None);
        }
        let Some(club) = t.clubs.get_mut(club_id) else {
            return Ok(None);
        };
        if !club.assigned_admins.contains(&user_id) {
            club.assigned_admins.push(user_id);
            club.updated_at = now;
        }
        Ok(t.apply_grant(club_id, user_id, MemberRole::Admin, None, now))
    }

    async fn remove_club_admin(&self, club_id: &str, user_id: Uuid) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        let Some(club) = t.clubs.get_mut(club_id) else {
            return Ok(false);
        };
        let before = club.assigned_admins.len();
        club.assigned_admins.retain(|id| *id != user_id);
        let removed = club.assigned_admins.len() != before;
        if removed {
            if let Some(m) = t.memberships.get_mut(&(club_id.to_string(), user_id)) {
                if m.role == MemberRole::Admin {
                    m.role = MemberRole::Member;
                }
            }
        }
        Ok(removed)
    }

    async fn set_stripe_account(&self, club_id: &str, account_id: &str) -> AppResult<()> {
        let mut t = self.tables.write().await;
        let club = t
            .clubs
            .get_mut(club_id)
            .ok_or_else(|| AppError::NotFound("Club not found".into()))?;
        club.stripe_account_id = Some(account_id.to_string());
        club.updated_at = Utc::now();
        Ok(())
    }

    async fn get_membership(&self, club_id: &str, user_id: Uuid) -> AppResult<Option<Membership>> {
        let t = self.tables.read().await;
        Ok(t.memberships.get(&(club_id.to_string(), user_id)).cloned())
    }

    async fn list_memberships(&self, club_id: &str) -> AppResult<Vec<Membership>> {
        let t = self.tables.read().await;
        let items = t
            .memberships
            .values()
            .filter(|m| m.club_id == club_id)
            .cloned()
            .collect();
        Ok(by_created(items, |m: &Membership| m.joined_at))
    }

    async fn list_courts(&self, club_id: &str) -> AppResult<Vec<Court>> {
        let t = self.tables.read().await;
        let mut courts: Vec<Court> = t
            .courts
            .values()
            .filter(|c| c.club_id == club_id)
            .cloned()
            .collect();
        courts.sort_by(|a, b| (a.created_at, &a.name).cmp(&(b.created_at, &b.name)));
        Ok(courts)
    }

    async fn insert_court(&self, court: &Court) -> AppResult<()> {
        let mut t = self.tables.write().await;
        t.courts.insert(court.id, court.clone());
        Ok(())
    }

    async fn update_court(&self, court: &Court) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        match t.courts.get_mut(&court.id) {
            Some(existing) if existing.club_id == court.club_id => {
                *existing = court.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_court(&self, club_id: &str, court_id: Uuid) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        let owned = t.courts.get(&court_id).is_some_and(|c| c.club_id == club_id);
        if owned {
            t.courts.remove(&court_id);
        }
        Ok(owned)
    }

    async fn list_coaches(&self, club_id: &str) -> AppResult<Vec<Coach>> {
        let t = self.tables.read().await;
        let items = t
            .coaches
            .values()
            .filter(|c| c.club_id == club_id)
            .cloned()
            .collect();
        Ok(by_created(items, |c: &Coach| c.created_at))
    }

    async fn insert_coach(&self, coach: &Coach) -> AppResult<()> {
        let mut t = self.tables.write().await;
        t.coaches.insert(coach.id, coach.clone());
        Ok(())
    }

    async fn delete_coach(&self, club_id: &str, coach_id: Uuid) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        let owned = t.coaches.get(&coach_id).is_some_and(|c| c.club_id == club_id);
        if owned {
            t.coaches.remove(&coach_id);
            for lesson in t.lessons.values_mut() {
                if lesson.coach_id == Some(coach_id) {
                    lesson.coach_id = None;
                }
            }
        }
        Ok(owned)
    }

    async fn list_group_lessons(&self, club_id: &str) -> AppResult<Vec<GroupLesson>> {
        let t = self.tables.read().await;
        let items = t
            .lessons
            .values()
            .filter(|l| l.club_id == club_id)
            .cloned()
            .collect();
        Ok(by_created(items, |l: &GroupLesson| l.created_at))
    }

    async fn insert_group_lesson(&self, lesson: &GroupLesson) -> AppResult<()> {
        let mut t = self.tables.write().await;
        t.lessons.insert(lesson.id, lesson.clone());
        Ok(())
    }

    async fn delete_group_lesson(&self, club_id: &str, lesson_id: Uuid) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        let owned = t.lessons.get(&lesson_id).is_some_and(|l| l.club_id == club_id);
        if owned {
            t.lessons.remove(&lesson_id);
        }
        Ok(owned)
    }

    async fn list_plans(&self, club_id: &str) -> AppResult<Vec<MembershipPlan>> {
        let t = self.tables.read().await;
        let mut plans: Vec<MembershipPlan> = t
            .plans
            .values()
            .filter(|p| p.club_id == club_id)
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.price_cents.cmp(&b.price_cents).then(a.name.cmp(&b.name)));
        Ok(plans)
    }

    async fn get_plan(&self, club_id: &str, plan_id: Uuid) -> AppResult<Option<MembershipPlan>> {
        let t = self.tables.read().await;
        Ok(t.plans.get(&plan_id).filter(|p| p.club_id == club_id).cloned())
    }

    async fn insert_plan(&self, plan: &MembershipPlan) -> AppResult<()> {
        let mut t = self.tables.write().await;
        let duplicate = t
            .plans
            .values()
            .any(|p| p.club_id == plan.club_id && p.name.eq_ignore_ascii_case(&plan.name));
        if duplicate {
            return Err(AppError::Conflict(format!(
                "A plan named '{}' already exists",
                plan.name
            )));
        }
        t.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn update_plan(&self, plan: &MembershipPlan) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        let duplicate = t.plans.values().any(|p| {
            p.id != plan.id && p.club_id == plan.club_id && p.name.eq_ignore_ascii_case(&plan.name)
        });
        if duplicate {
            return Err(AppError::Conflict(format!(
                "A plan named '{}' already exists",
                plan.name
            )));
        }
        match t.plans.get_mut(&plan.id) {
            Some(existing) if existing.club_id == plan.club_id => {
                *existing = plan.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_plan(&self, club_id: &str, plan_id: Uuid) -> AppResult<PlanRemoval> {
        let mut t = self.tables.write().await;
        if !t.plans.get(&plan_id).is_some_and(|p| p.club_id == club_id) {
            return Ok(PlanRemoval::NotFound);
        }
        let referenced = t.memberships.values().any(|m| m.plan_id == Some(plan_id));
        if referenced {
            if let Some(plan) = t.plans.get_mut(&plan_id) {
                plan.is_active = false;
                plan.updated_at = Utc::now();
            }
            Ok(PlanRemoval::Deactivated)
        } else {
            t.plans.remove(&plan_id);
            Ok(PlanRemoval::Deleted)
        }
    }

    async fn insert_join_request(&self, request: &ClubJoinRequest) -> AppResult<()> {
        let mut t = self.tables.write().await;
        let pending = t.join_requests.values().any(|r| {
            r.club_id == request.club_id
                && r.user_id == request.user_id
                && r.status == RequestStatus::Pending
        });
        if pending {
            return Err(AppError::Conflict(
                "You already have a pending request for this club".into(),
            ));
        }
        t.join_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn list_join_requests(&self, club_id: &str) -> AppResult<Vec<ClubJoinRequest>> {
        let t = self.tables.read().await;
        let items = t
            .join_requests
            .values()
            .filter(|r| r.club_id == club_id)
            .cloned()
            .collect();
        Ok(by_created(items, |r: &ClubJoinRequest| r.created_at))
    }

    async fn list_join_requests_by_user(&self, user_id: Uuid) -> AppResult<Vec<ClubJoinRequest>> {
        let t = self.tables.read().await;
        let items = t
            .join_requests
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        Ok(by_created(items, |r: &ClubJoinRequest| r.created_at))
    }

    async fn resolve_join_request(
        &self,
        club_id: &str,
        request_id: Uuid,
        decision: RequestStatus,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ClubJoinRequest>> {
        let mut t = self.tables.write().await;
        let Some(request) = t
            .join_requests
            .get(&request_id)
            .filter(|r| r.club_id == club_id)
            .cloned()
        else {
            return Ok(None);
        };
        if !request.status.can_become(decision) {
            return Err(AppError::Conflict(format!(
                "Request is already {}",
                request.status.as_str()
            )));
        }
        if decision == RequestStatus::Approved
            && t
                .apply_grant(club_id, request.user_id, MemberRole::Member, None, now)
                .is_none()
        {
            return Err(AppError::NotFound("Requesting user no longer exists".into()));
        }

        let resolved = ClubJoinRequest {
            status: decision,
            resolved_at: Some(now),
            ..request
        };
        t.join_requests.insert(request_id, resolved.clone());
        Ok(Some(resolved))
    }

    async fn insert_lesson_request(&self, request: &LessonRequest) -> AppResult<()> {
        let mut t = self.tables.write().await;
        t.lesson_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn list_lesson_requests(&self, club_id: &str) -> AppResult<Vec<LessonRequest>> {
        let t = self.tables.read().await;
        let items = t
            .lesson_requests
            .values()
            .filter(|r| r.club_id == club_id)
            .cloned()
            .collect();
        Ok(by_created(items, |r: &LessonRequest| r.created_at))
    }

    async fn list_lesson_requests_by_user(&self, user_id: Uuid) -> AppResult<Vec<LessonRequest>> {
        let t = self.tables.read().await;
        let items = t
            .lesson_requests
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        Ok(by_created(items, |r: &LessonRequest| r.created_at))
    }

    async fn resolve_lesson_request(
        &self,
        club_id: &str,
        request_id: Uuid,
        decision: RequestStatus,
        now: DateTime<Utc>,
    ) -> AppResult<Option<LessonRequest>> {
        let mut t = self.tables.write().await;
        let Some(request) = t
            .lesson_requests
            .get_mut(&request_id)
            .filter(|r| r.club_id == club_id)
        else {
            return Ok(None);
        };
        if !request.status.can_become(decision) {
            return Err(AppError::Conflict(format!(
                "Request is already {}",
                request.status.as_str()
            )));
        }
        request.status = decision;
        request.resolved_at = Some(now);
        Ok(Some(request.clone()))
    }

    async fn record_stripe_event(&self, event_id: &str, _event_type: &str) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        Ok(t.stripe_events.insert(event_id.to_string()))
    }

    async fn complete_checkout(
        &self,
        event_id: &str,
        checkout: &CheckoutGrant,
        now: DateTime<Utc>,
    ) -> AppResult<CheckoutOutcome> {
        let mut t = self.tables.write().await;
        if t.stripe_events.contains(event_id) {
            return Ok(CheckoutOutcome::Duplicate);
        }
        if !t.clubs.contains_key(&checkout.club_id) {
            return Ok(CheckoutOutcome::Missing);
        }
        let granted = t.apply_grant(
            &checkout.club_id,
            checkout.user_id,
            MemberRole::Member,
            Some(checkout.plan_id),
            now,
        );
        let Some(user) = granted else {
            return Ok(CheckoutOutcome::Missing);
        };
        t.stripe_events.insert(event_id.to_string());
        Ok(CheckoutOutcome::Granted(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn club_with_owner(store: &MemoryStore) -> (Club, User) {
        let owner = User::new("Owner", "owner@example.com", None);
        store.create_user(&owner).await.unwrap();
        let submission = ClubSubmission {
            id: Uuid::new_v4(),
            name: "Ace Tennis".into(),
            email: "hello@ace.example".into(),
            phone: None,
            website: None,
            address: None,
            city: "Austin".into(),
            state: "TX".into(),
            zip: None,
            description: None,
            courts: 2,
            court_type: "hard".into(),
            status: "pending".into(),
            submitted_by: owner.id,
            submitter_email: owner.email.clone(),
            submitter_name: owner.full_name.clone(),
            created_at: Utc::now(),
        };
        store.insert_submission(&submission).await.unwrap();
        let approval = store
            .approve_submission(submission.id, "club-1", Utc::now())
            .await
            .unwrap()
            .unwrap();
        (approval.club, approval.submitter)
    }

    #[tokio::test]
    async fn duplicate_emails_conflict() {
        let store = MemoryStore::new();
        store
            .create_user(&User::new("A", "a@example.com", None))
            .await
            .unwrap();
        let err = store
            .create_user(&User::new("B", "A@example.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn deleting_a_club_cascades() {
        let store = MemoryStore::new();
        let (club, owner) = club_with_owner(&store).await;
        let member = User::new("Member", "member@example.com", None);
        store.create_user(&member).await.unwrap();
        let checkout = CheckoutGrant {
            club_id: club.id.clone(),
            user_id: member.id,
            plan_id: Uuid::new_v4(),
        };
        store.complete_checkout("evt_1", &checkout, Utc::now()).await.unwrap();

        assert!(store.delete_club(&club.id).await.unwrap());

        assert!(store.get_club(&club.id).await.unwrap().is_none());
        assert!(store.list_courts(&club.id).await.unwrap().is_empty());
        assert!(store.list_memberships(&club.id).await.unwrap().is_empty());
        for id in [owner.id, member.id] {
            let user = store.get_user(id).await.unwrap().unwrap();
            assert!(!user.belongs_to(&club.id));
        }
        assert!(!store.delete_club(&club.id).await.unwrap());
    }

    #[tokio::test]
    async fn join_request_approval_grants_membership_once() {
        let store = MemoryStore::new();
        let (club, _) = club_with_owner(&store).await;
        let member = User::new("Member", "member@example.com", None);
        store.create_user(&member).await.unwrap();

        let request = ClubJoinRequest {
            id: Uuid::new_v4(),
            club_id: club.id.clone(),
            user_id: member.id,
            user_name: member.full_name.clone(),
            user_email: member.email.clone(),
            message: None,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };
        store.insert_join_request(&request).await.unwrap();
        let duplicate = ClubJoinRequest {
            id: Uuid::new_v4(),
            ..request.clone()
        };
        assert!(matches!(
            store.insert_join_request(&duplicate).await,
            Err(AppError::Conflict(_))
        ));

        let resolved = store
            .resolve_join_request(&club.id, request.id, RequestStatus::Approved, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, RequestStatus::Approved);

        let user = store.get_user(member.id).await.unwrap().unwrap();
        assert_eq!(user.organizations, vec![club.id.clone()]);
        assert_eq!(user.user_type, UserType::Member);

        let again = store
            .resolve_join_request(&club.id, request.id, RequestStatus::Declined, Utc::now())
            .await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn assigning_an_admin_is_idempotent() {
        let store = MemoryStore::new();
        let (club, _) = club_with_owner(&store).await;
        let helper = User::new("Helper", "helper@example.com", None);
        store.create_user(&helper).await.unwrap();

        for _ in 0..2 {
            let user = store
                .assign_club_admin(&club.id, helper.id, Utc::now())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(user.organizations, vec![club.id.clone()]);
            assert_eq!(user.user_type, UserType::Admin);
        }
        let club = store.get_club(&club.id).await.unwrap().unwrap();
        assert_eq!(club.assigned_admins.len(), 2);

        assert!(store.remove_club_admin(&club.id, helper.id).await.unwrap());
        let m = store.get_membership(&club.id, helper.id).await.unwrap().unwrap();
        assert_eq!(m.role, MemberRole::Member);
    }

    #[tokio::test]
    async fn plans_in_use_are_deactivated_not_deleted() {
        let store = MemoryStore::new();
        let (club, owner) = club_with_owner(&store).await;
        let now = Utc::now();
        let plan = MembershipPlan {
            id: Uuid::new_v4(),
            club_id: club.id.clone(),
            name: "Gold".into(),
            description: None,
            price_cents: 5_000,
            interval: BillingInterval::Month,
            benefits: vec![],
            is_active: true,
            stripe_product_id: None,
            stripe_price_id: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_plan(&plan).await.unwrap();
        let clash = MembershipPlan {
            id: Uuid::new_v4(),
            name: "gold".into(),
            ..plan.clone()
        };
        assert!(matches!(store.insert_plan(&clash).await, Err(AppError::Conflict(_))));

        let checkout = CheckoutGrant {
            club_id: club.id.clone(),
            user_id: owner.id,
            plan_id: plan.id,
        };
        store.complete_checkout("evt_1", &checkout, now).await.unwrap();
        assert_eq!(
            store.delete_plan(&club.id, plan.id).await.unwrap(),
            PlanRemoval::Deactivated
        );
        let stored = store.get_plan(&club.id, plan.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        let membership = store.get_membership(&club.id, owner.id).await.unwrap().unwrap();
        assert_eq!(membership.role, MemberRole::Owner);
        assert_eq!(membership.plan_id, Some(plan.id));
    }

    #[tokio::test]
    async fn stripe_events_are_recorded_once() {
        let store = MemoryStore::new();
        assert!(store.record_stripe_event("evt_1", "checkout.session.completed").await.unwrap());
        assert!(!store.record_stripe_event("evt_1", "checkout.session.completed").await.unwrap());
    }

    #[tokio::test]
    async fn failed_checkout_is_not_recorded() {
        let store = MemoryStore::new();
        let (club, _) = club_with_owner(&store).await;
        let buyer = User::new("Buyer", "buyer@example.com", None);
        let checkout = CheckoutGrant {
            club_id: club.id.clone(),
            user_id: buyer.id,
            plan_id: Uuid::new_v4(),
        };

        let first = store.complete_checkout("evt_9", &checkout, Utc::now()).await.unwrap();
        assert!(matches!(first, CheckoutOutcome::Missing));

        store.create_user(&buyer).await.unwrap();
        let retried = store.complete_checkout("evt_9", &checkout, Utc::now()).await.unwrap();
        let CheckoutOutcome::Granted(user) = retried else {
            panic!("redelivered checkout should grant the membership");
        };
        assert!(user.belongs_to(&club.id));
        let membership = store.get_membership(&club.id, buyer.id).await.unwrap().unwrap();
        assert_eq!(membership.plan_id, Some(checkout.plan_id));

        let again = store.complete_checkout("evt_9", &checkout, Utc::now()).await.unwrap();
        assert!(matches!(again, CheckoutOutcome::Duplicate));
    }

    #[tokio::test]
    async fn profile_edits_keep_admins_and_status() {
        let store = MemoryStore::new();
        let (club, _) = club_with_owner(&store).await;
        let helper = User::new("Helper", "helper@example.com", None);
        store.create_user(&helper).await.unwrap();

        // Staff act between the admin's read and write.
        let stale = store.get_club(&club.id).await.unwrap().unwrap();
        store
            .assign_club_admin(&club.id, helper.id, Utc::now())
            .await
            .unwrap();
        store.set_stripe_account(&club.id, "acct_1").await.unwrap();
        store
            .set_club_status(&club.id, None, Some(false), Utc::now())
            .await
            .unwrap();

        let patch = UpdateClubRequest {
            name: Some(format!("{} Renamed", stale.name)),
            ..Default::default()
        };
        let updated = store
            .update_club_profile(&club.id, &patch, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Ace Tennis Renamed");
        assert_eq!(updated.assigned_admins.len(), 2);
        assert_eq!(updated.stripe_account_id.as_deref(), Some("acct_1"));
        assert!(!updated.is_active);
        assert_eq!(updated.city, "Austin");

        let missing = store
            .update_club_profile("nope", &patch, Utc::now())
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
