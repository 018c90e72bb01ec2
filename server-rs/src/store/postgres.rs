use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::approval::{plan_approval, Approval};
use crate::services::membership::{self, grant_membership};
use crate::store::ClubStore;

const USER_COLUMNS: &str =
    "id, full_name, email, password_hash, user_type, organizations, created_at";
const CLUB_COLUMNS: &str = "id, name, email, phone, website, address, city, state, zip, \
     description, court_count, court_type, assigned_admins, membership_enabled, is_verified, \
     is_active, stripe_account_id, operating_hours, booking_settings, created_at, updated_at";
const PLAN_COLUMNS: &str = "id, club_id, name, description, price_cents, interval, benefits, \
     is_active, stripe_product_id, stripe_price_id, created_at, updated_at";
const JOIN_REQUEST_COLUMNS: &str =
    "id, club_id, user_id, user_name, user_email, message, status, created_at, resolved_at";
const LESSON_REQUEST_COLUMNS: &str = "id, club_id, user_id, user_name, coach_id, lesson_id, \
     preferred_time, notes, status, created_at, resolved_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    full_name: String,
    email: String,
    password_hash: Option<String>,
    user_type: String,
    organizations: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            full_name: r.full_name,
            email: r.email,
            password_hash: r.password_hash,
            user_type: UserType::parse(&r.user_type).unwrap_or(UserType::Member),
            organizations: r.organizations,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ClubRow {
    id: String,
    name: String,
    email: String,
    phone: Option<String>,
    website: Option<String>,
    address: Option<String>,
    city: String,
    state: String,
    zip: Option<String>,
    description: Option<String>,
    court_count: i32,
    court_type: String,
    assigned_admins: Vec<Uuid>,
    membership_enabled: bool,
    is_verified: bool,
    is_active: bool,
    stripe_account_id: Option<String>,
    operating_hours: Json<Vec<OperatingHours>>,
    booking_settings: Json<BookingSettings>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ClubRow> for Club {
    fn from(r: ClubRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            email: r.email,
            phone: r.phone,
            website: r.website,
            address: r.address,
            city: r.city,
            state: r.state,
            zip: r.zip,
            description: r.description,
            court_count: r.court_count,
            court_type: r.court_type,
            assigned_admins: r.assigned_admins,
            membership_enabled: r.membership_enabled,
            is_verified: r.is_verified,
            is_active: r.is_active,
            stripe_account_id: r.stripe_account_id,
            operating_hours: r.operating_hours.0,
            booking_settings: r.booking_settings.0,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    club_id: String,
    user_id: Uuid,
    role: String,
    plan_id: Option<Uuid>,
    status: String,
    joined_at: DateTime<Utc>,
}

impl From<MembershipRow> for Membership {
    fn from(r: MembershipRow) -> Self {
        Self {
            club_id: r.club_id,
            user_id: r.user_id,
            role: MemberRole::parse(&r.role).unwrap_or(MemberRole::Member),
            plan_id: r.plan_id,
            status: r.status,
            joined_at: r.joined_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    club_id: String,
    name: String,
    description: Option<String>,
    price_cents: i64,
    interval: String,
    benefits: Json<Vec<String>>,
    is_active: bool,
    stripe_product_id: Option<String>,
    stripe_price_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PlanRow> for MembershipPlan {
    fn from(r: PlanRow) -> Self {
        Self {
            id: r.id,
            club_id: r.club_id,
            name: r.name,
            description: r.description,
            price_cents: r.price_cents,
            interval: BillingInterval::parse(&r.interval).unwrap_or(BillingInterval::Month),
            benefits: r.benefits.0,
            is_active: r.is_active,
            stripe_product_id: r.stripe_product_id,
            stripe_price_id: r.stripe_price_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

fn request_status(s: &str) -> RequestStatus {
    RequestStatus::parse(s).unwrap_or(RequestStatus::Pending)
}

#[derive(sqlx::FromRow)]
struct JoinRequestRow {
    id: Uuid,
    club_id: String,
    user_id: Uuid,
    user_name: String,
    user_email: String,
    message: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl From<JoinRequestRow> for ClubJoinRequest {
    fn from(r: JoinRequestRow) -> Self {
        Self {
            id: r.id,
            club_id: r.club_id,
            user_id: r.user_id,
            user_name: r.user_name,
            user_email: r.user_email,
            message: r.message,
            status: request_status(&r.status),
            created_at: r.created_at,
            resolved_at: r.resolved_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LessonRequestRow {
    id: Uuid,
    club_id: String,
    user_id: Uuid,
    user_name: String,
    coach_id: Option<Uuid>,
    lesson_id: Option<Uuid>,
    preferred_time: Option<String>,
    notes: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl From<LessonRequestRow> for LessonRequest {
    fn from(r: LessonRequestRow) -> Self {
        Self {
            id: r.id,
            club_id: r.club_id,
            user_id: r.user_id,
            user_name: r.user_name,
            coach_id: r.coach_id,
            lesson_id: r.lesson_id,
            preferred_time: r.preferred_time,
            notes: r.notes,
            status: request_status(&r.status),
            created_at: r.created_at,
            resolved_at: r.resolved_at,
        }
    }
}

fn conflict_on_unique(e: sqlx::Error, message: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(e),
    }
}

/// Postgres-backed store. Multi-record operations run in one transaction and
/// lock the rows they read before writing.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_user(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> AppResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(User::from))
    }

    async fn write_grant(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        grant: &membership::MembershipGrant,
    ) -> AppResult<()> {
        sqlx::query("UPDATE users SET organizations = $2, user_type = $3 WHERE id = $1")
            .bind(user_id)
            .bind(&grant.organizations)
            .bind(grant.user_type.as_str())
            .execute(&mut **tx)
            .await?;

        let m = &grant.membership;
        sqlx::query(
            "INSERT INTO memberships (club_id, user_id, role, plan_id, status, joined_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (club_id, user_id)
             DO UPDATE SET role = EXCLUDED.role, plan_id = EXCLUDED.plan_id, status = EXCLUDED.status",
        )
        .bind(&m.club_id)
        .bind(m.user_id)
        .bind(m.role.as_str())
        .bind(m.plan_id)
        .bind(&m.status)
        .bind(m.joined_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Locks the user and membership rows, then applies the grant. `None`
    /// when the user does not exist.
    async fn apply_grant(
        tx: &mut Transaction<'_, Postgres>,
        club_id: &str,
        user_id: Uuid,
        role: MemberRole,
        plan_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<User>> {
        let Some(mut user) = Self::lock_user(tx, user_id).await? else {
            return Ok(None);
        };
        let existing: Option<MembershipRow> = sqlx::query_as(
            "SELECT club_id, user_id, role, plan_id, status, joined_at
             FROM memberships WHERE club_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(club_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        let existing = existing.map(Membership::from);

        let mut grant = grant_membership(&user, existing.as_ref(), club_id, role, now);
        if plan_id.is_some() {
            grant.membership.plan_id = plan_id;
        }
        Self::write_grant(tx, user_id, &grant).await?;

        user.organizations = grant.organizations;
        user.user_type = grant.user_type;
        Ok(Some(user))
    }

    async fn club_exists(tx: &mut Transaction<'_, Postgres>, club_id: &str) -> AppResult<bool> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT id FROM organizations WHERE id = $1 FOR UPDATE")
                .bind(club_id)
                .fetch_optional(&mut **tx)
                .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl ClubStore for PgStore {
    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn create_user(&self, user: &User) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO users (id, full_name, email, password_hash, user_type, organizations, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.user_type.as_str())
        .bind(&user.organizations)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Email already registered"))?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(normalize_email(email))
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    async fn import_user(&self, doc: &LegacyUserDocument) -> AppResult<User> {
        let email = normalize_email(&doc.email);
        let user_type = doc.user_type.as_deref().and_then(UserType::parse);
        let full_name = doc
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let mut tx = self.pool.begin().await?;
        let existing: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 FOR UPDATE"
        ))
        .bind(&email)
        .fetch_optional(&mut *tx)
        .await?;

        let user = match existing.map(User::from) {
            Some(mut user) => {
                user.organizations = doc
                    .organizations
                    .iter()
                    .fold(user.organizations, |acc, id| membership::add_organization(&acc, id));
                if let Some(user_type) = user_type {
                    user.user_type = user_type;
                }
                if let Some(name) = full_name {
                    user.full_name = name.to_string();
                }
                sqlx::query(
                    "UPDATE users SET full_name = $2, user_type = $3, organizations = $4 WHERE id = $1",
                )
                .bind(user.id)
                .bind(&user.full_name)
                .bind(user.user_type.as_str())
                .bind(&user.organizations)
                .execute(&mut *tx)
                .await?;
                user
            }
            None => {
                let mut user = User::new(full_name.unwrap_or(""), &email, None);
                user.organizations = doc.organizations.clone();
                user.user_type = user_type.unwrap_or(UserType::Member);
                sqlx::query(
                    "INSERT INTO users (id, full_name, email, user_type, organizations, created_at)
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(user.id)
                .bind(&user.full_name)
                .bind(&user.email)
                .bind(user.user_type.as_str())
                .bind(&user.organizations)
                .bind(user.created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_on_unique(e, "Email imported concurrently"))?;
                user
            }
        };
        tx.commit().await?;
        Ok(user)
    }

    async fn count_users_by_type(&self) -> AppResult<Vec<(UserType, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT user_type, COUNT(*)::bigint FROM users GROUP BY user_type",
        )
        .fetch_all(&self.pool)
        .await?;
        let counts = [UserType::Member, UserType::Admin, UserType::Courtly]
            .into_iter()
            .map(|ut| {
                let n = rows
                    .iter()
                    .find(|(t, _)| t == ut.as_str())
                    .map(|(_, n)| *n)
                    .unwrap_or(0);
                (ut, n)
            })
            .collect();
        Ok(counts)
    }

    async fn insert_submission(&self, s: &ClubSubmission) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO club_submissions (id, name, email, phone, website, address, city, state, zip,
                description, courts, court_type, status, submitted_by, submitter_email, submitter_name, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(s.id)
        .bind(&s.name)
        .bind(&s.email)
        .bind(&s.phone)
        .bind(&s.website)
        .bind(&s.address)
        .bind(&s.city)
        .bind(&s.state)
        .bind(&s.zip)
        .bind(&s.description)
        .bind(s.courts)
        .bind(&s.court_type)
        .bind(&s.status)
        .bind(s.submitted_by)
        .bind(&s.submitter_email)
        .bind(&s.submitter_name)
        .bind(s.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_submission(&self, id: Uuid) -> AppResult<Option<ClubSubmission>> {
        let row = sqlx::query_as("SELECT * FROM club_submissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_submissions(&self) -> AppResult<Vec<ClubSubmission>> {
        let rows = sqlx::query_as("SELECT * FROM club_submissions ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_submissions_by_user(&self, user_id: Uuid) -> AppResult<Vec<ClubSubmission>> {
        let rows = sqlx::query_as(
            "SELECT * FROM club_submissions WHERE submitted_by = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn approve_submission(
        &self,
        submission_id: Uuid,
        club_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Approval>> {
        let mut tx = self.pool.begin().await?;

        // Claiming by delete serializes concurrent approvals on the row lock;
        // the loser sees no row once the winner commits.
        let submission: Option<ClubSubmission> =
            sqlx::query_as("DELETE FROM club_submissions WHERE id = $1 RETURNING *")
                .bind(submission_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(submission) = submission else {
            return Ok(None);
        };
        let submitter = Self::lock_user(&mut tx, submission.submitted_by)
            .await?
            .ok_or_else(|| AppError::NotFound("Submitter account not found".into()))?;

        let plan = plan_approval(&submission, &submitter, club_id, now);
        let club = &plan.club;

        sqlx::query(&format!(
            "INSERT INTO organizations ({CLUB_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"
        ))
        .bind(&club.id)
        .bind(&club.name)
        .bind(&club.email)
        .bind(&club.phone)
        .bind(&club.website)
        .bind(&club.address)
        .bind(&club.city)
        .bind(&club.state)
        .bind(&club.zip)
        .bind(&club.description)
        .bind(club.court_count)
        .bind(&club.court_type)
        .bind(&club.assigned_admins)
        .bind(club.membership_enabled)
        .bind(club.is_verified)
        .bind(club.is_active)
        .bind(&club.stripe_account_id)
        .bind(Json(&club.operating_hours))
        .bind(Json(&club.booking_settings))
        .bind(club.created_at)
        .bind(club.updated_at)
        .execute(&mut *tx)
        .await?;

        for court in &plan.courts {
            sqlx::query(
                "INSERT INTO courts (id, club_id, name, surface, indoor, is_active, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(court.id)
            .bind(&court.club_id)
            .bind(&court.name)
            .bind(&court.surface)
            .bind(court.indoor)
            .bind(court.is_active)
            .bind(court.created_at)
            .execute(&mut *tx)
            .await?;
        }

        Self::write_grant(&mut tx, submitter.id, &plan.grant).await?;
        tx.commit().await?;

        let submitter = User {
            organizations: plan.grant.organizations,
            user_type: plan.grant.user_type,
            ..submitter
        };
        Ok(Some(Approval {
            submission_id,
            club: plan.club,
            courts: plan.courts,
            submitter,
        }))
    }

    async fn decline_submission(&self, submission_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM club_submissions WHERE id = $1")
            .bind(submission_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_clubs(&self, active_only: bool) -> AppResult<Vec<Club>> {
        let rows: Vec<ClubRow> = sqlx::query_as(&format!(
            "SELECT {CLUB_COLUMNS} FROM organizations
             WHERE ($1 = FALSE OR is_active) ORDER BY LOWER(name)"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Club::from).collect())
    }

    async fn get_club(&self, id: &str) -> AppResult<Option<Club>> {
        let row: Option<ClubRow> = sqlx::query_as(&format!(
            "SELECT {CLUB_COLUMNS} FROM organizations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Club::from))
    }

    async fn update_club_profile(
        &self,
        club_id: &str,
        patch: &UpdateClubRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Club>> {
        let row: Option<ClubRow> = sqlx::query_as(&format!(
            "UPDATE organizations SET name = COALESCE($2, name), email = COALESCE($3, email),
                phone = COALESCE($4, phone), website = COALESCE($5, website),
                address = COALESCE($6, address), city = COALESCE($7, city),
                state = COALESCE($8, state), zip = COALESCE($9, zip),
                description = COALESCE($10, description), court_type = COALESCE($11, court_type),
                membership_enabled = COALESCE($12, membership_enabled),
                operating_hours = COALESCE($13, operating_hours),
                booking_settings = COALESCE($14, booking_settings), updated_at = $15
             WHERE id = $1
             RETURNING {CLUB_COLUMNS}"
        ))
        .bind(club_id)
        .bind(&patch.name)
        .bind(&patch.email)
        .bind(&patch.phone)
        .bind(&patch.website)
        .bind(&patch.address)
        .bind(&patch.city)
        .bind(&patch.state)
        .bind(&patch.zip)
        .bind(&patch.description)
        .bind(&patch.court_type)
        .bind(patch.membership_enabled)
        .bind(patch.operating_hours.as_ref().map(Json))
        .bind(patch.booking_settings.as_ref().map(Json))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Club::from))
    }

    async fn set_club_status(
        &self,
        club_id: &str,
        is_verified: Option<bool>,
        is_active: Option<bool>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Club>> {
        let row: Option<ClubRow> = sqlx::query_as(&format!(
            "UPDATE organizations SET is_verified = COALESCE($2, is_verified),
                is_active = COALESCE($3, is_active), updated_at = $4
             WHERE id = $1
             RETURNING {CLUB_COLUMNS}"
        ))
        .bind(club_id)
        .bind(is_verified)
        .bind(is_active)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Club::from))
    }

    async fn delete_club(&self, id: &str) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;
        // Child tables cascade from organizations.
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        sqlx::query(
            "UPDATE users SET organizations = array_remove(organizations, $1)
             WHERE $1 = ANY(organizations)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn assign_club_admin(
        &self,
        club_id: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<User>> {
        let mut tx = self.pool.begin().await?;
        if !Self::club_exists(&mut tx, club_id).await? {
            return Ok(None);
        }
        let Some(user) =
            Self::apply_grant(&mut tx, club_id, user_id, MemberRole::Admin, None, now).await?
        else {
            return Ok(None);
        };
        sqlx::query(
            "UPDATE organizations
             SET assigned_admins = array_append(assigned_admins, $2), updated_at = $3
             WHERE id = $1 AND NOT ($2 = ANY(assigned_admins))",
        )
        .bind(club_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(user))
    }

    async fn remove_club_admin(&self, club_id: &str, user_id: Uuid) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE organizations SET assigned_admins = array_remove(assigned_admins, $2)
             WHERE id = $1 AND $2 = ANY(assigned_admins)",
        )
        .bind(club_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        sqlx::query(
            "UPDATE memberships SET role = 'member'
             WHERE club_id = $1 AND user_id = $2 AND role = 'admin'",
        )
        .bind(club_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn set_stripe_account(&self, club_id: &str, account_id: &str) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE organizations SET stripe_account_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(club_id)
        .bind(account_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Club not found".into()));
        }
        Ok(())
    }

    async fn get_membership(&self, club_id: &str, user_id: Uuid) -> AppResult<Option<Membership>> {
        let row: Option<MembershipRow> = sqlx::query_as(
            "SELECT club_id, user_id, role, plan_id, status, joined_at
             FROM memberships WHERE club_id = $1 AND user_id = $2",
        )
        .bind(club_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Membership::from))
    }

    async fn list_memberships(&self, club_id: &str) -> AppResult<Vec<Membership>> {
        let rows: Vec<MembershipRow> = sqlx::query_as(
            "SELECT club_id, user_id, role, plan_id, status, joined_at
             FROM memberships WHERE club_id = $1 ORDER BY joined_at",
        )
        .bind(club_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Membership::from).collect())
    }

    async fn list_courts(&self, club_id: &str) -> AppResult<Vec<Court>> {
        let rows = sqlx::query_as(
            "SELECT * FROM courts WHERE club_id = $1 ORDER BY created_at, name",
        )
        .bind(club_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_court(&self, court: &Court) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO courts (id, club_id, name, surface, indoor, is_active, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(court.id)
        .bind(&court.club_id)
        .bind(&court.name)
        .bind(&court.surface)
        .bind(court.indoor)
        .bind(court.is_active)
        .bind(court.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_court(&self, court: &Court) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE courts SET name = $3, surface = $4, indoor = $5, is_active = $6
             WHERE id = $1 AND club_id = $2",
        )
        .bind(court.id)
        .bind(&court.club_id)
        .bind(&court.name)
        .bind(&court.surface)
        .bind(court.indoor)
        .bind(court.is_active)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_court(&self, club_id: &str, court_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM courts WHERE id = $1 AND club_id = $2")
            .bind(court_id)
            .bind(club_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_coaches(&self, club_id: &str) -> AppResult<Vec<Coach>> {
        let rows = sqlx::query_as("SELECT * FROM coaches WHERE club_id = $1 ORDER BY created_at")
            .bind(club_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn insert_coach(&self, coach: &Coach) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO coaches (id, club_id, name, email, bio, hourly_rate_cents, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(coach.id)
        .bind(&coach.club_id)
        .bind(&coach.name)
        .bind(&coach.email)
        .bind(&coach.bio)
        .bind(coach.hourly_rate_cents)
        .bind(coach.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_coach(&self, club_id: &str, coach_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM coaches WHERE id = $1 AND club_id = $2")
            .bind(coach_id)
            .bind(club_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_group_lessons(&self, club_id: &str) -> AppResult<Vec<GroupLesson>> {
        let rows =
            sqlx::query_as("SELECT * FROM group_lessons WHERE club_id = $1 ORDER BY created_at")
                .bind(club_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn insert_group_lesson(&self, lesson: &GroupLesson) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO group_lessons (id, club_id, title, coach_id, description, schedule, capacity, price_cents, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(lesson.id)
        .bind(&lesson.club_id)
        .bind(&lesson.title)
        .bind(lesson.coach_id)
        .bind(&lesson.description)
        .bind(&lesson.schedule)
        .bind(lesson.capacity)
        .bind(lesson.price_cents)
        .bind(lesson.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_group_lesson(&self, club_id: &str, lesson_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM group_lessons WHERE id = $1 AND club_id = $2")
            .bind(lesson_id)
            .bind(club_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_plans(&self, club_id: &str) -> AppResult<Vec<MembershipPlan>> {
        let rows: Vec<PlanRow> = sqlx::query_as(&format!(
            "SELECT {PLAN_COLUMNS} FROM membership_plans WHERE club_id = $1 ORDER BY price_cents, name"
        ))
        .bind(club_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MembershipPlan::from).collect())
    }

    async fn get_plan(&self, club_id: &str, plan_id: Uuid) -> AppResult<Option<MembershipPlan>> {
        let row: Option<PlanRow> = sqlx::query_as(&format!(
            "SELECT {PLAN_COLUMNS} FROM membership_plans WHERE id = $1 AND club_id = $2"
        ))
        .bind(plan_id)
        .bind(club_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MembershipPlan::from))
    }

    async fn insert_plan(&self, plan: &MembershipPlan) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO membership_plans ({PLAN_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(plan.id)
        .bind(&plan.club_id)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.price_cents)
        .bind(plan.interval.as_str())
        .bind(Json(&plan.benefits))
        .bind(plan.is_active)
        .bind(&plan.stripe_product_id)
        .bind(&plan.stripe_price_id)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, &format!("A plan named '{}' already exists", plan.name))
        })?;
        Ok(())
    }

    async fn update_plan(&self, plan: &MembershipPlan) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE membership_plans SET name = $3, description = $4, price_cents = $5,
                interval = $6, benefits = $7, is_active = $8, stripe_product_id = $9,
                stripe_price_id = $10, updated_at = $11
             WHERE id = $1 AND club_id = $2",
        )
        .bind(plan.id)
        .bind(&plan.club_id)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.price_cents)
        .bind(plan.interval.as_str())
        .bind(Json(&plan.benefits))
        .bind(plan.is_active)
        .bind(&plan.stripe_product_id)
        .bind(&plan.stripe_price_id)
        .bind(plan.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, &format!("A plan named '{}' already exists", plan.name))
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_plan(&self, club_id: &str, plan_id: Uuid) -> AppResult<PlanRemoval> {
        let mut tx = self.pool.begin().await?;
        let found: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM membership_plans WHERE id = $1 AND club_id = $2 FOR UPDATE",
        )
        .bind(plan_id)
        .bind(club_id)
        .fetch_optional(&mut *tx)
        .await?;
        if found.is_none() {
            return Ok(PlanRemoval::NotFound);
        }

        let in_use: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM memberships WHERE plan_id = $1)")
                .bind(plan_id)
                .fetch_one(&mut *tx)
                .await?;
        let removal = if in_use {
            sqlx::query(
                "UPDATE membership_plans SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
            )
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;
            PlanRemoval::Deactivated
        } else {
            sqlx::query("DELETE FROM membership_plans WHERE id = $1")
                .bind(plan_id)
                .execute(&mut *tx)
                .await?;
            PlanRemoval::Deleted
        };
        tx.commit().await?;
        Ok(removal)
    }

    async fn insert_join_request(&self, r: &ClubJoinRequest) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO club_join_requests ({JOIN_REQUEST_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(r.id)
        .bind(&r.club_id)
        .bind(r.user_id)
        .bind(&r.user_name)
        .bind(&r.user_email)
        .bind(&r.message)
        .bind(r.status.as_str())
        .bind(r.created_at)
        .bind(r.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, "You already have a pending request for this club")
        })?;
        Ok(())
    }

    async fn list_join_requests(&self, club_id: &str) -> AppResult<Vec<ClubJoinRequest>> {
        let rows: Vec<JoinRequestRow> = sqlx::query_as(&format!(
            "SELECT {JOIN_REQUEST_COLUMNS} FROM club_join_requests WHERE club_id = $1 ORDER BY created_at"
        ))
        .bind(club_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ClubJoinRequest::from).collect())
    }

    async fn list_join_requests_by_user(&self, user_id: Uuid) -> AppResult<Vec<ClubJoinRequest>> {
        let rows: Vec<JoinRequestRow> = sqlx::query_as(&format!(
            "SELECT {JOIN_REQUEST_COLUMNS} FROM club_join_requests WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ClubJoinRequest::from).collect())
    }

    async fn resolve_join_request(
        &self,
        club_id: &str,
        request_id: Uuid,
        decision: RequestStatus,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ClubJoinRequest>> {
        let mut tx = self.pool.begin().await?;
        let row: Option<JoinRequestRow> = sqlx::query_as(&format!(
            "SELECT {JOIN_REQUEST_COLUMNS} FROM club_join_requests
             WHERE id = $1 AND club_id = $2 FOR UPDATE"
        ))
        .bind(request_id)
        .bind(club_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(request) = row.map(ClubJoinRequest::from) else {
            return Ok(None);
        };
        if !request.status.can_become(decision) {
            return Err(AppError::Conflict(format!(
                "Request is already {}",
                request.status.as_str()
            )));
        }

        if decision == RequestStatus::Approved
            && Self::apply_grant(&mut tx, club_id, request.user_id, MemberRole::Member, None, now)
                .await?
                .is_none()
        {
            return Err(AppError::NotFound("Requesting user no longer exists".into()));
        }

        sqlx::query("UPDATE club_join_requests SET status = $2, resolved_at = $3 WHERE id = $1")
            .bind(request_id)
            .bind(decision.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(ClubJoinRequest {
            status: decision,
            resolved_at: Some(now),
            ..request
        }))
    }

    async fn insert_lesson_request(&self, r: &LessonRequest) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO lesson_requests ({LESSON_REQUEST_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(r.id)
        .bind(&r.club_id)
        .bind(r.user_id)
        .bind(&r.user_name)
        .bind(r.coach_id)
        .bind(r.lesson_id)
        .bind(&r.preferred_time)
        .bind(&r.notes)
        .bind(r.status.as_str())
        .bind(r.created_at)
        .bind(r.resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_lesson_requests(&self, club_id: &str) -> AppResult<Vec<LessonRequest>> {
        let rows: Vec<LessonRequestRow> = sqlx::query_as(&format!(
            "SELECT {LESSON_REQUEST_COLUMNS} FROM lesson_requests WHERE club_id = $1 ORDER BY created_at"
        ))
        .bind(club_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LessonRequest::from).collect())
    }

    async fn list_lesson_requests_by_user(&self, user_id: Uuid) -> AppResult<Vec<LessonRequest>> {
        let rows: Vec<LessonRequestRow> = sqlx::query_as(&format!(
            "SELECT {LESSON_REQUEST_COLUMNS} FROM lesson_requests WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LessonRequest::from).collect())
    }

    async fn resolve_lesson_request(
        &self,
        club_id: &str,
        request_id: Uuid,
        decision: RequestStatus,
        now: DateTime<Utc>,
    ) -> AppResult<Option<LessonRequest>> {
        let mut tx = self.pool.begin().await?;
        let row: Option<LessonRequestRow> = sqlx::query_as(&format!(
            "SELECT {LESSON_REQUEST_COLUMNS} FROM lesson_requests
             WHERE id = $1 AND club_id = $2 FOR UPDATE"
        ))
        .bind(request_id)
        .bind(club_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(request) = row.map(LessonRequest::from) else {
            return Ok(None);
        };
        if !request.status.can_become(decision) {
            return Err(AppError::Conflict(format!(
                "Request is already {}",
                request.status.as_str()
            )));
        }
        sqlx::query("UPDATE lesson_requests SET status = $2, resolved_at = $3 WHERE id = $1")
            .bind(request_id)
            .bind(decision.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(LessonRequest {
            status: decision,
            resolved_at: Some(now),
            ..request
        }))
    }

    async fn record_stripe_event(&self, event_id: &str, event_type: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO stripe_events (id, event_type) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_checkout(
        &self,
        event_id: &str,
        checkout: &CheckoutGrant,
        now: DateTime<Utc>,
    ) -> AppResult<CheckoutOutcome> {
        let mut tx = self.pool.begin().await?;
        let recorded = sqlx::query(
            "INSERT INTO stripe_events (id, event_type) VALUES ($1, 'checkout.session.completed')
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(event_id)
        .execute(&mut *tx)
        .await?;
        if recorded.rows_affected() == 0 {
            return Ok(CheckoutOutcome::Duplicate);
        }
        if !Self::club_exists(&mut tx, &checkout.club_id).await? {
            return Ok(CheckoutOutcome::Missing);
        }
        let granted = Self::apply_grant(
            &mut tx,
            &checkout.club_id,
            checkout.user_id,
            MemberRole::Member,
            Some(checkout.plan_id),
            now,
        )
        .await?;
        let Some(user) = granted else {
            // Dropping the transaction rolls the event insert back.
            return Ok(CheckoutOutcome::Missing);
        };
        tx.commit().await?;
        Ok(CheckoutOutcome::Granted(user))
    }
}
