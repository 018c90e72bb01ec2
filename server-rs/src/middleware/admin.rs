use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{current_user, AuthUser};
use crate::models::club::{Club, Membership};
use crate::models::user::User;
use crate::AppState;

/// Platform staff loaded by [`require_staff`].
#[derive(Debug, Clone)]
pub struct StaffUser(pub User);

/// Middleware: requires a `courtly` account. Runs after `authenticate`.
pub async fn require_staff(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth = req
        .extensions()
        .get::<AuthUser>()
        .copied()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    let user = current_user(&state, &auth).await?;
    if !user.user_type.is_staff() {
        return Err(AppError::Forbidden("Requires Courtly staff".into()));
    }
    req.extensions_mut().insert(StaffUser(user));
    Ok(next.run(req).await)
}

/// Whether `user` may manage `club`: staff, an assigned admin, or an
/// owner/admin member.
pub fn can_manage_club(user: &User, club: &Club, membership: Option<&Membership>) -> bool {
    user.user_type.is_staff()
        || club.is_assigned_admin(user.id)
        || membership.is_some_and(|m| m.role.can_manage())
}

/// Loads the club and the caller, failing unless the caller can manage it.
pub async fn ensure_club_admin(
    state: &AppState,
    auth: &AuthUser,
    club_id: &str,
) -> AppResult<(User, Club)> {
    let club = load_club(state, club_id).await?;
    let user = current_user(state, auth).await?;
    let membership = state.store.get_membership(club_id, user.id).await?;
    if !can_manage_club(&user, &club, membership.as_ref()) {
        return Err(AppError::Forbidden(
            "Only club admins can manage this club".into(),
        ));
    }
    Ok((user, club))
}

pub async fn load_club(state: &AppState, club_id: &str) -> AppResult<Club> {
    state
        .store
        .get_club(club_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Club not found".into()))
}
