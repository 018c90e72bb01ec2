use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::admin::{ensure_club_admin, load_club};
use crate::middleware::auth::{current_user, AuthUser};
use crate::services::stripe_service::{MembershipCheckout, StripeClient};
use crate::AppState;

fn stripe(state: &AppState) -> AppResult<&StripeClient> {
    state
        .stripe
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("Payments are not configured".into()))
}

fn url_field(value: &Value) -> AppResult<String> {
    value["url"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| AppError::Stripe("response missing url".into()))
}

/// Starts or resumes Connect onboarding, creating the club's Express account
/// on first use.
pub async fn onboard(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
) -> AppResult<Json<Value>> {
    let (user, club) = ensure_club_admin(&state, &auth, &club_id).await?;
    let stripe = stripe(&state)?;

    let account_id = match club.stripe_account_id {
        Some(id) => id,
        None => {
            let account = stripe.create_connect_account(&club.email, &club.id).await?;
            let id = account["id"]
                .as_str()
                .ok_or_else(|| AppError::Stripe("account response missing id".into()))?
                .to_string();
            state.store.set_stripe_account(&club.id, &id).await?;
            tracing::info!(%club_id, account_id = %id, by = %user.id, "Stripe account created");
            id
        }
    };

    let link = stripe
        .create_account_link(
            &account_id,
            &state.config.app_url(&state.config.stripe.connect_refresh_path),
            &state.config.app_url(&state.config.stripe.connect_return_path),
        )
        .await?;
    Ok(Json(json!({
        "accountId": account_id,
        "url": url_field(&link)?,
    })))
}

pub async fn status(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
) -> AppResult<Json<Value>> {
    let (_, club) = ensure_club_admin(&state, &auth, &club_id).await?;
    let Some(account_id) = club.stripe_account_id else {
        return Ok(Json(json!({ "connected": false })));
    };

    let account = stripe(&state)?.get_account(&account_id).await?;
    Ok(Json(json!({
        "connected": true,
        "accountId": account_id,
        "chargesEnabled": account["charges_enabled"].as_bool().unwrap_or(false),
        "payoutsEnabled": account["payouts_enabled"].as_bool().unwrap_or(false),
        "detailsSubmitted": account["details_submitted"].as_bool().unwrap_or(false),
    })))
}

pub async fn dashboard_link(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
) -> AppResult<Json<Value>> {
    let (_, club) = ensure_club_admin(&state, &auth, &club_id).await?;
    let account_id = club
        .stripe_account_id
        .ok_or_else(|| AppError::BadRequest("Club has not connected Stripe".into()))?;

    let link = stripe(&state)?.create_login_link(&account_id).await?;
    Ok(Json(json!({ "url": url_field(&link)? })))
}

pub async fn checkout(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path((club_id, plan_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    let club = load_club(&state, &club_id).await?;
    if !club.is_active || !club.membership_enabled {
        return Err(AppError::BadRequest(
            "This club is not accepting memberships".into(),
        ));
    }
    let account_id = club
        .stripe_account_id
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("This club cannot take payments yet".into()))?;

    let plan = state
        .store
        .get_plan(&club_id, plan_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound("Plan not found".into()))?;
    let price_id = plan
        .stripe_price_id
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Plan is not available for purchase".into()))?;

    let user = current_user(&state, &auth).await?;
    let user_id = user.id.to_string();
    let plan_id = plan.id.to_string();
    let success_url = state.config.app_url(&state.config.stripe.checkout_success_path);
    let cancel_url = state.config.app_url(&state.config.stripe.checkout_cancel_path);

    let session = stripe(&state)?
        .create_checkout_session(&MembershipCheckout {
            account_id,
            price_id,
            customer_email: &user.email,
            club_id: &club.id,
            user_id: &user_id,
            plan_id: &plan_id,
            success_url: &success_url,
            cancel_url: &cancel_url,
        })
        .await?;

    Ok(Json(json!({
        "sessionId": session["id"],
        "url": url_field(&session)?,
    })))
}
