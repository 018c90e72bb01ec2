use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::admin::{ensure_club_admin, load_club};
use crate::middleware::auth::AuthUser;
use crate::models::club::Club;
use crate::models::plan::*;
use crate::AppState;

/// Creates the Stripe product (once) and a fresh price for `plan` on the
/// club's connected account. No-op when payments are not configured or the
/// club has not connected an account yet.
async fn sync_with_stripe(
    state: &AppState,
    club: &Club,
    plan: &mut MembershipPlan,
    reprice: bool,
) -> AppResult<()> {
    let (Some(stripe), Some(account)) = (&state.stripe, club.stripe_account_id.as_deref()) else {
        return Ok(());
    };

    let product_id = match &plan.stripe_product_id {
        Some(id) => id.clone(),
        None => {
            let product = stripe
                .create_product(account, &plan.name, &club.id, &plan.id.to_string())
                .await?;
            let id = product["id"]
                .as_str()
                .ok_or_else(|| AppError::Stripe("product response missing id".into()))?
                .to_string();
            plan.stripe_product_id = Some(id.clone());
            id
        }
    };

    if reprice || plan.stripe_price_id.is_none() {
        let price = stripe
            .create_price(account, &product_id, plan.price_cents, plan.interval.as_str())
            .await?;
        let price_id = price["id"]
            .as_str()
            .ok_or_else(|| AppError::Stripe("price response missing id".into()))?;
        plan.stripe_price_id = Some(price_id.to_string());
    }
    Ok(())
}

pub async fn list_plans(
    State(state): State<AppState>,
    Path(club_id): Path<String>,
) -> AppResult<Json<Value>> {
    load_club(&state, &club_id).await?;
    let plans = state.store.list_plans(&club_id).await?;
    let tiers = membership_tiers(&plans);
    let active: Vec<_> = plans.into_iter().filter(|p| p.is_active).collect();
    Ok(Json(json!({
        "plans": active,
        "membershipTiers": tiers,
    })))
}

pub async fn create_plan(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path(club_id): Path<String>,
    Json(body): Json<PlanRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let (user, club) = ensure_club_admin(&state, &auth, &club_id).await?;
    let (name, interval) = body.validate()?;

    let now = Utc::now();
    let mut plan = MembershipPlan {
        id: Uuid::new_v4(),
        club_id: club.id.clone(),
        name,
        description: body.description.clone(),
        price_cents: body.price_cents,
        interval,
        benefits: body.clean_benefits(),
        is_active: body.is_active.unwrap_or(true),
        stripe_product_id: None,
        stripe_price_id: None,
        created_at: now,
        updated_at: now,
    };
    let duplicate = state
        .store
        .list_plans(&club_id)
        .await?
        .iter()
        .any(|p| p.name.eq_ignore_ascii_case(&plan.name));
    if duplicate {
        return Err(AppError::Conflict(format!(
            "A plan named '{}' already exists",
            plan.name
        )));
    }

    sync_with_stripe(&state, &club, &mut plan, false).await?;
    state.store.insert_plan(&plan).await?;

    tracing::info!(%club_id, plan_id = %plan.id, by = %user.id, "Membership plan created");
    Ok((StatusCode::CREATED, Json(json!({ "plan": plan }))))
}

pub async fn update_plan(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path((club_id, plan_id)): Path<(String, Uuid)>,
    Json(body): Json<PlanRequest>,
) -> AppResult<Json<Value>> {
    let (_, club) = ensure_club_admin(&state, &auth, &club_id).await?;
    let (name, interval) = body.validate()?;
    let existing = state
        .store
        .get_plan(&club_id, plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".into()))?;

    let reprice = existing.price_cents != body.price_cents || existing.interval != interval;
    let mut plan = MembershipPlan {
        name,
        description: body.description.clone(),
        price_cents: body.price_cents,
        interval,
        benefits: body.clean_benefits(),
        is_active: body.is_active.unwrap_or(existing.is_active),
        updated_at: Utc::now(),
        ..existing
    };

    sync_with_stripe(&state, &club, &mut plan, reprice).await?;
    if !state.store.update_plan(&plan).await? {
        return Err(AppError::NotFound("Plan not found".into()));
    }
    Ok(Json(json!({ "plan": plan })))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    auth: axum::Extension<AuthUser>,
    Path((club_id, plan_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    let (_, club) = ensure_club_admin(&state, &auth, &club_id).await?;
    let plan = state
        .store
        .get_plan(&club_id, plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".into()))?;

    let removal = state.store.delete_plan(&club_id, plan_id).await?;
    let outcome = match removal {
        PlanRemoval::NotFound => return Err(AppError::NotFound("Plan not found".into())),
        PlanRemoval::Deactivated => "deactivated",
        PlanRemoval::Deleted => "deleted",
    };

    if let (Some(stripe), Some(account), Some(product)) = (
        &state.stripe,
        club.stripe_account_id.as_deref(),
        plan.stripe_product_id.as_deref(),
    ) {
        if let Err(e) = stripe.archive_product(account, product).await {
            tracing::warn!(%club_id, %plan_id, "Could not archive Stripe product: {e}");
        }
    }

    Ok(Json(json!({ "success": true, "result": outcome })))
}
