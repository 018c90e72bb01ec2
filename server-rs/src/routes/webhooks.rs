use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::plan::{CheckoutGrant, CheckoutOutcome};
use crate::AppState;

fn metadata_uuid(metadata: &Value, key: &str) -> AppResult<Uuid> {
    metadata[key]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AppError::BadRequest(format!("checkout metadata missing {key}")))
}

fn checkout_grant(session: &Value) -> AppResult<CheckoutGrant> {
    let metadata = &session["metadata"];
    let club_id = metadata["clubId"]
        .as_str()
        .ok_or_else(|| AppError::BadRequest("checkout metadata missing clubId".into()))?;
    Ok(CheckoutGrant {
        club_id: club_id.to_string(),
        user_id: metadata_uuid(metadata, "userId")?,
        plan_id: metadata_uuid(metadata, "planId")?,
    })
}

/// A completed checkout makes the buyer an active member on the plan. The
/// event is only recorded together with the grant, so any failure answers
/// 5xx and leaves Stripe free to redeliver it.
async fn checkout_completed(
    state: &AppState,
    event_id: &str,
    session: &Value,
) -> Result<StatusCode, StatusCode> {
    let grant = match checkout_grant(session) {
        Ok(g) => g,
        Err(e) => {
            // Retrying cannot fix a session we did not create.
            tracing::warn!(%event_id, "Ignoring checkout event: {e}");
            return Ok(StatusCode::OK);
        }
    };

    match state.store.complete_checkout(event_id, &grant, Utc::now()).await {
        Ok(CheckoutOutcome::Granted(_)) => {
            tracing::info!(
                club_id = %grant.club_id,
                user_id = %grant.user_id,
                plan_id = %grant.plan_id,
                "Membership purchased"
            );
            Ok(StatusCode::OK)
        }
        Ok(CheckoutOutcome::Duplicate) => {
            tracing::debug!(%event_id, "Duplicate Stripe event ignored");
            Ok(StatusCode::OK)
        }
        Ok(CheckoutOutcome::Missing) => {
            tracing::error!(
                %event_id,
                club_id = %grant.club_id,
                user_id = %grant.user_id,
                "Checkout for unknown club or user; awaiting redelivery"
            );
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(e) => {
            tracing::error!(%event_id, "Stripe checkout processing failed: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let Some(stripe) = &state.stripe else {
        return Ok(StatusCode::OK);
    };
    if !stripe.accepts_webhooks() {
        tracing::error!("Stripe webhook received but STRIPE_WEBHOOK_SECRET is not set");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let sig = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let event = match stripe.verify_webhook_signature(&body, sig) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("Rejected Stripe webhook: {e}");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let event_id = event["id"].as_str().unwrap_or("");
    let event_type = event["type"].as_str().unwrap_or("");
    if event_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let object = &event["data"]["object"];
    if event_type == "checkout.session.completed" {
        return checkout_completed(&state, event_id, object).await;
    }

    // Other events only log, so recording first is enough to drop redeliveries.
    match state.store.record_stripe_event(event_id, event_type).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(%event_id, "Duplicate Stripe event ignored");
            return Ok(StatusCode::OK);
        }
        Err(e) => {
            tracing::error!(%event_id, "Could not record Stripe event: {e}");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    if event_type == "account.updated" {
        tracing::info!(
            account_id = object["id"].as_str().unwrap_or(""),
            charges_enabled = object["charges_enabled"].as_bool().unwrap_or(false),
            payouts_enabled = object["payouts_enabled"].as_bool().unwrap_or(false),
            "Connected account updated"
        );
    }
    Ok(StatusCode::OK)
}
