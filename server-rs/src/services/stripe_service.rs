use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::config::StripeConfig;
use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com/v1";
/// Webhook timestamps older (or newer) than this are rejected.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Thin Stripe client over the REST API. Club payments go through Stripe
/// Connect: each club owns an Express account, and products, prices and
/// checkout sessions are created on that account via the `Stripe-Account`
/// header.
#[derive(Clone)]
pub struct StripeClient {
    secret_key: String,
    webhook_secret: String,
    currency: String,
    client: reqwest::Client,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Option<Self> {
        if config.secret_key.is_empty() {
            return None;
        }
        Some(Self {
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            currency: config.currency.clone(),
            client: reqwest::Client::new(),
        })
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> AppResult<Value> {
        let resp = req
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .send()
            .await
            .map_err(|e| AppError::Stripe(format!("request failed: {e}")))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Stripe(format!("unreadable response: {e}")))?;

        if !status.is_success() {
            let msg = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown Stripe error");
            return Err(AppError::Stripe(msg.to_string()));
        }
        Ok(body)
    }

    async fn post(
        &self,
        path: &str,
        params: &[(&str, &str)],
        account: Option<&str>,
    ) -> AppResult<Value> {
        let mut req = self.client.post(format!("{API_BASE}{path}")).form(params);
        if let Some(account) = account {
            req = req.header("Stripe-Account", account);
        }
        self.send(req).await
    }

    async fn get(&self, path: &str) -> AppResult<Value> {
        self.send(self.client.get(format!("{API_BASE}{path}"))).await
    }

    pub async fn create_connect_account(&self, email: &str, club_id: &str) -> AppResult<Value> {
        self.post(
            "/accounts",
            &[
                ("type", "express"),
                ("email", email),
                ("capabilities[card_payments][requested]", "true"),
                ("capabilities[transfers][requested]", "true"),
                ("metadata[clubId]", club_id),
            ],
            None,
        )
        .await
    }

    pub async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> AppResult<Value> {
        self.post(
            "/account_links",
            &[
                ("account", account_id),
                ("refresh_url", refresh_url),
                ("return_url", return_url),
                ("type", "account_onboarding"),
            ],
            None,
        )
        .await
    }

    pub async fn get_account(&self, account_id: &str) -> AppResult<Value> {
        self.get(&format!("/accounts/{account_id}")).await
    }

    pub async fn create_login_link(&self, account_id: &str) -> AppResult<Value> {
        self.post(&format!("/accounts/{account_id}/login_links"), &[], None)
            .await
    }

    pub async fn create_product(
        &self,
        account_id: &str,
        name: &str,
        club_id: &str,
        plan_id: &str,
    ) -> AppResult<Value> {
        self.post(
            "/products",
            &[
                ("name", name),
                ("metadata[clubId]", club_id),
                ("metadata[planId]", plan_id),
            ],
            Some(account_id),
        )
        .await
    }

    /// Prices are immutable in Stripe, so a changed amount or interval means a
    /// new price on the same product.
    pub async fn create_price(
        &self,
        account_id: &str,
        product_id: &str,
        unit_amount_cents: i64,
        interval: &str,
    ) -> AppResult<Value> {
        let amount = unit_amount_cents.to_string();
        self.post(
            "/prices",
            &[
                ("product", product_id),
                ("unit_amount", amount.as_str()),
                ("currency", self.currency.as_str()),
                ("recurring[interval]", interval),
            ],
            Some(account_id),
        )
        .await
    }

    pub async fn archive_product(&self, account_id: &str, product_id: &str) -> AppResult<Value> {
        self.post(
            &format!("/products/{product_id}"),
            &[("active", "false")],
            Some(account_id),
        )
        .await
    }

    pub async fn create_checkout_session(&self, checkout: &MembershipCheckout<'_>) -> AppResult<Value> {
        self.post(
            "/checkout/sessions",
            &[
                ("mode", "subscription"),
                ("line_items[0][price]", checkout.price_id),
                ("line_items[0][quantity]", "1"),
                ("customer_email", checkout.customer_email),
                ("success_url", checkout.success_url),
                ("cancel_url", checkout.cancel_url),
                ("client_reference_id", checkout.user_id),
                ("metadata[clubId]", checkout.club_id),
                ("metadata[userId]", checkout.user_id),
                ("metadata[planId]", checkout.plan_id),
                ("subscription_data[metadata][clubId]", checkout.club_id),
                ("subscription_data[metadata][userId]", checkout.user_id),
                ("subscription_data[metadata][planId]", checkout.plan_id),
            ],
            Some(checkout.account_id),
        )
        .await
    }

    /// Webhooks are only accepted once a signing secret is configured.
    pub fn accepts_webhooks(&self) -> bool {
        !self.webhook_secret.is_empty()
    }

    pub fn verify_webhook_signature(&self, payload: &[u8], signature_header: &str) -> AppResult<Value> {
        verify_signature(
            &self.webhook_secret,
            payload,
            signature_header,
            chrono::Utc::now().timestamp(),
        )
    }
}

/// Everything needed to start a hosted checkout for one membership plan.
pub struct MembershipCheckout<'a> {
    pub account_id: &'a str,
    pub price_id: &'a str,
    pub customer_email: &'a str,
    pub club_id: &'a str,
    pub user_id: &'a str,
    pub plan_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

/// Checks a `Stripe-Signature` header (`t=<ts>,v1=<hex>[,v1=<hex>...]`)
/// against the payload and returns the parsed event.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
    now: i64,
) -> AppResult<Value> {
    if secret.is_empty() {
        return Err(AppError::BadRequest("Webhook signing secret not configured".into()));
    }
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return Err(AppError::BadRequest("Invalid Stripe signature".into()));
    };
    if signatures.is_empty() {
        return Err(AppError::BadRequest("Invalid Stripe signature".into()));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC key error".into()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let valid = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if !valid {
        return Err(AppError::BadRequest(
            "Webhook signature verification failed".into(),
        ));
    }

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::BadRequest("Webhook timestamp too old".into()));
    }

    serde_json::from_slice(payload)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {e}")))
}

/// Produces a header value Stripe would send for `payload` at `timestamp`.
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC key error".into()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"account.updated"}"#;

    #[test]
    fn valid_signature_yields_event() {
        let header = sign_payload(SECRET, PAYLOAD, 1_700_000_000).unwrap();
        let event = verify_signature(SECRET, PAYLOAD, &header, 1_700_000_060).unwrap();
        assert_eq!(event["id"], "evt_1");
    }

    #[test]
    fn any_matching_v1_entry_is_accepted() {
        let good = sign_payload(SECRET, PAYLOAD, 1_700_000_000).unwrap();
        let header = good.replacen("v1=", "v1=deadbeef,v1=", 1);
        assert!(verify_signature(SECRET, PAYLOAD, &header, 1_700_000_000).is_ok());
    }

    #[test]
    fn wrong_secret_or_tampered_body_is_rejected() {
        let header = sign_payload("whsec_other", PAYLOAD, 1_700_000_000).unwrap();
        assert!(verify_signature(SECRET, PAYLOAD, &header, 1_700_000_000).is_err());

        let header = sign_payload(SECRET, PAYLOAD, 1_700_000_000).unwrap();
        let tampered = br#"{"id":"evt_2","type":"account.updated"}"#;
        assert!(verify_signature(SECRET, tampered, &header, 1_700_000_000).is_err());
    }

    #[test]
    fn stale_or_malformed_headers_are_rejected() {
        let header = sign_payload(SECRET, PAYLOAD, 1_700_000_000).unwrap();
        assert!(verify_signature(SECRET, PAYLOAD, &header, 1_700_000_301).is_err());
        assert!(verify_signature(SECRET, PAYLOAD, "v1=abc", 1_700_000_000).is_err());
        assert!(verify_signature(SECRET, PAYLOAD, "t=1700000000", 1_700_000_000).is_err());
    }

    #[test]
    fn empty_secret_never_verifies() {
        let header = sign_payload("", PAYLOAD, 1_700_000_000).unwrap();
        assert!(verify_signature("", PAYLOAD, &header, 1_700_000_000).is_err());
    }
}
