use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "month" | "monthly" => Some(BillingInterval::Month),
            "year" | "yearly" | "annual" => Some(BillingInterval::Year),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipPlan {
    pub id: Uuid,
    pub club_id: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub interval: BillingInterval,
    pub benefits: Vec<String>,
    pub is_active: bool,
    pub stripe_product_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entry of the `membershipTiers` map published on a club.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipTier {
    #[serde(rename = "planId")]
    pub plan_id: Uuid,
    #[serde(rename = "stripeProductId")]
    pub stripe_product_id: Option<String>,
    #[serde(rename = "stripePriceId")]
    pub stripe_price_id: Option<String>,
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

/// Derives the tier map keyed by plan name from the plans themselves, so
/// there is no second copy to keep in sync.
pub fn membership_tiers(plans: &[MembershipPlan]) -> BTreeMap<String, MembershipTier> {
    plans
        .iter()
        .map(|p| {
            (
                p.name.clone(),
                MembershipTier {
                    plan_id: p.id,
                    stripe_product_id: p.stripe_product_id.clone(),
                    stripe_price_id: p.stripe_price_id.clone(),
                    is_active: p.is_active,
                },
            )
        })
        .collect()
}

/// Outcome of deleting a plan: plans that memberships still reference are
/// only deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanRemoval {
    Deleted,
    Deactivated,
    NotFound,
}

/// Membership purchase reported by a completed Stripe checkout.
#[derive(Debug, Clone)]
pub struct CheckoutGrant {
    pub club_id: String,
    pub user_id: Uuid,
    pub plan_id: Uuid,
}

#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    Granted(User),
    /// The event was already processed.
    Duplicate,
    /// The club or user does not exist; the event stays unrecorded.
    Missing,
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "priceCents")]
    pub price_cents: i64,
    pub interval: Option<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(rename = "isActive")]
    pub is_active: Option<bool>,
}

impl PlanRequest {
    pub fn validate(&self) -> AppResult<(String, BillingInterval)> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Plan name is required".into()));
        }
        if self.price_cents < 0 {
            return Err(AppError::BadRequest("Price cannot be negative".into()));
        }
        let interval = match self.interval.as_deref() {
            None => BillingInterval::Month,
            Some(s) => BillingInterval::parse(s).ok_or_else(|| {
                AppError::BadRequest("Interval must be 'month' or 'year'".into())
            })?,
        };
        Ok((name.to_string(), interval))
    }

    pub fn clean_benefits(&self) -> Vec<String> {
        self.benefits
            .iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(name: &str, active: bool) -> MembershipPlan {
        let now = Utc::now();
        MembershipPlan {
            id: Uuid::new_v4(),
            club_id: "club-1".into(),
            name: name.into(),
            description: None,
            price_cents: 4_900,
            interval: BillingInterval::Month,
            benefits: vec![],
            is_active: active,
            stripe_product_id: Some(format!("prod_{name}")),
            stripe_price_id: Some(format!("price_{name}")),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn tiers_are_keyed_by_plan_name() {
        let plans = vec![plan("Gold", true), plan("Junior", false)];
        let tiers = membership_tiers(&plans);
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers["Gold"].stripe_price_id.as_deref(), Some("price_Gold"));
        assert!(tiers["Gold"].is_active);
        assert!(!tiers["Junior"].is_active);
    }

    #[test]
    fn plan_request_validation() {
        let mut req = PlanRequest {
            name: " Gold ".into(),
            description: None,
            price_cents: 4_900,
            interval: Some("yearly".into()),
            benefits: vec![" Free balls ".into(), "  ".into()],
            is_active: None,
        };
        let (name, interval) = req.validate().unwrap();
        assert_eq!(name, "Gold");
        assert_eq!(interval, BillingInterval::Year);
        assert_eq!(req.clean_benefits(), vec!["Free balls".to_string()]);

        req.interval = Some("weekly".into());
        assert!(req.validate().is_err());
        req.interval = None;
        req.price_cents = -1;
        assert!(req.validate().is_err());
    }
}
