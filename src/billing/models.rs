use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// key: billing-models -> plans,subscriptions,usage
///
/// Plan tiers in ascending priority. The derived `Ord` is the resolution
/// order: when a principal holds several active subscriptions the greatest
/// tier wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
    Team,
    Enterprise,
}

impl PlanTier {
    /// Paid tiers, highest priority first.
    pub const PAID_DESCENDING: [PlanTier; 3] = [PlanTier::Enterprise, PlanTier::Team, PlanTier::Pro];

    pub fn parse(raw: &str) -> PlanTier {
        match raw {
            "enterprise" => PlanTier::Enterprise,
            "team" => PlanTier::Team,
            "pro" => PlanTier::Pro,
            _ => PlanTier::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Team => "team",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// key: billing-subscription-model -> principal ownership
///
/// `reference_id` points at the owning principal, which is either a user or
/// an organization. Only `status = 'active'` rows participate in resolution.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub reference_id: Uuid,
    pub plan: String,
    pub status: String,
    pub seats: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    pub fn tier(&self) -> PlanTier {
        PlanTier::parse(&self.plan)
    }

    pub fn matches(&self, tier: PlanTier) -> bool {
        self.is_active() && self.tier() == tier
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Per-member usage projection. Usage rows are joined lazily; a member
/// without one gets usage 0 and the default limit of 5.
#[derive(Debug, Clone, Serialize)]
pub struct MemberUsage {
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub last_active: Option<DateTime<Utc>>,
    pub current_usage: Decimal,
    pub usage_limit: Decimal,
    pub percent_used: Decimal,
    pub over_limit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopMemberUsage {
    pub name: String,
    pub usage: Decimal,
    pub limit: Decimal,
    pub percent_used: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatUsage {
    pub total: i64,
    pub used: i64,
    pub available: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageTotals {
    pub total: Decimal,
    pub limit: Decimal,
    pub average: Decimal,
    pub percent_used: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageAlerts {
    pub members_over_limit: usize,
    pub members_near_limit: usize,
}

/// Read-only projection for the admin dashboard; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationBillingSummary {
    pub organization_id: Uuid,
    pub organization_name: String,
    pub plan: String,
    pub status: String,
    pub seats: SeatUsage,
    pub usage: UsageTotals,
    pub alerts: UsageAlerts,
    pub billing_period_start: Option<DateTime<Utc>>,
    pub billing_period_end: Option<DateTime<Utc>>,
    pub members: Vec<MemberUsage>,
    pub top_members: Vec<TopMemberUsage>,
}
