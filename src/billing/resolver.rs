use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{PlanTier, Subscription};
use crate::config;

/// Runtime enforcement toggle injected into the resolver. With enforcement
/// off, every plan gate passes and `subscription_state` reports pro-level
/// access without touching the store.
#[derive(Debug, Clone, Copy)]
pub struct BillingPolicy {
    pub enforce_billing: bool,
}

impl BillingPolicy {
    pub fn from_env() -> Self {
        Self {
            enforce_billing: *config::BILLING_ENFORCEMENT,
        }
    }
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            enforce_billing: true,
        }
    }
}

/// Picks the highest-priority active subscription out of a candidate set.
/// Ties within a tier resolve to the first row encountered, so the caller's
/// query order decides between equals.
pub fn highest_priority(subscriptions: &[Subscription]) -> Option<&Subscription> {
    PlanTier::PAID_DESCENDING
        .iter()
        .find_map(|tier| subscriptions.iter().find(|s| s.matches(*tier)))
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSubscriptionState {
    pub plan: String,
    pub is_free: bool,
    pub is_pro: bool,
    pub is_team: bool,
    pub is_enterprise: bool,
    pub highest_priority_subscription: Option<Subscription>,
}

/// key: billing-resolver -> plan priority resolution
#[derive(Clone)]
pub struct SubscriptionResolver {
    pool: PgPool,
    policy: BillingPolicy,
}

impl SubscriptionResolver {
    pub fn new(pool: PgPool) -> Self {
        Self::with_policy(pool, BillingPolicy::from_env())
    }

    pub fn with_policy(pool: PgPool, policy: BillingPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> &BillingPolicy {
        &self.policy
    }

    /// Resolves the single highest-priority active subscription for a
    /// principal (user or organization). For users this considers both
    /// directly owned subscriptions and those of every organization the
    /// user belongs to.
    ///
    /// Fail-open: a store failure is logged and reads as "no subscription",
    /// so callers see an outage as the free tier. Aggregation takes the
    /// opposite stance; see `UsageAggregator::aggregate`.
    pub async fn resolve(&self, principal_id: Uuid) -> Option<Subscription> {
        match self.fetch_candidates(principal_id).await {
            Ok(candidates) => highest_priority(&candidates).cloned(),
            Err(error) => {
                tracing::error!(
                    ?error,
                    %principal_id,
                    "subscription resolution failed; treating principal as free tier"
                );
                None
            }
        }
    }

    async fn fetch_candidates(&self, principal_id: Uuid) -> Result<Vec<Subscription>, sqlx::Error> {
        let mut candidates = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions \
             WHERE reference_id = $1 AND status = 'active' \
             ORDER BY created_at ASC",
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;

        // Empty for organization principals, which hold no memberships.
        let org_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT organization_id FROM organization_members WHERE user_id = $1",
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;

        if !org_ids.is_empty() {
            let org_subs = sqlx::query_as::<_, Subscription>(
                "SELECT * FROM subscriptions \
                 WHERE reference_id = ANY($1) AND status = 'active' \
                 ORDER BY created_at ASC",
            )
            .bind(&org_ids)
            .fetch_all(&self.pool)
            .await?;
            candidates.extend(org_subs);
        }

        Ok(candidates)
    }

    pub async fn is_pro_plan(&self, user_id: Uuid) -> bool {
        self.meets(user_id, PlanTier::Pro).await
    }

    pub async fn is_team_plan(&self, user_id: Uuid) -> bool {
        self.meets(user_id, PlanTier::Team).await
    }

    pub async fn is_enterprise_plan(&self, user_id: Uuid) -> bool {
        self.meets(user_id, PlanTier::Enterprise).await
    }

    async fn meets(&self, user_id: Uuid, required: PlanTier) -> bool {
        if !self.policy.enforce_billing {
            return true;
        }
        match self.resolve(user_id).await {
            Some(subscription) => {
                let tier = subscription.tier();
                if tier >= required {
                    tracing::info!(%user_id, plan = %subscription.plan, "user meets plan tier");
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Full plan state for a user in one call.
    pub async fn subscription_state(&self, user_id: Uuid) -> UserSubscriptionState {
        if !self.policy.enforce_billing {
            return UserSubscriptionState {
                plan: PlanTier::Pro.as_str().to_string(),
                is_free: false,
                is_pro: true,
                is_team: true,
                is_enterprise: true,
                highest_priority_subscription: None,
            };
        }

        let resolved = self.resolve(user_id).await;
        let tier = resolved
            .as_ref()
            .map(Subscription::tier)
            .unwrap_or(PlanTier::Free);
        UserSubscriptionState {
            plan: tier.as_str().to_string(),
            is_free: tier == PlanTier::Free,
            is_pro: tier >= PlanTier::Pro,
            is_team: tier >= PlanTier::Team,
            is_enterprise: tier >= PlanTier::Enterprise,
            highest_priority_subscription: resolved,
        }
    }
}
