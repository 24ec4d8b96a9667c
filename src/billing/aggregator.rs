use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::models::{
    MemberUsage, Organization, OrganizationBillingSummary, SeatUsage, Subscription, TopMemberUsage,
    UsageAlerts, UsageTotals,
};
use super::pricing::PricingTable;
use super::resolver::SubscriptionResolver;
use crate::error::{AppError, AppResult};

/// Members without a usage row yet default to this limit.
fn default_usage_limit() -> Decimal {
    Decimal::from(5)
}

fn near_limit_threshold() -> Decimal {
    Decimal::from(80)
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Row shape of the member/usage join. Usage columns are `Option` because
/// the join is a left join; a member may not have accrued usage yet.
#[derive(Debug, FromRow)]
struct MemberUsageRow {
    user_id: Uuid,
    user_name: String,
    user_email: String,
    role: String,
    joined_at: DateTime<Utc>,
    current_period_cost: Option<Decimal>,
    usage_limit: Option<Decimal>,
    billing_period_start: Option<DateTime<Utc>>,
    billing_period_end: Option<DateTime<Utc>>,
    last_active: Option<DateTime<Utc>>,
}

/// key: billing-aggregator -> seat totals,member usage
#[derive(Clone)]
pub struct UsageAggregator {
    pool: PgPool,
    resolver: SubscriptionResolver,
    pricing: PricingTable,
}

impl UsageAggregator {
    pub fn new(pool: PgPool) -> Self {
        let resolver = SubscriptionResolver::new(pool.clone());
        Self::with_parts(pool, resolver, PricingTable::from_env())
    }

    pub fn with_parts(pool: PgPool, resolver: SubscriptionResolver, pricing: PricingTable) -> Self {
        Self {
            pool,
            resolver,
            pricing,
        }
    }

    /// Builds the billing summary for an organization. Absent organization
    /// or absent subscription is `Ok(None)`, not an error.
    ///
    /// Fail-closed: store failures propagate to the caller after logging.
    /// A half-computed summary must never render, so unlike the resolver
    /// there is no silent fallback here.
    pub async fn aggregate(
        &self,
        organization_id: Uuid,
    ) -> AppResult<Option<OrganizationBillingSummary>> {
        let organization = sqlx::query_as::<_, Organization>(
            "SELECT id, name, created_at FROM organizations WHERE id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(?e, %organization_id, "DB error loading organization");
            AppError::Db(e)
        })?;

        let Some(organization) = organization else {
            tracing::warn!(%organization_id, "organization not found");
            return Ok(None);
        };

        let Some(subscription) = self.resolver.resolve(organization_id).await else {
            tracing::warn!(%organization_id, "no active subscription for organization");
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, MemberUsageRow>(
            "SELECT m.user_id, u.name AS user_name, u.email AS user_email, m.role, m.joined_at, \
                    s.current_period_cost, s.usage_limit, \
                    s.billing_period_start, s.billing_period_end, s.last_active \
             FROM organization_members m \
             JOIN users u ON u.id = m.user_id \
             LEFT JOIN user_usage_stats s ON s.user_id = m.user_id \
             WHERE m.organization_id = $1 \
             ORDER BY m.joined_at ASC",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(?e, %organization_id, "DB error loading member usage");
            AppError::Db(e)
        })?;

        Ok(Some(build_summary(
            &organization,
            &subscription,
            rows,
            &self.pricing,
        )))
    }

    /// Overwrites a member's usage limit, stamping who changed it and when.
    /// Rejects limits below 1 currency unit before any write. Last writer
    /// wins; there is no optimistic concurrency check.
    pub async fn set_member_usage_limit(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
        new_limit: Decimal,
        acting_admin_id: Uuid,
    ) -> AppResult<()> {
        if new_limit < Decimal::ONE {
            return Err(AppError::Validation(
                "usage limit cannot be below 1".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE user_usage_stats \
             SET usage_limit = $2, limit_set_by = $3, limit_updated_at = NOW() \
             WHERE user_id = $1",
        )
        .bind(member_id)
        .bind(new_limit)
        .bind(acting_admin_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(?e, %organization_id, %member_id, "DB error updating usage limit");
            AppError::Db(e)
        })?;

        if result.rows_affected() == 0 {
            tracing::warn!(%organization_id, %member_id, "no usage record to update");
        } else {
            tracing::info!(
                %organization_id,
                %member_id,
                %acting_admin_id,
                %new_limit,
                "member usage limit updated"
            );
        }
        Ok(())
    }

    /// Whether the user's accrued cost exceeds their limit this period.
    /// Fail-open like the resolver: an outage never locks users out.
    pub async fn has_exceeded_cost_limit(&self, user_id: Uuid) -> bool {
        if !self.resolver.policy().enforce_billing {
            return false;
        }
        let row = sqlx::query_as::<_, (Decimal, Decimal)>(
            "SELECT current_period_cost, usage_limit FROM user_usage_stats WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        match row {
            Ok(Some((cost, limit))) => cost > limit,
            Ok(None) => false,
            Err(error) => {
                tracing::error!(?error, %user_id, "DB error checking cost limit");
                false
            }
        }
    }
}

fn member_usage(row: MemberUsageRow) -> MemberUsage {
    let current_usage = row.current_period_cost.unwrap_or(Decimal::ZERO);
    let usage_limit = row.usage_limit.unwrap_or_else(default_usage_limit);
    let percent_used = if usage_limit.is_zero() {
        Decimal::ZERO
    } else {
        round2(current_usage / usage_limit * Decimal::ONE_HUNDRED)
    };
    MemberUsage {
        user_id: row.user_id,
        user_name: row.user_name,
        user_email: row.user_email,
        role: row.role,
        joined_at: row.joined_at,
        last_active: row.last_active,
        over_limit: current_usage > usage_limit,
        current_usage,
        usage_limit,
        percent_used,
    }
}

fn build_summary(
    organization: &Organization,
    subscription: &Subscription,
    rows: Vec<MemberUsageRow>,
    pricing: &PricingTable,
) -> OrganizationBillingSummary {
    // Billing period comes from the first member row; it is kept consistent
    // across an organization by the accrual path.
    let billing_period_start = rows.first().and_then(|r| r.billing_period_start);
    let billing_period_end = rows.first().and_then(|r| r.billing_period_end);

    let mut members: Vec<MemberUsage> = rows.into_iter().map(member_usage).collect();
    let member_count = members.len() as i64;

    let total_current_usage: Decimal = members.iter().map(|m| m.current_usage).sum();

    // Licensed seats drive billing, not head count. An org with fewer
    // members than seats still pays for every seat.
    let licensed_seats = subscription
        .seats
        .filter(|seats| *seats > 0)
        .map(i64::from)
        .unwrap_or(member_count);

    if member_count > licensed_seats {
        tracing::warn!(
            organization_id = %organization.id,
            licensed_seats,
            actual_members = member_count,
            plan = %subscription.plan,
            "organization has more members than licensed seats"
        );
    }

    let price_per_seat = pricing.price_per_seat(subscription.tier());
    let total_usage_limit = round2(Decimal::from(licensed_seats) * price_per_seat);
    let average = if member_count > 0 {
        round2(total_current_usage / Decimal::from(member_count))
    } else {
        Decimal::ZERO
    };
    let total_current_usage = round2(total_current_usage);
    let percent_used = if total_usage_limit.is_zero() {
        Decimal::ZERO
    } else {
        round2(total_current_usage / total_usage_limit * Decimal::ONE_HUNDRED)
    };

    // Stable sort: members with equal usage keep their join order.
    members.sort_by(|a, b| b.current_usage.cmp(&a.current_usage));

    let members_over_limit = members.iter().filter(|m| m.over_limit).count();
    let members_near_limit = members
        .iter()
        .filter(|m| !m.over_limit && m.percent_used >= near_limit_threshold())
        .count();
    let top_members = members
        .iter()
        .take(5)
        .map(|m| TopMemberUsage {
            name: m.user_name.clone(),
            usage: m.current_usage,
            limit: m.usage_limit,
            percent_used: m.percent_used,
        })
        .collect();

    OrganizationBillingSummary {
        organization_id: organization.id,
        organization_name: organization.name.clone(),
        plan: subscription.plan.clone(),
        status: subscription.status.clone(),
        seats: SeatUsage {
            total: licensed_seats,
            used: member_count,
            available: licensed_seats - member_count,
        },
        usage: UsageTotals {
            total: total_current_usage,
            limit: total_usage_limit,
            average,
            percent_used,
        },
        alerts: UsageAlerts {
            members_over_limit,
            members_near_limit,
        },
        billing_period_start,
        billing_period_end,
        members,
        top_members,
    }
}
