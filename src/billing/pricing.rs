use rust_decimal::Decimal;

use super::models::PlanTier;
use crate::config::read_decimal_env;

/// key: billing-pricing -> per-seat price table
///
/// Seat prices keyed by plan tier. The table is the pricing collaborator for
/// aggregation: `total_usage_limit = licensed_seats * price_per_seat(plan)`.
#[derive(Debug, Clone)]
pub struct PricingTable {
    free: Decimal,
    pro: Decimal,
    team: Decimal,
    enterprise: Decimal,
}

impl PricingTable {
    /// Reads per-tier overrides from `BILLING_PRICE_PER_SEAT_<TIER>`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            free: read_decimal_env("BILLING_PRICE_PER_SEAT_FREE", defaults.free),
            pro: read_decimal_env("BILLING_PRICE_PER_SEAT_PRO", defaults.pro),
            team: read_decimal_env("BILLING_PRICE_PER_SEAT_TEAM", defaults.team),
            enterprise: read_decimal_env("BILLING_PRICE_PER_SEAT_ENTERPRISE", defaults.enterprise),
        }
    }

    pub fn price_per_seat(&self, tier: PlanTier) -> Decimal {
        match tier {
            PlanTier::Free => self.free,
            PlanTier::Pro => self.pro,
            PlanTier::Team => self.team,
            PlanTier::Enterprise => self.enterprise,
        }
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            free: Decimal::ZERO,
            pro: Decimal::from(20),
            team: Decimal::from(40),
            enterprise: Decimal::from(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_prices_paid_tiers() {
        let pricing = PricingTable::default();
        assert_eq!(pricing.price_per_seat(PlanTier::Free), Decimal::ZERO);
        assert_eq!(pricing.price_per_seat(PlanTier::Pro), Decimal::from(20));
        assert_eq!(pricing.price_per_seat(PlanTier::Team), Decimal::from(40));
        assert_eq!(
            pricing.price_per_seat(PlanTier::Enterprise),
            Decimal::from(100)
        );
    }
}
