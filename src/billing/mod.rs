pub mod aggregator;
pub mod api;
pub mod models;
pub mod pricing;
pub mod resolver;

pub use aggregator::UsageAggregator;
pub use models::{
    MemberUsage, Organization, OrganizationBillingSummary, PlanTier, SeatUsage, Subscription,
    TopMemberUsage, UsageAlerts, UsageTotals,
};
pub use pricing::PricingTable;
pub use resolver::{
    highest_priority, BillingPolicy, SubscriptionResolver, UserSubscriptionState,
};
