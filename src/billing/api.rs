use axum::{
    extract::{Extension, Path},
    routing::{get, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    OrganizationBillingSummary, Subscription, SubscriptionResolver, UsageAggregator,
    UserSubscriptionState,
};
use crate::error::AppResult;

/// key: billing-api -> rest endpoints
pub fn routes() -> Router {
    Router::new()
        .route(
            "/api/billing/organizations/:organization_id/summary",
            get(organization_summary),
        )
        .route(
            "/api/billing/organizations/:organization_id/members/:member_id/usage-limit",
            put(update_member_usage_limit),
        )
        .route(
            "/api/billing/subscriptions/:principal_id",
            get(resolve_subscription),
        )
        .route(
            "/api/billing/users/:user_id/subscription-state",
            get(user_subscription_state),
        )
}

pub async fn organization_summary(
    Extension(pool): Extension<PgPool>,
    Path(organization_id): Path<Uuid>,
) -> AppResult<Json<Option<OrganizationBillingSummary>>> {
    let aggregator = UsageAggregator::new(pool);
    let summary = aggregator.aggregate(organization_id).await?;
    Ok(Json(summary))
}

pub async fn resolve_subscription(
    Extension(pool): Extension<PgPool>,
    Path(principal_id): Path<Uuid>,
) -> Json<Option<Subscription>> {
    let resolver = SubscriptionResolver::new(pool);
    Json(resolver.resolve(principal_id).await)
}

pub async fn user_subscription_state(
    Extension(pool): Extension<PgPool>,
    Path(user_id): Path<Uuid>,
) -> Json<SubscriptionStateResponse> {
    let resolver = SubscriptionResolver::new(pool.clone());
    let aggregator = UsageAggregator::new(pool);
    let state = resolver.subscription_state(user_id).await;
    let has_exceeded_limit = aggregator.has_exceeded_cost_limit(user_id).await;
    Json(SubscriptionStateResponse {
        state,
        has_exceeded_limit,
    })
}

pub async fn update_member_usage_limit(
    Extension(pool): Extension<PgPool>,
    Path((organization_id, member_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateUsageLimitRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let aggregator = UsageAggregator::new(pool);
    aggregator
        .set_member_usage_limit(
            organization_id,
            member_id,
            payload.limit,
            payload.acting_admin_id,
        )
        .await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUsageLimitRequest {
    pub limit: Decimal,
    pub acting_admin_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStateResponse {
    #[serde(flatten)]
    pub state: UserSubscriptionState,
    pub has_exceeded_limit: bool,
}
