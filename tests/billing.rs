use billing_backend::billing::{BillingPolicy, SubscriptionResolver, UsageAggregator};
use billing_backend::error::AppError;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

async fn seed_user(pool: &PgPool, name: &str) -> Uuid {
    sqlx::query_scalar("INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(format!("{name}@example.com"))
        .fetch_one(pool)
        .await
        .expect("user")
}

async fn seed_org(pool: &PgPool, name: &str) -> Uuid {
    sqlx::query_scalar("INSERT INTO organizations (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("organization")
}

async fn add_member(pool: &PgPool, organization_id: Uuid, user_id: Uuid) {
    sqlx::query(
        "INSERT INTO organization_members (organization_id, user_id, role) VALUES ($1, $2, 'member')",
    )
    .bind(organization_id)
    .bind(user_id)
    .execute(pool)
    .await
    .expect("membership");
}

async fn seed_subscription(
    pool: &PgPool,
    reference_id: Uuid,
    plan: &str,
    status: &str,
    seats: Option<i32>,
) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO subscriptions (reference_id, plan, status, seats) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(reference_id)
    .bind(plan)
    .bind(status)
    .bind(seats)
    .fetch_one(pool)
    .await
    .expect("subscription")
}

async fn seed_usage(pool: &PgPool, user_id: Uuid, cost: &str, limit: &str) {
    sqlx::query(
        "INSERT INTO user_usage_stats (user_id, current_period_cost, usage_limit) VALUES ($1, $2, $3)",
    )
    .bind(user_id)
    .bind(Decimal::from_str(cost).unwrap())
    .bind(Decimal::from_str(limit).unwrap())
    .execute(pool)
    .await
    .expect("usage row");
}

// key: billing-tests -> seat aggregation,priority resolution
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn aggregate_computes_seat_based_totals(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let organization_id = seed_org(&pool, "Quota Driven Org").await;
    seed_subscription(&pool, organization_id, "team", "active", Some(10)).await;

    let ada = seed_user(&pool, "ada").await;
    let brin = seed_user(&pool, "brin").await;
    let cora = seed_user(&pool, "cora").await;
    let dev = seed_user(&pool, "dev").await;
    for user in [ada, brin, cora, dev] {
        add_member(&pool, organization_id, user).await;
    }
    seed_usage(&pool, ada, "12.345", "20").await;
    // brin has no usage row and falls back to the 0/5 defaults
    seed_usage(&pool, cora, "50", "40").await;
    seed_usage(&pool, dev, "3", "10").await;

    let aggregator = UsageAggregator::new(pool.clone());
    let summary = aggregator
        .aggregate(organization_id)
        .await
        .unwrap()
        .expect("summary for subscribed organization");

    assert_eq!(summary.plan, "team");
    assert_eq!(summary.usage.total, Decimal::from_str("65.35").unwrap());
    assert_eq!(summary.usage.limit, Decimal::from(400));
    assert_eq!(summary.usage.average, Decimal::from_str("16.34").unwrap());
    assert_eq!(summary.alerts.members_over_limit, 1);
    assert_eq!(summary.seats.total, 10);
    assert_eq!(summary.seats.used, 4);
    assert_eq!(summary.seats.available, 6);
    assert_eq!(summary.members[0].user_name, "cora");
    assert_eq!(summary.top_members.len(), 4);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn resolver_prefers_highest_tier_across_memberships(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let user_id = seed_user(&pool, "multi-org").await;
    seed_subscription(&pool, user_id, "pro", "active", None).await;

    let team_org = seed_org(&pool, "Team Org").await;
    add_member(&pool, team_org, user_id).await;
    seed_subscription(&pool, team_org, "team", "active", Some(5)).await;

    let enterprise_org = seed_org(&pool, "Enterprise Org").await;
    add_member(&pool, enterprise_org, user_id).await;
    let winner = seed_subscription(&pool, enterprise_org, "enterprise", "active", Some(50)).await;
    // A canceled enterprise subscription elsewhere must not shadow the winner.
    seed_subscription(&pool, user_id, "enterprise", "canceled", None).await;

    let resolver = SubscriptionResolver::new(pool.clone());
    let resolved = resolver.resolve(user_id).await.expect("resolved plan");
    assert_eq!(resolved.id, winner);
    assert_eq!(resolved.plan, "enterprise");

    assert!(resolver.is_enterprise_plan(user_id).await);
    assert!(resolver.is_team_plan(user_id).await);
    assert!(resolver.is_pro_plan(user_id).await);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn aggregate_is_none_without_active_subscription(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let organization_id = seed_org(&pool, "Unsubscribed Org").await;
    let user_id = seed_user(&pool, "solo").await;
    add_member(&pool, organization_id, user_id).await;

    let aggregator = UsageAggregator::new(pool.clone());
    assert!(aggregator.aggregate(organization_id).await.unwrap().is_none());

    // Unknown organization id behaves the same way.
    assert!(aggregator.aggregate(Uuid::new_v4()).await.unwrap().is_none());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn usage_limit_floor_rejects_without_writing(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let organization_id = seed_org(&pool, "Floor Org").await;
    let admin = seed_user(&pool, "admin").await;
    let member = seed_user(&pool, "member").await;
    add_member(&pool, organization_id, member).await;
    seed_usage(&pool, member, "2", "10").await;

    let aggregator = UsageAggregator::new(pool.clone());
    let rejected = aggregator
        .set_member_usage_limit(
            organization_id,
            member,
            Decimal::from_str("0.5").unwrap(),
            admin,
        )
        .await;
    assert!(matches!(rejected, Err(AppError::Validation(_))));

    let (limit, set_by): (Decimal, Option<Uuid>) = sqlx::query_as(
        "SELECT usage_limit, limit_set_by FROM user_usage_stats WHERE user_id = $1",
    )
    .bind(member)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(limit, Decimal::from(10));
    assert!(set_by.is_none());

    aggregator
        .set_member_usage_limit(organization_id, member, Decimal::from(25), admin)
        .await
        .unwrap();
    let (limit, set_by): (Decimal, Option<Uuid>) = sqlx::query_as(
        "SELECT usage_limit, limit_set_by FROM user_usage_stats WHERE user_id = $1",
    )
    .bind(member)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(limit, Decimal::from(25));
    assert_eq!(set_by, Some(admin));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn disabled_enforcement_passes_every_gate(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let resolver = SubscriptionResolver::with_policy(
        pool.clone(),
        BillingPolicy {
            enforce_billing: false,
        },
    );
    // No seeded rows at all; the gates must still pass.
    let user_id = Uuid::new_v4();
    assert!(resolver.is_pro_plan(user_id).await);
    assert!(resolver.is_team_plan(user_id).await);
    assert!(resolver.is_enterprise_plan(user_id).await);

    let state = resolver.subscription_state(user_id).await;
    assert!(state.is_enterprise);
    assert_eq!(state.plan, "pro");
    assert!(state.highest_priority_subscription.is_none());
}
