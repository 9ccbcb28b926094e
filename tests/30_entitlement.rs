mod common;

use anyhow::Result;
use uuid::Uuid;

use saaskit_gateway::entitlement::{Decision, DenyReason};
use saaskit_gateway::store::{PlanTier, SubscriptionStatus};

use common::TestContext;

#[tokio::test]
async fn free_active_tenant_is_denied_pro_feature() -> Result<()> {
    let ctx = TestContext::new();
    let (user_id, tenant_id) = ctx
        .seed_member("alice", "hunter2", PlanTier::Free, SubscriptionStatus::Active)
        .await;
    let context = ctx.context_for(user_id, tenant_id);

    let decision = ctx.entitlements.check(&context, "advanced-export").await?;
    assert_eq!(decision, Decision::Denied(DenyReason::PlanTooLow));
    Ok(())
}

#[tokio::test]
async fn pro_and_enterprise_get_pro_features() -> Result<()> {
    let ctx = TestContext::new();

    for tier in [PlanTier::Pro, PlanTier::Enterprise] {
        let (user_id, tenant_id) = ctx
            .seed_member(
                &format!("user-{}", tier.as_str()),
                "pw",
                tier,
                SubscriptionStatus::Active,
            )
            .await;
        let context = ctx.context_for(user_id, tenant_id);

        let decision = ctx.entitlements.check(&context, "advanced-export").await?;
        assert_eq!(decision, Decision::Granted, "tier {:?}", tier);
    }
    Ok(())
}

#[tokio::test]
async fn check_is_deterministic_for_unchanged_state() -> Result<()> {
    let ctx = TestContext::new();
    let (user_id, tenant_id) = ctx
        .seed_member("alice", "hunter2", PlanTier::Free, SubscriptionStatus::Active)
        .await;
    let context = ctx.context_for(user_id, tenant_id);

    let first = ctx.entitlements.check(&context, "sso").await?;
    for _ in 0..10 {
        assert_eq!(ctx.entitlements.check(&context, "sso").await?, first);
    }
    Ok(())
}

#[tokio::test]
async fn lapsed_subscription_degrades_to_allowlisted_features() -> Result<()> {
    let ctx = TestContext::new();

    for status in [SubscriptionStatus::PastDue, SubscriptionStatus::Canceled] {
        let (user_id, tenant_id) = ctx
            .seed_member(&format!("user-{}", status.as_str()), "pw", PlanTier::Enterprise, status)
            .await;
        let context = ctx.context_for(user_id, tenant_id);

        // Read-only/export set survives.
        assert_eq!(
            ctx.entitlements.check(&context, "data-export").await?,
            Decision::Granted
        );
        // Everything else is lapsed.
        assert_eq!(
            ctx.entitlements.check(&context, "sso").await?,
            Decision::Denied(DenyReason::SubscriptionLapsed)
        );
    }
    Ok(())
}

#[tokio::test]
async fn tenant_without_subscription_is_lapsed() -> Result<()> {
    let ctx = TestContext::new();
    let user_id = ctx.store.add_user("alice", "hunter2").await;
    let tenant_id = ctx
        .store
        .add_tenant("bare-org", saaskit_gateway::store::TenantStatus::Active)
        .await;
    ctx.store.add_membership(user_id, tenant_id).await;

    let context = ctx.context_for(user_id, tenant_id);
    let decision = ctx.entitlements.check(&context, "advanced-export").await?;
    assert_eq!(decision, Decision::Denied(DenyReason::SubscriptionLapsed));
    Ok(())
}

#[tokio::test]
async fn ungated_features_are_open_to_everyone() -> Result<()> {
    let ctx = TestContext::new();
    let (user_id, tenant_id) = ctx
        .seed_member("alice", "hunter2", PlanTier::Free, SubscriptionStatus::Active)
        .await;
    let context = ctx.context_for(user_id, tenant_id);

    let decision = ctx
        .entitlements
        .check(&context, "some-unregistered-feature")
        .await?;
    assert_eq!(decision, Decision::Granted);
    Ok(())
}

#[tokio::test]
async fn check_does_not_leak_across_tenants() -> Result<()> {
    let ctx = TestContext::new();
    let (user_id, enterprise_tenant) = ctx
        .seed_member("rich", "pw", PlanTier::Enterprise, SubscriptionStatus::Active)
        .await;
    let (_, free_tenant) = ctx
        .seed_member("poor", "pw", PlanTier::Free, SubscriptionStatus::Active)
        .await;

    // Each context is evaluated against its own tenant's subscription.
    let enterprise_ctx = ctx.context_for(user_id, enterprise_tenant);
    assert_eq!(
        ctx.entitlements.check(&enterprise_ctx, "sso").await?,
        Decision::Granted
    );

    let free_ctx = ctx.context_for(Uuid::new_v4(), free_tenant);
    assert_eq!(
        ctx.entitlements.check(&free_ctx, "sso").await?,
        Decision::Denied(DenyReason::PlanTooLow)
    );
    Ok(())
}
