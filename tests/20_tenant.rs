mod common;

use anyhow::Result;
use uuid::Uuid;

use saaskit_gateway::audit::AuditKind;
use saaskit_gateway::auth::Identity;
use saaskit_gateway::error::GatewayError;
use saaskit_gateway::store::{PlanTier, SubscriptionStatus, TenantStatus};

use common::TestContext;

fn identity(user_id: Uuid, username: &str) -> Identity {
    Identity {
        user_id,
        username: username.to_string(),
    }
}

#[tokio::test]
async fn single_membership_resolves_implicitly() -> Result<()> {
    let ctx = TestContext::new();
    let (user_id, tenant_id) = ctx
        .seed_member("alice", "hunter2", PlanTier::Pro, SubscriptionStatus::Active)
        .await;

    let context = ctx.resolver.resolve(&identity(user_id, "alice"), None).await?;
    assert_eq!(context.tenant_id, tenant_id);
    assert_eq!(context.user_id, user_id);
    Ok(())
}

#[tokio::test]
async fn zero_memberships_fail() -> Result<()> {
    let ctx = TestContext::new();
    let user_id = ctx.store.add_user("orphan", "secret").await;

    let result = ctx.resolver.resolve(&identity(user_id, "orphan"), None).await;
    assert!(matches!(result, Err(GatewayError::NoTenantMembership)));
    Ok(())
}

#[tokio::test]
async fn multiple_memberships_require_explicit_selection() -> Result<()> {
    let ctx = TestContext::new();
    let (user_id, first_tenant) = ctx
        .seed_member("alice", "hunter2", PlanTier::Pro, SubscriptionStatus::Active)
        .await;
    let second_tenant = ctx.store.add_tenant("second-org", TenantStatus::Active).await;
    ctx.store.add_membership(user_id, second_tenant).await;

    // Without a selection: ambiguous.
    let result = ctx.resolver.resolve(&identity(user_id, "alice"), None).await;
    assert!(matches!(result, Err(GatewayError::AmbiguousTenant)));

    // With a selection: resolves to the selected tenant.
    let context = ctx
        .resolver
        .resolve(&identity(user_id, "alice"), Some(second_tenant))
        .await?;
    assert_eq!(context.tenant_id, second_tenant);

    let context = ctx
        .resolver
        .resolve(&identity(user_id, "alice"), Some(first_tenant))
        .await?;
    assert_eq!(context.tenant_id, first_tenant);
    Ok(())
}

#[tokio::test]
async fn selecting_a_foreign_tenant_fails() -> Result<()> {
    let ctx = TestContext::new();
    let (user_id, _) = ctx
        .seed_member("alice", "hunter2", PlanTier::Pro, SubscriptionStatus::Active)
        .await;
    let foreign_tenant = ctx.store.add_tenant("other-org", TenantStatus::Active).await;

    let result = ctx
        .resolver
        .resolve(&identity(user_id, "alice"), Some(foreign_tenant))
        .await;
    assert!(matches!(result, Err(GatewayError::NoTenantMembership)));
    Ok(())
}

#[tokio::test]
async fn suspended_and_deleted_tenants_are_unavailable() -> Result<()> {
    let ctx = TestContext::new();

    for status in [TenantStatus::Suspended, TenantStatus::Deleted] {
        let user_id = ctx.store.add_user(&format!("user-{}", status.as_str()), "pw").await;
        let tenant_id = ctx.store.add_tenant("dormant-org", status).await;
        ctx.store.add_membership(user_id, tenant_id).await;

        let result = ctx.resolver.resolve(&identity(user_id, "user"), None).await;
        match result {
            Err(GatewayError::TenantUnavailable(got)) => assert_eq!(got, status),
            other => panic!("expected TenantUnavailable, got {:?}", other),
        }
    }
    Ok(())
}

#[tokio::test]
async fn matching_tenant_access_is_authorized() -> Result<()> {
    let ctx = TestContext::new();
    let (user_id, tenant_id) = ctx
        .seed_member("alice", "hunter2", PlanTier::Pro, SubscriptionStatus::Active)
        .await;

    let context = ctx.context_for(user_id, tenant_id);
    ctx.resolver.authorize_access(&context, tenant_id).await?;
    Ok(())
}

#[tokio::test]
async fn mismatched_tenant_pairs_never_pass_the_isolation_gate() -> Result<()> {
    let ctx = TestContext::new();
    let (user_id, tenant_id) = ctx
        .seed_member("alice", "hunter2", PlanTier::Pro, SubscriptionStatus::Active)
        .await;
    let context = ctx.context_for(user_id, tenant_id);

    // Randomized property check: no mismatched pair is ever granted.
    for _ in 0..200 {
        let foreign = Uuid::new_v4();
        if foreign == context.tenant_id {
            continue;
        }
        let result = ctx.resolver.authorize_access(&context, foreign).await;
        match result {
            Err(GatewayError::CrossTenantAccess { requested, resolved }) => {
                assert_eq!(requested, foreign);
                assert_eq!(resolved, context.tenant_id);
            }
            other => panic!("isolation gate granted a mismatched pair: {:?}", other.is_ok()),
        }
    }
    Ok(())
}

#[tokio::test]
async fn cross_tenant_denial_is_a_security_event() -> Result<()> {
    let ctx = TestContext::new();
    let (user_id, tenant_id) = ctx
        .seed_member("alice", "hunter2", PlanTier::Pro, SubscriptionStatus::Active)
        .await;
    let context = ctx.context_for(user_id, tenant_id);

    let _ = ctx.resolver.authorize_access(&context, Uuid::new_v4()).await;
    assert_eq!(ctx.audit.count(AuditKind::CrossTenantDenied), 1);
    Ok(())
}
