// Shared fixtures; not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use saaskit_gateway::audit::MemoryAuditSink;
use saaskit_gateway::auth::SessionAuthenticator;
use saaskit_gateway::entitlement::{EntitlementEvaluator, FeatureGates};
use saaskit_gateway::store::memory::MemoryStore;
use saaskit_gateway::store::{PlanTier, Store, SubscriptionStatus, TenantStatus};
use saaskit_gateway::tenant::{TenantContext, TenantResolver};

/// Test fixture wiring the gateway components over the in-memory store.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub authenticator: SessionAuthenticator,
    pub resolver: TenantResolver,
    pub entitlements: EntitlementEvaluator,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let dyn_store: Arc<dyn Store> = store.clone();

        Self {
            authenticator: SessionAuthenticator::new(dyn_store.clone(), audit.clone()),
            resolver: TenantResolver::new(dyn_store.clone(), audit.clone()),
            entitlements: EntitlementEvaluator::new(dyn_store, test_gates()),
            store,
            audit,
        }
    }

    /// Seed a user with one active tenant and a subscription; returns
    /// (user_id, tenant_id).
    pub async fn seed_member(
        &self,
        username: &str,
        secret: &str,
        tier: PlanTier,
        status: SubscriptionStatus,
    ) -> (Uuid, Uuid) {
        let user_id = self.store.add_user(username, secret).await;
        let tenant_id = self
            .store
            .add_tenant(&format!("{}-org", username), TenantStatus::Active)
            .await;
        self.store.add_membership(user_id, tenant_id).await;
        self.store.set_subscription(tenant_id, tier, status).await;
        (user_id, tenant_id)
    }

    pub fn context_for(&self, user_id: Uuid, tenant_id: Uuid) -> TenantContext {
        TenantContext {
            tenant_id,
            tenant_name: "test-tenant".to_string(),
            user_id,
        }
    }
}

pub fn test_gates() -> FeatureGates {
    FeatureGates::new(
        [
            ("read-only-access", PlanTier::Free),
            ("data-export", PlanTier::Free),
            ("advanced-export", PlanTier::Pro),
            ("sso", PlanTier::Enterprise),
        ],
        ["read-only-access", "data-export"],
    )
}

/// Poll the store until the tenant's subscription reaches the expected
/// status, or fail after a short deadline. Used for the async updater.
pub async fn wait_for_status(
    store: &MemoryStore,
    tenant_id: Uuid,
    expected: SubscriptionStatus,
) -> anyhow::Result<()> {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        let sub = store.get_subscription(tenant_id).await?;
        if sub.map(|s| s.status) == Some(expected) {
            return Ok(());
        }
        if std::time::Instant::now() > deadline {
            anyhow::bail!("subscription never reached {:?}", expected);
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

/// Backdate helper for grace-period scenarios.
pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::days(days)
}
