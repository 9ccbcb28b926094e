//! In-memory store used by tests and local development.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use async_trait::async_trait;

use crate::auth::session::{secret_digest, Session};

use super::models::{
    PlanTier, Subscription, SubscriptionStatus, SubscriptionTransition, TenantRecord, TenantStatus,
    UserRecord,
};
use super::{Store, StoreError};

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserRecord>,
    tenants: HashMap<Uuid, TenantRecord>,
    memberships: HashMap<Uuid, Vec<Uuid>>,
    subscriptions: HashMap<Uuid, Subscription>,
    history: Vec<SubscriptionTransition>,
    sessions: HashMap<[u8; 32], Session>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with a plaintext secret (digested on the way in).
    pub async fn add_user(&self, username: &str, secret: &str) -> Uuid {
        let id = Uuid::new_v4();
        let record = UserRecord {
            id,
            username: username.to_string(),
            secret_digest: secret_digest(secret),
            created_at: Utc::now(),
        };
        self.inner.write().await.users.insert(username.to_string(), record);
        id
    }

    pub async fn add_tenant(&self, name: &str, status: TenantStatus) -> Uuid {
        let id = Uuid::new_v4();
        let record = TenantRecord {
            id,
            name: name.to_string(),
            status,
            created_at: Utc::now(),
        };
        self.inner.write().await.tenants.insert(id, record);
        id
    }

    pub async fn add_membership(&self, user_id: Uuid, tenant_id: Uuid) {
        self.inner
            .write()
            .await
            .memberships
            .entry(user_id)
            .or_default()
            .push(tenant_id);
    }

    pub async fn set_subscription(
        &self,
        tenant_id: Uuid,
        tier: PlanTier,
        status: SubscriptionStatus,
    ) {
        let now = Utc::now();
        let sub = Subscription {
            tenant_id,
            tier,
            status,
            renews_at: now + chrono::Duration::days(30),
            status_changed_at: now,
        };
        self.inner.write().await.subscriptions.insert(tenant_id, sub);
    }

    /// Backdate when the current subscription status was entered
    /// (grace-period tests).
    pub async fn backdate_subscription_status(&self, tenant_id: Uuid, at: DateTime<Utc>) {
        if let Some(sub) = self.inner.write().await.subscriptions.get_mut(&tenant_id) {
            sub.status_changed_at = at;
        }
    }

    /// Force a session's expiry into the past (expiry tests).
    pub async fn expire_session(&self, token_digest: &[u8; 32]) {
        if let Some(session) = self.inner.write().await.sessions.get_mut(token_digest) {
            session.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    pub async fn transition_history(&self, tenant_id: Uuid) -> Vec<SubscriptionTransition> {
        self.inner
            .read()
            .await
            .history
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.inner.read().await.users.get(username).cloned())
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError> {
        Ok(self.inner.read().await.tenants.get(&tenant_id).cloned())
    }

    async fn get_tenant_memberships(&self, user_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .memberships
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_subscription(&self, tenant_id: Uuid) -> Result<Option<Subscription>, StoreError> {
        Ok(self.inner.read().await.subscriptions.get(&tenant_id).cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .sessions
            .insert(session.token_digest, session.clone());
        Ok(())
    }

    async fn get_session(&self, token_digest: &[u8; 32]) -> Result<Option<Session>, StoreError> {
        Ok(self.inner.read().await.sessions.get(token_digest).cloned())
    }

    async fn revoke_session(&self, token_digest: &[u8; 32]) -> Result<(), StoreError> {
        if let Some(session) = self.inner.write().await.sessions.get_mut(token_digest) {
            session.revoked = true;
        }
        Ok(())
    }

    async fn revoke_user_sessions(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let mut count = 0u64;
        for session in inner.sessions.values_mut() {
            if session.user_id == user_id && !session.revoked {
                session.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, session| session.expires_at > now);
        Ok((before - inner.sessions.len()) as u64)
    }

    async fn update_subscription_status(
        &self,
        tenant_id: Uuid,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
        at: DateTime<Utc>,
    ) -> Result<Subscription, StoreError> {
        let mut inner = self.inner.write().await;
        let sub = inner
            .subscriptions
            .get_mut(&tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("subscription for tenant {}", tenant_id)))?;

        if sub.status != from {
            return Err(StoreError::Conflict(format!(
                "subscription for tenant {} is {}, expected {}",
                tenant_id,
                sub.status.as_str(),
                from.as_str()
            )));
        }

        sub.status = to;
        sub.status_changed_at = at;
        let updated = sub.clone();
        inner.history.push(SubscriptionTransition {
            tenant_id,
            from,
            to,
            at,
        });
        Ok(updated)
    }

    async fn list_past_due_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .subscriptions
            .values()
            .filter(|s| s.status == SubscriptionStatus::PastDue && s.status_changed_at < cutoff)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
