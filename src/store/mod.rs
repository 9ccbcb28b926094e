//! Persistence collaborator seam.
//!
//! The gateway never owns tenant, user, or subscription data; it reaches
//! them through the [`Store`] trait. Two implementations are provided:
//! [`postgres::PostgresStore`] for deployments and [`memory::MemoryStore`]
//! for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::session::Session;
use crate::config;

pub mod memory;
pub mod models;
pub mod postgres;

pub use models::{
    PlanTier, Subscription, SubscriptionStatus, SubscriptionTransition, TenantRecord, TenantStatus,
    UserRecord,
};

/// Errors from the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflicting update: {0}")]
    Conflict(String),

    #[error("store call timed out: {0}")]
    Timeout(&'static str),

    #[error("transient store failure: {0}")]
    Transient(String),
}

impl StoreError {
    /// Timeouts and transient failures may be retried; not-found and
    /// conflicts are definitive answers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Transient(_))
    }
}

/// Narrow interface over the externally owned session, tenant, and
/// subscription stores.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError>;

    /// Tenant ids the user is a member of.
    async fn get_tenant_memberships(&self, user_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    async fn get_subscription(&self, tenant_id: Uuid) -> Result<Option<Subscription>, StoreError>;

    async fn save_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn get_session(&self, token_digest: &[u8; 32]) -> Result<Option<Session>, StoreError>;

    /// Idempotent: revoking an unknown or already-revoked session is a no-op.
    /// Read-after-write: once this returns, `get_session` observes the flag.
    async fn revoke_session(&self, token_digest: &[u8; 32]) -> Result<(), StoreError>;

    /// Revoke every session belonging to a user; returns how many were live.
    async fn revoke_user_sessions(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Delete sessions whose expiry is at or before `now`; returns how
    /// many were removed. Revoked-but-unexpired sessions stay until they
    /// expire so revocation remains observable.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Atomically move a tenant's subscription from `from` to `to` and
    /// append a history entry. Fails with [`StoreError::Conflict`] if the
    /// current status no longer matches `from` (no partial update visible).
    async fn update_subscription_status(
        &self,
        tenant_id: Uuid,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
        at: DateTime<Utc>,
    ) -> Result<Subscription, StoreError>;

    /// Tenants whose subscription entered past_due before the cutoff.
    async fn list_past_due_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Run a store call under the configured deadline, retrying transient
/// failures with bounded linear backoff. Every persistence access in the
/// gateway goes through here so no call can hang or half-apply silently.
pub async fn retrying<T, F, Fut>(op: &'static str, mut call: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let cfg = &config::config().store;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(cfg.call_timeout(), call()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(op)),
        };

        match result {
            Err(e) if e.is_retryable() && attempt < cfg.retry_attempts => {
                tracing::warn!("store call {} failed (attempt {}): {}", op, attempt, e);
                tokio::time::sleep(cfg.retry_backoff() * attempt).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retrying_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StoreError> = retrying("test_op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retrying_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StoreError> = retrying("test_op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(StoreError::Transient("connection reset".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retrying_does_not_retry_not_found() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StoreError> = retrying("test_op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::NotFound("user".into())) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retrying_gives_up_after_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StoreError> = retrying("test_op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Transient("still down".into())) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Transient(_))));
        assert_eq!(
            calls.load(Ordering::SeqCst),
            config::config().store.retry_attempts
        );
    }
}
