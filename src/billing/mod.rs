//! Subscription lifecycle: provider event intake and the status machine.
//!
//! Provider notifications arrive webhook-style and are funneled through a
//! single-writer updater task, so every status transition is applied by
//! exactly one writer and duplicates (keyed by the provider event id) are
//! dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::config;
use crate::error::GatewayError;
use crate::store::{self, Store, StoreError, SubscriptionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderEventKind {
    /// First payment on a trial, or a successful retry on past_due.
    PaymentSucceeded,
    /// A renewal charge failed.
    PaymentFailed,
    /// Explicit cancellation.
    SubscriptionCanceled,
}

impl ProviderEventKind {
    /// Target status for this notification given the current status, or
    /// None when the event does not move the machine (already-applied
    /// duplicates, out-of-order deliveries).
    pub fn target(&self, current: SubscriptionStatus) -> Option<SubscriptionStatus> {
        use SubscriptionStatus::*;
        match (self, current) {
            (ProviderEventKind::PaymentSucceeded, Trialing) => Some(Active),
            (ProviderEventKind::PaymentSucceeded, PastDue) => Some(Active),
            (ProviderEventKind::PaymentFailed, Active) => Some(PastDue),
            (ProviderEventKind::SubscriptionCanceled, Trialing)
            | (ProviderEventKind::SubscriptionCanceled, Active)
            | (ProviderEventKind::SubscriptionCanceled, PastDue) => Some(Canceled),
            _ => None,
        }
    }
}

/// An asynchronous subscription-status notification from the payment
/// provider, keyed by a provider-supplied event id for idempotence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub event_id: String,
    pub tenant_id: Uuid,
    pub kind: ProviderEventKind,
    pub occurred_at: DateTime<Utc>,
}

/// Submission side of the updater channel, handed to the webhook intake.
#[derive(Clone)]
pub struct BillingHandle {
    tx: mpsc::Sender<ProviderEvent>,
}

impl BillingHandle {
    pub async fn submit(&self, event: ProviderEvent) -> Result<(), GatewayError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| StoreError::Transient("billing updater is not running".into()))?;
        Ok(())
    }
}

/// Bounded memory of recently applied provider event ids. Once full,
/// the oldest id is evicted first; providers that redeliver do so within
/// a short horizon, so a bounded window is enough for dedup.
struct EventDedup {
    capacity: usize,
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl EventDedup {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    fn contains(&self, event_id: &str) -> bool {
        self.seen.contains(event_id)
    }

    fn insert(&mut self, event_id: String) {
        if !self.seen.insert(event_id.clone()) {
            return;
        }
        self.order.push_back(event_id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }
}

/// Single-writer updater for the subscription store.
pub struct SubscriptionUpdater {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    seen: EventDedup,
    rx: mpsc::Receiver<ProviderEvent>,
}

impl SubscriptionUpdater {
    /// Spawn the updater task. Dropping every [`BillingHandle`] shuts the
    /// task down cleanly.
    pub fn spawn(
        store: Arc<dyn Store>,
        audit: Arc<dyn AuditSink>,
        queue_depth: usize,
    ) -> (BillingHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        let updater = Self {
            store,
            audit,
            seen: EventDedup::new(config::config().billing.event_dedup_capacity),
            rx,
        };
        let handle = tokio::spawn(updater.run());
        (BillingHandle { tx }, handle)
    }

    async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            if self.seen.contains(&event.event_id) {
                tracing::debug!(event_id = %event.event_id, "duplicate provider event dropped");
                continue;
            }
            match self.apply(&event).await {
                Ok(()) => {
                    self.seen.insert(event.event_id);
                }
                Err(e) => {
                    // Not marked seen: at-least-once redelivery gets
                    // another chance once the store recovers.
                    tracing::error!(event_id = %event.event_id, "provider event failed: {}", e);
                }
            }
        }
        tracing::info!("billing updater stopped");
    }

    async fn apply(&self, event: &ProviderEvent) -> Result<(), GatewayError> {
        let subscription = store::retrying("get_subscription", || {
            self.store.get_subscription(event.tenant_id)
        })
        .await?
        .ok_or_else(|| {
            GatewayError::Store(StoreError::NotFound(format!(
                "subscription for tenant {}",
                event.tenant_id
            )))
        })?;

        let target = match event.kind.target(subscription.status) {
            Some(target) => target,
            None => {
                tracing::debug!(
                    event_id = %event.event_id,
                    status = subscription.status.as_str(),
                    "provider event does not move the status machine"
                );
                return Ok(());
            }
        };

        transition(
            self.store.as_ref(),
            self.audit.as_ref(),
            event.tenant_id,
            subscription.status,
            target,
            event.occurred_at,
        )
        .await
    }
}

/// Apply one status transition atomically and record it in the audit
/// stream. Rejects transitions the status machine does not allow.
pub async fn transition(
    store: &dyn Store,
    audit: &dyn AuditSink,
    tenant_id: Uuid,
    from: SubscriptionStatus,
    to: SubscriptionStatus,
    at: DateTime<Utc>,
) -> Result<(), GatewayError> {
    if !from.can_transition_to(to) {
        return Err(GatewayError::Store(StoreError::Conflict(format!(
            "illegal subscription transition {} -> {}",
            from.as_str(),
            to.as_str()
        ))));
    }

    store::retrying("update_subscription_status", || {
        store.update_subscription_status(tenant_id, from, to, at)
    })
    .await?;

    audit
        .append(
            AuditEvent::now(AuditKind::SubscriptionTransition, tenant_id.to_string())
                .with_detail(format!("{} -> {}", from.as_str(), to.as_str())),
        )
        .await;
    Ok(())
}

/// Cancel every subscription that has sat in past_due longer than the
/// grace period. Returns how many tenants were canceled.
pub async fn sweep_grace_period(
    store: &dyn Store,
    audit: &dyn AuditSink,
    grace: chrono::Duration,
) -> Result<u64, GatewayError> {
    let cutoff = Utc::now() - grace;
    let lapsed = store::retrying("list_past_due_before", || {
        store.list_past_due_before(cutoff)
    })
    .await?;

    let mut canceled = 0u64;
    for subscription in lapsed {
        match transition(
            store,
            audit,
            subscription.tenant_id,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            Utc::now(),
        )
        .await
        {
            Ok(()) => canceled += 1,
            // A concurrent payment retry may have moved it back to
            // active; that is a win, not an error.
            Err(GatewayError::Store(StoreError::Conflict(msg))) => {
                tracing::debug!("grace sweep skipped tenant {}: {}", subscription.tenant_id, msg);
            }
            Err(e) => return Err(e),
        }
    }

    if canceled > 0 {
        tracing::info!("grace sweep canceled {} lapsed subscriptions", canceled);
    }
    Ok(canceled)
}
