//! Audit sink collaborator: append-only, fire-and-forget, at-least-once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    LoginSucceeded,
    LoginFailed,
    LoginLockedOut,
    SessionRevoked,
    CrossTenantDenied,
    SubscriptionTransition,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub kind: AuditKind,
    /// Credential identifier, username, or tenant id the event is about.
    pub subject: String,
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn now(kind: AuditKind, subject: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            kind,
            subject: subject.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn cross_tenant(requested: Uuid, resolved: Uuid) -> Self {
        Self::now(AuditKind::CrossTenantDenied, resolved.to_string())
            .with_detail(format!("requested tenant {}", requested))
    }
}

/// Append-only event stream. Delivery is fire-and-forget; duplicates
/// are tolerated downstream, so implementations must never fail the
/// calling request.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn append(&self, event: AuditEvent);
}

/// Default sink: structured tracing output. Cross-tenant denials are
/// security events and go out at WARN.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, event: AuditEvent) {
        match event.kind {
            AuditKind::CrossTenantDenied => {
                tracing::warn!(
                    subject = %event.subject,
                    detail = event.detail.as_deref().unwrap_or(""),
                    "security: cross-tenant access denied"
                );
            }
            kind => {
                tracing::info!(
                    kind = ?kind,
                    subject = %event.subject,
                    detail = event.detail.as_deref().unwrap_or(""),
                    "audit event"
                );
            }
        }
    }
}

/// Collects events in memory; used by tests to assert on the audit trail.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: AuditKind) -> usize {
        self.events.lock().unwrap().iter().filter(|e| e.kind == kind).count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}
