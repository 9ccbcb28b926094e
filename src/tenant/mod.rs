//! Tenant Resolver: membership resolution and the data-isolation gate.

use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::auth::Identity;
use crate::error::GatewayError;
use crate::store::{self, Store, TenantStatus};

/// Tenant context carried with every request past the resolver. All
/// tenant-scoped data access must be authorized against it.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub user_id: Uuid,
}

pub struct TenantResolver {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
}

impl TenantResolver {
    pub fn new(store: Arc<dyn Store>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Map an authenticated identity to its tenant context.
    ///
    /// With one membership the tenant is implied; with several the caller
    /// must select one explicitly; with none the identity cannot proceed.
    pub async fn resolve(
        &self,
        identity: &Identity,
        selection: Option<Uuid>,
    ) -> Result<TenantContext, GatewayError> {
        let memberships = store::retrying("get_tenant_memberships", || {
            self.store.get_tenant_memberships(identity.user_id)
        })
        .await?;

        let tenant_id = match (memberships.len(), selection) {
            (0, _) => return Err(GatewayError::NoTenantMembership),
            (1, None) => memberships[0],
            (1, Some(selected)) if selected == memberships[0] => selected,
            (1, Some(_)) => return Err(GatewayError::NoTenantMembership),
            (_, Some(selected)) if memberships.contains(&selected) => selected,
            (_, Some(_)) => return Err(GatewayError::NoTenantMembership),
            (_, None) => return Err(GatewayError::AmbiguousTenant),
        };

        let tenant = store::retrying("get_tenant", || self.store.get_tenant(tenant_id))
            .await?
            .ok_or(GatewayError::TenantUnavailable(TenantStatus::Deleted))?;

        match tenant.status {
            TenantStatus::Active => Ok(TenantContext {
                tenant_id: tenant.id,
                tenant_name: tenant.name,
                user_id: identity.user_id,
            }),
            status => Err(GatewayError::TenantUnavailable(status)),
        }
    }

    /// The isolation gate. Every data access into tenant-scoped storage
    /// passes through here; a mismatch is terminal for the request and
    /// recorded as a security event.
    pub async fn authorize_access(
        &self,
        context: &TenantContext,
        resource_tenant_id: Uuid,
    ) -> Result<(), GatewayError> {
        if resource_tenant_id == context.tenant_id {
            return Ok(());
        }

        tracing::warn!(
            resolved = %context.tenant_id,
            requested = %resource_tenant_id,
            user = %context.user_id,
            "cross-tenant access denied"
        );
        self.audit
            .append(AuditEvent::cross_tenant(resource_tenant_id, context.tenant_id))
            .await;

        Err(GatewayError::CrossTenantAccess {
            requested: resource_tenant_id,
            resolved: context.tenant_id,
        })
    }
}
