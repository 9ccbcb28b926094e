use std::sync::Arc;

use crate::auth::SessionAuthenticator;
use crate::billing::BillingHandle;
use crate::entitlement::EntitlementEvaluator;
use crate::store::Store;
use crate::tenant::TenantResolver;

pub mod auth;

/// Shared gateway components, cloned into every request.
#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<dyn Store>,
    pub authenticator: Arc<SessionAuthenticator>,
    pub resolver: Arc<TenantResolver>,
    pub entitlements: Arc<EntitlementEvaluator>,
    pub billing: BillingHandle,
}
