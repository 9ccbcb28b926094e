//! Entitlement Evaluator: maps (plan tier, subscription status) through
//! the feature-gate table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config;
use crate::error::GatewayError;
use crate::store::{self, PlanTier, Store, Subscription, SubscriptionStatus};
use crate::tenant::TenantContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    PlanTooLow,
    SubscriptionLapsed,
    TrialExpired,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DenyReason::PlanTooLow => "plan_too_low",
            DenyReason::SubscriptionLapsed => "subscription_lapsed",
            DenyReason::TrialExpired => "trial_expired",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied(DenyReason),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted)
    }

    /// Turn a denial into a typed error, for call sites that gate an
    /// operation rather than report the decision.
    pub fn require(self) -> Result<(), GatewayError> {
        match self {
            Decision::Granted => Ok(()),
            Decision::Denied(reason) => Err(GatewayError::Denied(reason)),
        }
    }
}

/// Static feature-gate table built at startup: feature key to minimum
/// tier, plus the allowlist of features that survive a lapsed
/// subscription (read-only/export degradation).
#[derive(Debug, Clone)]
pub struct FeatureGates {
    gates: HashMap<String, PlanTier>,
    degraded_allowlist: HashSet<String>,
}

impl FeatureGates {
    pub fn new<K, D>(
        entries: impl IntoIterator<Item = (K, PlanTier)>,
        degraded_allowlist: impl IntoIterator<Item = D>,
    ) -> Self
    where
        K: Into<String>,
        D: Into<String>,
    {
        Self {
            gates: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            degraded_allowlist: degraded_allowlist.into_iter().map(Into::into).collect(),
        }
    }

    /// The built-in gate table, with the degraded allowlist taken from
    /// configuration.
    pub fn standard() -> Self {
        let degraded = config::config().billing.degraded_features.clone();
        Self::new(
            [
                ("read-only-access", PlanTier::Free),
                ("data-export", PlanTier::Free),
                ("advanced-export", PlanTier::Pro),
                ("custom-branding", PlanTier::Pro),
                ("api-access", PlanTier::Pro),
                ("audit-log", PlanTier::Enterprise),
                ("sso", PlanTier::Enterprise),
            ],
            degraded,
        )
    }

    pub fn required_tier(&self, feature: &str) -> Option<PlanTier> {
        self.gates.get(feature).copied()
    }

    pub fn survives_lapse(&self, feature: &str) -> bool {
        self.degraded_allowlist.contains(feature)
    }
}

/// Pure gate evaluation. Identical inputs always yield the identical
/// decision, so callers may cache the result against the subscription
/// state they passed in.
pub fn evaluate(
    gates: &FeatureGates,
    subscription: &Subscription,
    feature: &str,
    now: DateTime<Utc>,
) -> Decision {
    let required = match gates.required_tier(feature) {
        Some(required) => required,
        // Ungated features are open to every tenant.
        None => return Decision::Granted,
    };

    if subscription.tier < required {
        return Decision::Denied(DenyReason::PlanTooLow);
    }

    match subscription.status {
        SubscriptionStatus::Active => Decision::Granted,
        SubscriptionStatus::Trialing => {
            if subscription.renews_at <= now {
                deny_unless_degraded(gates, feature, DenyReason::TrialExpired)
            } else {
                Decision::Granted
            }
        }
        SubscriptionStatus::PastDue | SubscriptionStatus::Canceled => {
            deny_unless_degraded(gates, feature, DenyReason::SubscriptionLapsed)
        }
    }
}

fn deny_unless_degraded(gates: &FeatureGates, feature: &str, reason: DenyReason) -> Decision {
    if gates.survives_lapse(feature) {
        Decision::Granted
    } else {
        Decision::Denied(reason)
    }
}

pub struct EntitlementEvaluator {
    store: Arc<dyn Store>,
    gates: FeatureGates,
}

impl EntitlementEvaluator {
    pub fn new(store: Arc<dyn Store>, gates: FeatureGates) -> Self {
        Self { store, gates }
    }

    /// Fetch the tenant's current subscription and evaluate the gate.
    pub async fn check(
        &self,
        context: &TenantContext,
        feature: &str,
    ) -> Result<Decision, GatewayError> {
        let subscription = store::retrying("get_subscription", || {
            self.store.get_subscription(context.tenant_id)
        })
        .await?;

        // A tenant with no subscription record has nothing to entitle it.
        let subscription = match subscription {
            Some(subscription) => subscription,
            None => return Ok(Decision::Denied(DenyReason::SubscriptionLapsed)),
        };

        Ok(evaluate(&self.gates, &subscription, feature, Utc::now()))
    }

    pub fn gates(&self) -> &FeatureGates {
        &self.gates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn gates() -> FeatureGates {
        FeatureGates::new(
            [
                ("read-only-access", PlanTier::Free),
                ("advanced-export", PlanTier::Pro),
                ("sso", PlanTier::Enterprise),
            ],
            ["read-only-access"],
        )
    }

    fn subscription(tier: PlanTier, status: SubscriptionStatus) -> Subscription {
        let now = Utc::now();
        Subscription {
            tenant_id: Uuid::new_v4(),
            tier,
            status,
            renews_at: now + chrono::Duration::days(30),
            status_changed_at: now,
        }
    }

    #[test]
    fn free_active_denied_pro_feature() {
        let sub = subscription(PlanTier::Free, SubscriptionStatus::Active);
        assert_eq!(
            evaluate(&gates(), &sub, "advanced-export", Utc::now()),
            Decision::Denied(DenyReason::PlanTooLow)
        );
    }

    #[test]
    fn entitlement_is_monotonic_in_tier() {
        let tiers = [PlanTier::Free, PlanTier::Pro, PlanTier::Enterprise];
        let gates = gates();
        for feature in ["read-only-access", "advanced-export", "sso"] {
            let mut granted_at_lower = false;
            for tier in tiers {
                let sub = subscription(tier, SubscriptionStatus::Active);
                let granted = evaluate(&gates, &sub, feature, Utc::now()).is_granted();
                // Once granted at some tier, every higher tier must grant too.
                assert!(!granted_at_lower || granted, "{} lost at {:?}", feature, tier);
                granted_at_lower = granted;
            }
        }
    }

    #[test]
    fn lapsed_subscription_keeps_degraded_features_only() {
        for status in [SubscriptionStatus::PastDue, SubscriptionStatus::Canceled] {
            let sub = subscription(PlanTier::Enterprise, status);
            assert_eq!(
                evaluate(&gates(), &sub, "read-only-access", Utc::now()),
                Decision::Granted
            );
            assert_eq!(
                evaluate(&gates(), &sub, "sso", Utc::now()),
                Decision::Denied(DenyReason::SubscriptionLapsed)
            );
        }
    }

    #[test]
    fn expired_trial_is_denied_with_trial_reason() {
        let mut sub = subscription(PlanTier::Pro, SubscriptionStatus::Trialing);
        sub.renews_at = Utc::now() - chrono::Duration::days(1);
        assert_eq!(
            evaluate(&gates(), &sub, "advanced-export", Utc::now()),
            Decision::Denied(DenyReason::TrialExpired)
        );
    }

    #[test]
    fn live_trial_is_granted() {
        let sub = subscription(PlanTier::Pro, SubscriptionStatus::Trialing);
        assert_eq!(
            evaluate(&gates(), &sub, "advanced-export", Utc::now()),
            Decision::Granted
        );
    }

    #[test]
    fn ungated_feature_is_open() {
        let sub = subscription(PlanTier::Free, SubscriptionStatus::Active);
        assert_eq!(
            evaluate(&gates(), &sub, "no-such-gate", Utc::now()),
            Decision::Granted
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let sub = subscription(PlanTier::Free, SubscriptionStatus::Active);
        let now = Utc::now();
        let first = evaluate(&gates(), &sub, "advanced-export", now);
        for _ in 0..10 {
            assert_eq!(evaluate(&gates(), &sub, "advanced-export", now), first);
        }
    }
}
