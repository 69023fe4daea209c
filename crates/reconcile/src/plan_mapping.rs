//! Plan catalog and status translation
//!
//! Static, versioned mapping between the billing provider's price ids and
//! local plan tiers, plus the translation from provider subscription status
//! to workspace status. Pure lookup: no state, no I/O, safe to share
//! across any number of concurrent callers.

use std::collections::HashMap;

use crate::error::{ReconcileError, ReconcileResult};
use crate::types::{WorkspacePlan, WorkspaceStatus};

/// Per-plan usage limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub max_players: i64,
    pub max_games_per_month: i64,
    pub storage_mb: i64,
}

/// Configured price-id table for the paid plans
///
/// Lookup failure is a hard error, never a silent default: defaulting an
/// unknown price id to some plan would make enforcement converge local
/// state to the wrong tier.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    price_to_plan: HashMap<String, WorkspacePlan>,
    plan_to_price: HashMap<WorkspacePlan, String>,
}

impl PlanCatalog {
    /// Build a catalog from the three paid price ids
    pub fn new(
        starter_price_id: impl Into<String>,
        plus_price_id: impl Into<String>,
        pro_price_id: impl Into<String>,
    ) -> Self {
        let pairs = [
            (starter_price_id.into(), WorkspacePlan::Starter),
            (plus_price_id.into(), WorkspacePlan::Plus),
            (pro_price_id.into(), WorkspacePlan::Pro),
        ];

        let mut price_to_plan = HashMap::new();
        let mut plan_to_price = HashMap::new();
        for (price_id, plan) in pairs {
            price_to_plan.insert(price_id.clone(), plan);
            plan_to_price.insert(plan, price_id);
        }

        Self {
            price_to_plan,
            plan_to_price,
        }
    }

    /// Build the catalog from `STRIPE_PRICE_ID_{STARTER,PLUS,PRO}`
    pub fn from_env() -> ReconcileResult<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| ReconcileError::Config(format!("{name} must be set")))
        };

        Ok(Self::new(
            var("STRIPE_PRICE_ID_STARTER")?,
            var("STRIPE_PRICE_ID_PLUS")?,
            var("STRIPE_PRICE_ID_PRO")?,
        ))
    }

    /// Resolve a provider price id to a plan tier
    pub fn plan_for_price_id(&self, price_id: &str) -> ReconcileResult<WorkspacePlan> {
        self.price_to_plan
            .get(price_id)
            .copied()
            .ok_or_else(|| ReconcileError::UnknownPriceId(price_id.to_string()))
    }

    /// Reverse lookup: the price id billed for a plan
    ///
    /// The free plan has no price id and is an error.
    pub fn price_id_for_plan(&self, plan: WorkspacePlan) -> ReconcileResult<&str> {
        if plan == WorkspacePlan::Free {
            return Err(ReconcileError::InvalidInput(
                "free plan has no price id".to_string(),
            ));
        }

        self.plan_to_price
            .get(&plan)
            .map(String::as_str)
            .ok_or_else(|| {
                ReconcileError::Config(format!("no price id configured for plan: {plan}"))
            })
    }
}

/// Translate a provider subscription status to a workspace status
///
/// Total over the provider's status vocabulary. Anything unrecognized maps
/// to `Suspended`: denying access on ambiguity is the safe posture, and the
/// next reconciliation pass heals the record once the status is known.
pub fn status_for_stripe(stripe_status: &str) -> WorkspaceStatus {
    match stripe_status {
        "active" => WorkspaceStatus::Active,
        // Should not happen in practice; trials are managed locally
        "trialing" => WorkspaceStatus::Trial,
        "past_due" => WorkspaceStatus::PastDue,
        "canceled" => WorkspaceStatus::Canceled,
        "unpaid" => WorkspaceStatus::Suspended,
        "incomplete" => WorkspaceStatus::PastDue,
        "incomplete_expired" => WorkspaceStatus::Canceled,
        // Stripe billing pause feature
        "paused" => WorkspaceStatus::Suspended,
        _ => WorkspaceStatus::Suspended,
    }
}

/// Usage limits for a plan tier
pub fn limits_for(plan: WorkspacePlan) -> PlanLimits {
    match plan {
        WorkspacePlan::Free => PlanLimits {
            max_players: 2,
            max_games_per_month: 10,
            storage_mb: 100,
        },
        WorkspacePlan::Starter => PlanLimits {
            max_players: 5,
            max_games_per_month: 50,
            storage_mb: 500,
        },
        WorkspacePlan::Plus => PlanLimits {
            max_players: 15,
            max_games_per_month: 200,
            storage_mb: 2048,
        },
        // Effectively unlimited
        WorkspacePlan::Pro => PlanLimits {
            max_players: 9999,
            max_games_per_month: 9999,
            storage_mb: 10240,
        },
    }
}

/// Human-readable plan name for display
pub fn display_name(plan: WorkspacePlan) -> &'static str {
    match plan {
        WorkspacePlan::Free => "Free Trial",
        WorkspacePlan::Starter => "Starter",
        WorkspacePlan::Plus => "Plus",
        WorkspacePlan::Pro => "Pro",
    }
}

/// Monthly price in USD for display
pub fn monthly_price_usd(plan: WorkspacePlan) -> u32 {
    match plan {
        WorkspacePlan::Free => 0,
        WorkspacePlan::Starter => 9,
        WorkspacePlan::Plus => 19,
        WorkspacePlan::Pro => 39,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PlanCatalog {
        PlanCatalog::new("price_starter", "price_plus", "price_pro")
    }

    #[test]
    fn resolves_configured_price_ids() {
        let catalog = catalog();
        assert_eq!(
            catalog.plan_for_price_id("price_starter").unwrap(),
            WorkspacePlan::Starter
        );
        assert_eq!(
            catalog.plan_for_price_id("price_plus").unwrap(),
            WorkspacePlan::Plus
        );
        assert_eq!(
            catalog.plan_for_price_id("price_pro").unwrap(),
            WorkspacePlan::Pro
        );
    }

    #[test]
    fn unknown_price_id_is_a_hard_error() {
        let err = catalog().plan_for_price_id("price_bogus").unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownPriceId(id) if id == "price_bogus"));
    }

    #[test]
    fn reverse_lookup_rejects_free() {
        let catalog = catalog();
        assert_eq!(
            catalog.price_id_for_plan(WorkspacePlan::Pro).unwrap(),
            "price_pro"
        );
        assert!(catalog.price_id_for_plan(WorkspacePlan::Free).is_err());
    }

    #[test]
    fn known_statuses_translate() {
        assert_eq!(status_for_stripe("active"), WorkspaceStatus::Active);
        assert_eq!(status_for_stripe("trialing"), WorkspaceStatus::Trial);
        assert_eq!(status_for_stripe("past_due"), WorkspaceStatus::PastDue);
        assert_eq!(status_for_stripe("canceled"), WorkspaceStatus::Canceled);
        assert_eq!(status_for_stripe("unpaid"), WorkspaceStatus::Suspended);
        assert_eq!(status_for_stripe("incomplete"), WorkspaceStatus::PastDue);
        assert_eq!(
            status_for_stripe("incomplete_expired"),
            WorkspaceStatus::Canceled
        );
        assert_eq!(status_for_stripe("paused"), WorkspaceStatus::Suspended);
    }

    #[test]
    fn unknown_status_defaults_to_suspended() {
        // Access denial is the safe posture when the provider reports
        // something this version does not recognize.
        assert_eq!(
            status_for_stripe("some_future_status"),
            WorkspaceStatus::Suspended
        );
        assert_eq!(status_for_stripe(""), WorkspaceStatus::Suspended);
    }

    #[test]
    fn limits_grow_with_tier() {
        let free = limits_for(WorkspacePlan::Free);
        let pro = limits_for(WorkspacePlan::Pro);
        assert!(free.max_players < pro.max_players);
        assert!(free.storage_mb < pro.storage_mb);
        assert_eq!(monthly_price_usd(WorkspacePlan::Free), 0);
        assert_eq!(display_name(WorkspacePlan::Plus), "Plus");
    }
}
