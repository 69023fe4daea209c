//! Core workspace billing types
//!
//! A workspace is the local authoritative billing record for one tenant.
//! Its plan and status are mutated exclusively through the enforcement
//! engine once a subscription exists.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ReconcileError;

/// Workspace plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspacePlan {
    Free,
    Starter,
    Plus,
    Pro,
}

impl WorkspacePlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspacePlan::Free => "free",
            WorkspacePlan::Starter => "starter",
            WorkspacePlan::Plus => "plus",
            WorkspacePlan::Pro => "pro",
        }
    }
}

impl std::fmt::Display for WorkspacePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkspacePlan {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(WorkspacePlan::Free),
            "starter" => Ok(WorkspacePlan::Starter),
            "plus" => Ok(WorkspacePlan::Plus),
            "pro" => Ok(WorkspacePlan::Pro),
            other => Err(ReconcileError::InvalidInput(format!(
                "unknown workspace plan: {other}"
            ))),
        }
    }
}

/// Workspace lifecycle status
///
/// Status transitions are not constrained to a fixed graph; the external
/// billing provider is authoritative and the enforcement engine converges
/// the local value to whatever the provider reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Trial,
    Active,
    PastDue,
    Canceled,
    Suspended,
    Deleted,
}

impl WorkspaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceStatus::Trial => "trial",
            WorkspaceStatus::Active => "active",
            WorkspaceStatus::PastDue => "past_due",
            WorkspaceStatus::Canceled => "canceled",
            WorkspaceStatus::Suspended => "suspended",
            WorkspaceStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkspaceStatus {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(WorkspaceStatus::Trial),
            "active" => Ok(WorkspaceStatus::Active),
            "past_due" => Ok(WorkspaceStatus::PastDue),
            "canceled" => Ok(WorkspaceStatus::Canceled),
            "suspended" => Ok(WorkspaceStatus::Suspended),
            "deleted" => Ok(WorkspaceStatus::Deleted),
            other => Err(ReconcileError::InvalidInput(format!(
                "unknown workspace status: {other}"
            ))),
        }
    }
}

/// Billing linkage between a workspace and the external provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingLink {
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub current_period_end: Option<OffsetDateTime>,
}

/// Usage counters tracked per workspace
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WorkspaceUsage {
    pub player_count: i64,
    pub games_this_month: i64,
    pub storage_used_mb: i64,
}

/// Local authoritative billing record for one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub plan: WorkspacePlan,
    pub status: WorkspaceStatus,
    pub billing: BillingLink,
    pub usage: WorkspaceUsage,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl Workspace {
    /// Check the structural billing invariants
    ///
    /// A free workspace must have no subscription id, and a linked
    /// subscription implies a paid plan. Returns a human-readable
    /// description of the violation, or `None` when consistent.
    pub fn billing_invariant_violation(&self) -> Option<String> {
        match (&self.billing.stripe_subscription_id, self.plan) {
            (Some(sub_id), WorkspacePlan::Free) => Some(format!(
                "free workspace holds subscription {sub_id}"
            )),
            (None, plan) if plan != WorkspacePlan::Free => Some(format!(
                "{plan} workspace has no subscription id"
            )),
            _ => None,
        }
    }

    /// Whether the workspace is linked to an external subscription
    pub fn has_subscription(&self) -> bool {
        self.billing.stripe_subscription_id.is_some()
    }
}

/// Partial workspace update
///
/// Carries only the fields that should be written. Fields left as `None`
/// must not appear in the persisted update at all; this is the store contract,
/// not just a value-level no-op. This is what keeps concurrent enforcement
/// calls from clobbering each other's unrelated fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspacePatch {
    pub plan: Option<WorkspacePlan>,
    pub status: Option<WorkspaceStatus>,
}

impl WorkspacePatch {
    pub fn is_empty(&self) -> bool {
        self.plan.is_none() && self.status.is_none()
    }
}

/// Point-in-time view of the external subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub subscription_id: String,
    /// Raw provider status string (e.g. "active", "past_due", "unpaid")
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_end: Option<OffsetDateTime>,
}

/// One external billing event at this crate's boundary
///
/// Events arrive already verified; this is the `{priceId, status, eventId}`
/// shape the provider delivers per subscription change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEvent {
    pub event_id: String,
    pub price_id: String,
    pub status: String,
    pub created: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(plan: WorkspacePlan, sub_id: Option<&str>) -> Workspace {
        let now = OffsetDateTime::now_utc();
        Workspace {
            id: "ws_1".to_string(),
            name: "Test".to_string(),
            plan,
            status: WorkspaceStatus::Active,
            billing: BillingLink {
                stripe_customer_id: sub_id.map(|_| "cus_1".to_string()),
                stripe_subscription_id: sub_id.map(String::from),
                current_period_end: None,
            },
            usage: WorkspaceUsage::default(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn plan_round_trips_through_str() {
        for plan in [
            WorkspacePlan::Free,
            WorkspacePlan::Starter,
            WorkspacePlan::Plus,
            WorkspacePlan::Pro,
        ] {
            assert_eq!(plan.as_str().parse::<WorkspacePlan>().unwrap(), plan);
        }
        assert!("enterprise".parse::<WorkspacePlan>().is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            WorkspaceStatus::Trial,
            WorkspaceStatus::Active,
            WorkspaceStatus::PastDue,
            WorkspaceStatus::Canceled,
            WorkspaceStatus::Suspended,
            WorkspaceStatus::Deleted,
        ] {
            assert_eq!(status.as_str().parse::<WorkspaceStatus>().unwrap(), status);
        }
        assert!("paused".parse::<WorkspaceStatus>().is_err());
    }

    #[test]
    fn free_with_subscription_violates_invariant() {
        let ws = workspace(WorkspacePlan::Free, Some("sub_1"));
        assert!(ws.billing_invariant_violation().is_some());
    }

    #[test]
    fn paid_without_subscription_violates_invariant() {
        let ws = workspace(WorkspacePlan::Starter, None);
        assert!(ws.billing_invariant_violation().is_some());
    }

    #[test]
    fn linked_paid_workspace_is_consistent() {
        let ws = workspace(WorkspacePlan::Plus, Some("sub_1"));
        assert!(ws.billing_invariant_violation().is_none());
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(WorkspacePatch::default().is_empty());
        assert!(!WorkspacePatch {
            status: Some(WorkspaceStatus::Active),
            ..Default::default()
        }
        .is_empty());
    }
}
