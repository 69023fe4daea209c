//! Billing drift auditor
//!
//! Cross-checks the local workspace record against the provider's
//! subscription state, classifies any disagreement, and self-heals the
//! mechanical cases through the enforcement engine. Drift is reported as
//! structured data, never raised as an error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::enforcement::{EnforceInput, EnforcementEngine};
use crate::error::{ReconcileError, ReconcileResult};
use crate::ledger::{BillingLedger, LedgerEventType, LedgerSource, NewLedgerEntry};
use crate::plan_mapping::{status_for_stripe, PlanCatalog};
use crate::provider::SubscriptionProvider;
use crate::store::WorkspaceStore;
use crate::types::{WorkspacePlan, WorkspaceStatus};

/// How a drift reason is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// Local status disagrees with the mapped external status
    StatusMismatch,
    /// Local plan disagrees with the plan billed externally
    PlanMismatch,
    /// The two systems actively disagree about whether the tenant may
    /// write (e.g. externally active but locally canceled)
    Conflict,
    /// Missing linkage, unknown subscription, or unmapped price id;
    /// nothing a replay can fix
    Structural,
}

/// One detected disagreement between local and external state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReason {
    pub kind: DriftKind,
    pub message: String,
}

impl DriftReason {
    fn new(kind: DriftKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether enforcement can fix this mechanically
    pub fn is_mechanical(&self) -> bool {
        self.kind != DriftKind::Structural
    }
}

impl std::fmt::Display for DriftReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Recommended remedy for a drifted workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedFix {
    RunEventReplay,
    ManualReview,
}

/// Result of auditing one workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub workspace_id: String,

    // Local state
    pub local_plan: WorkspacePlan,
    pub local_status: WorkspaceStatus,
    pub local_customer_id: Option<String>,
    pub local_subscription_id: Option<String>,

    // External state (all None when no subscription exists)
    pub stripe_status: Option<String>,
    pub stripe_plan: Option<WorkspacePlan>,
    pub stripe_price_id: Option<String>,
    pub stripe_current_period_end: Option<OffsetDateTime>,

    pub drift: bool,
    pub drift_reasons: Vec<DriftReason>,
    pub recommended_fix: Option<RecommendedFix>,

    pub audited_at: OffsetDateTime,
}

/// Read-mostly comparator between workspace records and provider state
#[derive(Clone)]
pub struct DriftAuditor {
    workspaces: Arc<dyn WorkspaceStore>,
    provider: Arc<dyn SubscriptionProvider>,
    ledger: BillingLedger,
    catalog: Arc<PlanCatalog>,
    enforcement: EnforcementEngine,
}

impl DriftAuditor {
    pub fn new(
        workspaces: Arc<dyn WorkspaceStore>,
        provider: Arc<dyn SubscriptionProvider>,
        ledger: BillingLedger,
        catalog: Arc<PlanCatalog>,
        enforcement: EnforcementEngine,
    ) -> Self {
        Self {
            workspaces,
            provider,
            ledger,
            catalog,
            enforcement,
        }
    }

    /// Audit one workspace against the external subscription
    ///
    /// When every drift reason is mechanical (status/plan mismatch or an
    /// access conflict), the auditor invokes enforcement itself with
    /// source=auditor; structural drift is left for human review. Whenever
    /// drift is found a `drift_detected` ledger entry is written, whether
    /// or not auto-enforcement fired.
    pub async fn audit(&self, workspace_id: &str) -> ReconcileResult<AuditReport> {
        let workspace = self
            .workspaces
            .get_workspace(workspace_id)
            .await?
            .ok_or_else(|| ReconcileError::WorkspaceNotFound(workspace_id.to_string()))?;

        let mut report = AuditReport {
            workspace_id: workspace_id.to_string(),
            local_plan: workspace.plan,
            local_status: workspace.status,
            local_customer_id: workspace.billing.stripe_customer_id.clone(),
            local_subscription_id: workspace.billing.stripe_subscription_id.clone(),
            stripe_status: None,
            stripe_plan: None,
            stripe_price_id: None,
            stripe_current_period_end: None,
            drift: false,
            drift_reasons: Vec::new(),
            recommended_fix: None,
            audited_at: OffsetDateTime::now_utc(),
        };

        let Some(subscription_id) = workspace.billing.stripe_subscription_id.clone() else {
            // Free plan with no subscription is the expected steady state
            // for unpaid tenants.
            if workspace.plan == WorkspacePlan::Free {
                return Ok(report);
            }

            // A paid plan with no billing linkage is a structural
            // inconsistency, not something a replay can repair.
            report.drift_reasons.push(DriftReason::new(
                DriftKind::Structural,
                format!(
                    "workspace is on {} plan but has no subscription id",
                    workspace.plan
                ),
            ));
            return self.finish(report, &workspace.status).await;
        };

        let Some(subscription) = self.provider.get_subscription(&subscription_id).await? else {
            report.drift_reasons.push(DriftReason::new(
                DriftKind::Structural,
                format!("subscription {subscription_id} not found at provider (may be deleted)"),
            ));
            return self.finish(report, &workspace.status).await;
        };

        report.stripe_status = Some(subscription.status.clone());
        report.stripe_price_id = subscription.price_id.clone();
        report.stripe_current_period_end = subscription.current_period_end;

        if let Some(price_id) = &subscription.price_id {
            match self.catalog.plan_for_price_id(price_id) {
                Ok(plan) => report.stripe_plan = Some(plan),
                Err(_) => {
                    report.drift_reasons.push(DriftReason::new(
                        DriftKind::Structural,
                        format!("unknown price id at provider: {price_id}"),
                    ));
                }
            }
        }

        // Field diff against the mapped external status.
        let expected_status = status_for_stripe(&subscription.status);
        if workspace.status != expected_status {
            report.drift_reasons.push(DriftReason::new(
                DriftKind::StatusMismatch,
                format!(
                    "status mismatch: local={}, provider={} (expected {expected_status})",
                    workspace.status, subscription.status
                ),
            ));
        }

        if let Some(stripe_plan) = report.stripe_plan {
            if workspace.plan != stripe_plan {
                report.drift_reasons.push(DriftReason::new(
                    DriftKind::PlanMismatch,
                    format!(
                        "plan mismatch: local={}, provider={stripe_plan}",
                        workspace.plan
                    ),
                ));
            }
        }

        // Sentinel cross-checks a pure field diff can miss when stale
        // caching masks the mapped value: the two systems disagreeing about
        // whether the tenant is allowed to write.
        let external = subscription.status.as_str();
        let local = workspace.status;

        if external == "active" && local == WorkspaceStatus::Canceled {
            report.drift_reasons.push(DriftReason::new(
                DriftKind::Conflict,
                "subscription is active but workspace is canceled",
            ));
        }
        if external == "canceled" && local == WorkspaceStatus::Active {
            report.drift_reasons.push(DriftReason::new(
                DriftKind::Conflict,
                "subscription is canceled but workspace is active",
            ));
        }
        if external == "active" && local == WorkspaceStatus::Suspended {
            report.drift_reasons.push(DriftReason::new(
                DriftKind::Conflict,
                "subscription is active but workspace is suspended",
            ));
        }
        if local == WorkspaceStatus::Suspended && external != "past_due" && external != "unpaid" {
            report.drift_reasons.push(DriftReason::new(
                DriftKind::Conflict,
                format!(
                    "workspace is suspended but subscription is {external} (expected past_due or unpaid)"
                ),
            ));
        }
        // Symmetric counterpart of the suspended check: payment trouble at
        // the provider while the workspace still grants full access.
        if (external == "unpaid" || external == "past_due") && local == WorkspaceStatus::Active {
            report.drift_reasons.push(DriftReason::new(
                DriftKind::Conflict,
                format!("subscription is {external} but workspace is active"),
            ));
        }

        self.finish(report, &workspace.status).await
    }

    /// Classify, self-heal when mechanical, and record the drift entry
    async fn finish(
        &self,
        mut report: AuditReport,
        local_status: &WorkspaceStatus,
    ) -> ReconcileResult<AuditReport> {
        if report.drift_reasons.is_empty() {
            return Ok(report);
        }

        report.drift = true;
        let all_mechanical = report.drift_reasons.iter().all(DriftReason::is_mechanical);
        report.recommended_fix = Some(if all_mechanical {
            RecommendedFix::RunEventReplay
        } else {
            RecommendedFix::ManualReview
        });

        tracing::warn!(
            workspace_id = %report.workspace_id,
            reasons = report.drift_reasons.len(),
            mechanical = all_mechanical,
            "Billing drift detected"
        );

        // Mechanical drift is healed on the spot; structural drift never
        // triggers an automatic mutation.
        let mut auto_enforced = false;
        if all_mechanical {
            if let (Some(price_id), Some(status)) =
                (report.stripe_price_id.clone(), report.stripe_status.clone())
            {
                self.enforcement
                    .enforce(
                        &report.workspace_id,
                        EnforceInput {
                            price_id,
                            external_status: status,
                            source: LedgerSource::Auditor,
                            stripe_event_id: None,
                        },
                    )
                    .await?;
                auto_enforced = true;
            }
        }

        let reasons = report
            .drift_reasons
            .iter()
            .map(|reason| reason.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let fix = match report.recommended_fix {
            Some(RecommendedFix::RunEventReplay) => "run_event_replay",
            Some(RecommendedFix::ManualReview) => "manual_review",
            None => "none",
        };
        let note = if auto_enforced {
            format!("drift detected: {reasons}. recommended fix: {fix} (auto-applied)")
        } else {
            format!("drift detected: {reasons}. recommended fix: {fix}")
        };

        self.ledger
            .record(
                &report.workspace_id,
                NewLedgerEntry {
                    event_type: LedgerEventType::DriftDetected,
                    stripe_event_id: None,
                    status_before: Some(*local_status),
                    status_after: report
                        .stripe_status
                        .as_deref()
                        .map(status_for_stripe),
                    plan_before: Some(report.local_plan),
                    plan_after: report.stripe_plan,
                    source: LedgerSource::Auditor,
                    note: Some(note),
                },
            )
            .await?;

        Ok(report)
    }

    /// Audit every workspace holding a subscription linkage
    ///
    /// Returns only the reports exhibiting drift. A failure auditing one
    /// workspace does not abort the rest.
    pub async fn audit_all(&self) -> ReconcileResult<Vec<AuditReport>> {
        let workspaces = self.workspaces.list_linked_workspaces().await?;
        let mut drifted = Vec::new();

        for workspace in workspaces {
            match self.audit(&workspace.id).await {
                Ok(report) if report.drift => drifted.push(report),
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(
                        workspace_id = %workspace.id,
                        error = %err,
                        "Failed to audit workspace, continuing"
                    );
                }
            }
        }

        Ok(drifted)
    }
}
