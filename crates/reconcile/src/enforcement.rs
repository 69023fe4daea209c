//! Plan enforcement engine
//!
//! The single path by which a workspace's plan or status may change once a
//! subscription exists. Enforcement is idempotent convergence: it asks
//! "does local match target, and if not, make it so", never "apply this
//! delta", so duplicated, reordered, or replayed deliveries all settle on
//! the same final state.
//!
//! The engine holds no handle to the billing provider. Convergence is
//! strictly one-directional: external truth flows into the local record,
//! never the reverse.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, ReconcileResult};
use crate::ledger::{BillingLedger, LedgerEventType, LedgerSource, NewLedgerEntry};
use crate::plan_mapping::{status_for_stripe, PlanCatalog};
use crate::store::WorkspaceStore;
use crate::types::{WorkspacePatch, WorkspacePlan, WorkspaceStatus};

/// Target state for one enforcement call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforceInput {
    /// Provider price id the workspace should be on
    pub price_id: String,
    /// Raw provider subscription status
    pub external_status: String,
    pub source: LedgerSource,
    /// Correlation id of the originating external event, if any
    pub stripe_event_id: Option<String>,
}

/// Outcome of one enforcement call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementResult {
    pub workspace_id: String,
    pub plan_changed: bool,
    pub status_changed: bool,
    pub plan_before: WorkspacePlan,
    pub plan_after: WorkspacePlan,
    pub status_before: WorkspaceStatus,
    pub status_after: WorkspaceStatus,
    /// Ledger entry written for this call (every call writes one)
    pub ledger_entry_id: String,
}

/// Converges workspace plan/status to the external target
#[derive(Clone)]
pub struct EnforcementEngine {
    workspaces: Arc<dyn WorkspaceStore>,
    ledger: BillingLedger,
    catalog: Arc<PlanCatalog>,
}

impl EnforcementEngine {
    pub fn new(
        workspaces: Arc<dyn WorkspaceStore>,
        ledger: BillingLedger,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            workspaces,
            ledger,
            catalog,
        }
    }

    /// Make the workspace match the target plan/status
    ///
    /// Writes only the fields that actually changed, and always records a
    /// ledger entry: a no-op entry when the workspace is already in sync,
    /// so the ledger can distinguish "ran and found nothing to do" from
    /// "never ran".
    pub async fn enforce(
        &self,
        workspace_id: &str,
        input: EnforceInput,
    ) -> ReconcileResult<EnforcementResult> {
        // Validation happens before any read or write.
        if workspace_id.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "workspace_id must be a non-empty string".to_string(),
            ));
        }
        if input.price_id.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "price_id must be a non-empty string".to_string(),
            ));
        }
        if input.external_status.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "external_status must be a non-empty string".to_string(),
            ));
        }

        let workspace = self
            .workspaces
            .get_workspace(workspace_id)
            .await?
            .ok_or_else(|| ReconcileError::WorkspaceNotFound(workspace_id.to_string()))?;

        // Translation must succeed before any state change is attempted;
        // an unknown price id aborts with zero writes.
        let target_plan = self.catalog.plan_for_price_id(&input.price_id)?;
        let target_status = status_for_stripe(&input.external_status);

        // Orthogonal comparisons: plan drift and status drift are reasoned
        // about separately.
        let plan_before = workspace.plan;
        let status_before = workspace.status;
        let plan_changed = plan_before != target_plan;
        let status_changed = status_before != target_status;

        tracing::info!(
            workspace_id = %workspace_id,
            source = %input.source,
            plan_before = %plan_before,
            target_plan = %target_plan,
            plan_changed,
            status_before = %status_before,
            target_status = %target_status,
            status_changed,
            "Enforcing workspace plan"
        );

        if !plan_changed && !status_changed {
            let ledger_entry_id = self
                .ledger
                .record(
                    workspace_id,
                    NewLedgerEntry {
                        event_type: LedgerEventType::PlanChanged,
                        stripe_event_id: input.stripe_event_id,
                        status_before: Some(status_before),
                        status_after: Some(status_before),
                        plan_before: Some(plan_before),
                        plan_after: Some(plan_before),
                        source: input.source,
                        note: Some(
                            "no changes - workspace already in sync with billing provider"
                                .to_string(),
                        ),
                    },
                )
                .await?;

            return Ok(EnforcementResult {
                workspace_id: workspace_id.to_string(),
                plan_changed: false,
                status_changed: false,
                plan_before,
                plan_after: plan_before,
                status_before,
                status_after: status_before,
                ledger_entry_id,
            });
        }

        let patch = WorkspacePatch {
            plan: plan_changed.then_some(target_plan),
            status: status_changed.then_some(target_status),
        };
        self.workspaces.apply_patch(workspace_id, patch).await?;

        let note = format!(
            "plan enforcement: {}, {}",
            if plan_changed {
                format!("plan {plan_before} -> {target_plan}")
            } else {
                "plan unchanged".to_string()
            },
            if status_changed {
                format!("status {status_before} -> {target_status}")
            } else {
                "status unchanged".to_string()
            },
        );

        // The entry carries the true before/after of both fields even when
        // only one of them changed.
        let ledger_entry_id = self
            .ledger
            .record(
                workspace_id,
                NewLedgerEntry {
                    event_type: LedgerEventType::PlanChanged,
                    stripe_event_id: input.stripe_event_id,
                    status_before: Some(status_before),
                    status_after: Some(target_status),
                    plan_before: Some(plan_before),
                    plan_after: Some(target_plan),
                    source: input.source,
                    note: Some(note),
                },
            )
            .await?;

        tracing::info!(
            workspace_id = %workspace_id,
            plan_after = %target_plan,
            status_after = %target_status,
            ledger_entry_id = %ledger_entry_id,
            "Applied plan enforcement"
        );

        Ok(EnforcementResult {
            workspace_id: workspace_id.to_string(),
            plan_changed,
            status_changed,
            plan_before,
            plan_after: target_plan,
            status_before,
            status_after: target_status,
            ledger_entry_id,
        })
    }
}
