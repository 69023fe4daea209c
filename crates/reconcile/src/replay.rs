//! External event replay
//!
//! Recovery path for gaps in live event delivery: re-feed a workspace's
//! stored subscription events through the enforcement engine in original
//! arrival order. Because enforcement compares state instead of applying
//! deltas, replaying duplicated or reordered events converges to the same
//! final state as a clean single delivery.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::enforcement::{EnforceInput, EnforcementEngine};
use crate::error::{ReconcileError, ReconcileResult};
use crate::ledger::LedgerSource;
use crate::provider::SubscriptionProvider;
use crate::store::WorkspaceStore;
use crate::types::{BillingEvent, WorkspacePlan, WorkspaceStatus};

/// One event that was re-applied during a replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayedEvent {
    pub event_id: String,
    pub price_id: String,
    pub status: String,
}

/// One event that could not be re-applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedEvent {
    pub event_id: String,
    pub reason: String,
}

/// Outcome of replaying one workspace's event history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub workspace_id: String,
    pub replayed: Vec<ReplayedEvent>,
    pub skipped: Vec<SkippedEvent>,
    /// Workspace state re-read after the replay finished
    pub final_plan: WorkspacePlan,
    pub final_status: WorkspaceStatus,
    pub total_events: usize,
}

/// Drives stored external events back through the enforcement engine
#[derive(Clone)]
pub struct EventReplay {
    workspaces: Arc<dyn WorkspaceStore>,
    provider: Arc<dyn SubscriptionProvider>,
    enforcement: EnforcementEngine,
}

impl EventReplay {
    pub fn new(
        workspaces: Arc<dyn WorkspaceStore>,
        provider: Arc<dyn SubscriptionProvider>,
        enforcement: EnforcementEngine,
    ) -> Self {
        Self {
            workspaces,
            provider,
            enforcement,
        }
    }

    /// Replay the stored event history for one workspace
    ///
    /// Events are applied oldest first with source=replay. A failure on
    /// one event is recorded as skipped and does not stop the run.
    pub async fn replay_workspace(&self, workspace_id: &str) -> ReconcileResult<ReplayReport> {
        let workspace = self
            .workspaces
            .get_workspace(workspace_id)
            .await?
            .ok_or_else(|| ReconcileError::WorkspaceNotFound(workspace_id.to_string()))?;

        let customer_id = workspace
            .billing
            .stripe_customer_id
            .clone()
            .ok_or_else(|| {
                ReconcileError::InvalidInput(format!(
                    "workspace {workspace_id} has no billing customer id, nothing to replay"
                ))
            })?;

        let mut events = self.provider.subscription_events(&customer_id).await?;
        // Oldest first, regardless of how the provider returned them.
        events.sort_by_key(|event| event.created);

        tracing::info!(
            workspace_id = %workspace_id,
            customer_id = %customer_id,
            total_events = events.len(),
            "Replaying subscription events"
        );

        let total_events = events.len();
        let mut replayed = Vec::new();
        let mut skipped = Vec::new();

        for event in events {
            match self.apply_event(workspace_id, &event).await {
                Ok(()) => replayed.push(ReplayedEvent {
                    event_id: event.event_id,
                    price_id: event.price_id,
                    status: event.status,
                }),
                Err(err) => {
                    tracing::warn!(
                        workspace_id = %workspace_id,
                        event_id = %event.event_id,
                        error = %err,
                        "Skipping event during replay"
                    );
                    skipped.push(SkippedEvent {
                        event_id: event.event_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        let final_state = self
            .workspaces
            .get_workspace(workspace_id)
            .await?
            .ok_or_else(|| ReconcileError::WorkspaceNotFound(workspace_id.to_string()))?;

        tracing::info!(
            workspace_id = %workspace_id,
            replayed = replayed.len(),
            skipped = skipped.len(),
            final_plan = %final_state.plan,
            final_status = %final_state.status,
            "Replay complete"
        );

        Ok(ReplayReport {
            workspace_id: workspace_id.to_string(),
            replayed,
            skipped,
            final_plan: final_state.plan,
            final_status: final_state.status,
            total_events,
        })
    }

    async fn apply_event(&self, workspace_id: &str, event: &BillingEvent) -> ReconcileResult<()> {
        self.enforcement
            .enforce(
                workspace_id,
                EnforceInput {
                    price_id: event.price_id.clone(),
                    external_status: event.status.clone(),
                    source: LedgerSource::Replay,
                    stripe_event_id: Some(event.event_id.clone()),
                },
            )
            .await?;
        Ok(())
    }

    /// Replay every workspace holding a subscription linkage
    ///
    /// A failure replaying one workspace does not abort the rest.
    pub async fn replay_all(&self) -> ReconcileResult<Vec<ReplayReport>> {
        let workspaces = self.workspaces.list_linked_workspaces().await?;
        let mut reports = Vec::new();

        for workspace in workspaces {
            match self.replay_workspace(&workspace.id).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::error!(
                        workspace_id = %workspace.id,
                        error = %err,
                        "Failed to replay workspace, continuing"
                    );
                }
            }
        }

        Ok(reports)
    }
}
