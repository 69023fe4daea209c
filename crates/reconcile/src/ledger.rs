//! Append-only billing ledger
//!
//! Every reconciliation decision, including no-ops, is recorded here.
//! Entries are never updated or deleted: the ledger is evidence, not
//! working state, and the entry sequence for a workspace is a complete
//! causal history sufficient to reconstruct its current plan and status
//! by folding over it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ReconcileError, ReconcileResult};
use crate::store::LedgerStore;
use crate::types::{WorkspacePlan, WorkspaceStatus};

/// Origin of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerSource {
    Webhook,
    Replay,
    Auditor,
    Manual,
    Enforcement,
}

impl LedgerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerSource::Webhook => "webhook",
            LedgerSource::Replay => "replay",
            LedgerSource::Auditor => "auditor",
            LedgerSource::Manual => "manual",
            LedgerSource::Enforcement => "enforcement",
        }
    }
}

impl std::fmt::Display for LedgerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LedgerSource {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webhook" => Ok(LedgerSource::Webhook),
            "replay" => Ok(LedgerSource::Replay),
            "auditor" => Ok(LedgerSource::Auditor),
            "manual" => Ok(LedgerSource::Manual),
            "enforcement" => Ok(LedgerSource::Enforcement),
            other => Err(ReconcileError::InvalidInput(format!(
                "invalid ledger source: {other}, must be one of webhook, replay, auditor, manual, enforcement"
            ))),
        }
    }
}

/// What kind of reconciliation decision an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventType {
    StatusChanged,
    PlanChanged,
    DriftDetected,
}

impl LedgerEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEventType::StatusChanged => "status_changed",
            LedgerEventType::PlanChanged => "plan_changed",
            LedgerEventType::DriftDetected => "drift_detected",
        }
    }
}

impl std::fmt::Display for LedgerEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LedgerEventType {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status_changed" => Ok(LedgerEventType::StatusChanged),
            "plan_changed" => Ok(LedgerEventType::PlanChanged),
            "drift_detected" => Ok(LedgerEventType::DriftDetected),
            other => Err(ReconcileError::InvalidInput(format!(
                "invalid ledger event type: {other}"
            ))),
        }
    }
}

/// Input for one ledger entry
///
/// `before` may equal `after`: a no-op entry is a deliberate record that
/// reconciliation ran and found nothing to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub event_type: LedgerEventType,
    /// Correlation id of the originating external event, when there is one
    pub stripe_event_id: Option<String>,
    pub status_before: Option<WorkspaceStatus>,
    pub status_after: Option<WorkspaceStatus>,
    pub plan_before: Option<WorkspacePlan>,
    pub plan_after: Option<WorkspacePlan>,
    pub source: LedgerSource,
    pub note: Option<String>,
}

/// Persisted ledger entry with its server-assigned id and timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub workspace_id: String,
    pub event_type: LedgerEventType,
    pub stripe_event_id: Option<String>,
    pub status_before: Option<WorkspaceStatus>,
    pub status_after: Option<WorkspaceStatus>,
    pub plan_before: Option<WorkspacePlan>,
    pub plan_after: Option<WorkspacePlan>,
    pub source: LedgerSource,
    pub note: Option<String>,
    pub recorded_at: OffsetDateTime,
}

/// Service wrapper over the append-only ledger store
#[derive(Clone)]
pub struct BillingLedger {
    store: Arc<dyn LedgerStore>,
}

impl BillingLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Record one reconciliation decision
    ///
    /// Append-only; a persistence failure propagates to the caller so
    /// reconciliation is never silently treated as complete.
    pub async fn record(
        &self,
        workspace_id: &str,
        entry: NewLedgerEntry,
    ) -> ReconcileResult<String> {
        if workspace_id.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "workspace_id must be a non-empty string".to_string(),
            ));
        }

        let event_type = entry.event_type;
        let source = entry.source;
        let entry_id = self.store.append(workspace_id, entry).await?;

        tracing::info!(
            workspace_id = %workspace_id,
            entry_id = %entry_id,
            event_type = %event_type,
            source = %source,
            "Recorded billing ledger entry"
        );

        Ok(entry_id)
    }

    /// Recent entries for a workspace, newest first
    pub async fn recent(
        &self,
        workspace_id: &str,
        limit: i64,
    ) -> ReconcileResult<Vec<LedgerEntry>> {
        self.store.recent(workspace_id, limit).await
    }

    /// Recent entries from one source, newest first
    pub async fn by_source(
        &self,
        workspace_id: &str,
        source: LedgerSource,
        limit: i64,
    ) -> ReconcileResult<Vec<LedgerEntry>> {
        self.store.by_source(workspace_id, source, limit).await
    }

    /// Recent entries of one event type, newest first
    pub async fn by_type(
        &self,
        workspace_id: &str,
        event_type: LedgerEventType,
        limit: i64,
    ) -> ReconcileResult<Vec<LedgerEntry>> {
        self.store.by_type(workspace_id, event_type, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_round_trips_through_str() {
        for source in [
            LedgerSource::Webhook,
            LedgerSource::Replay,
            LedgerSource::Auditor,
            LedgerSource::Manual,
            LedgerSource::Enforcement,
        ] {
            assert_eq!(source.as_str().parse::<LedgerSource>().unwrap(), source);
        }
        assert!("cron".parse::<LedgerSource>().is_err());
    }

    #[test]
    fn event_type_round_trips_through_str() {
        for event_type in [
            LedgerEventType::StatusChanged,
            LedgerEventType::PlanChanged,
            LedgerEventType::DriftDetected,
        ] {
            assert_eq!(
                event_type.as_str().parse::<LedgerEventType>().unwrap(),
                event_type
            );
        }
    }
}
