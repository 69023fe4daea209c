//! Store seams for workspace records and the billing ledger
//!
//! The document store is an external collaborator; these traits pin down
//! exactly what the reconciliation core needs from it: a point read, a
//! partial field update, an append-only insert, and the linkage listing
//! the batch auditor walks. Production backs them with Postgres
//! (`postgres` module); tests inject in-memory doubles.

use async_trait::async_trait;

use crate::error::ReconcileResult;
use crate::ledger::{LedgerEntry, LedgerEventType, LedgerSource, NewLedgerEntry};
use crate::types::{Workspace, WorkspacePatch};

/// Read/write access to workspace records
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Point read by workspace id
    async fn get_workspace(&self, workspace_id: &str) -> ReconcileResult<Option<Workspace>>;

    /// Partial field update
    ///
    /// Only the fields set in `patch` may appear in the persisted update;
    /// unset fields must be left untouched as writes, not merely unchanged
    /// in value. Implementations also bump the record's `updated_at`.
    async fn apply_patch(&self, workspace_id: &str, patch: WorkspacePatch)
        -> ReconcileResult<()>;

    /// All workspaces holding a subscription linkage
    async fn list_linked_workspaces(&self) -> ReconcileResult<Vec<Workspace>>;
}

/// Append-only access to the billing ledger
///
/// Deliberately exposes no update or delete: entries are immutable
/// evidence of every reconciliation decision.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append one entry, returning its server-assigned id
    async fn append(&self, workspace_id: &str, entry: NewLedgerEntry)
        -> ReconcileResult<String>;

    /// Recent entries for a workspace, newest first
    async fn recent(&self, workspace_id: &str, limit: i64) -> ReconcileResult<Vec<LedgerEntry>>;

    /// Recent entries from one source, newest first
    async fn by_source(
        &self,
        workspace_id: &str,
        source: LedgerSource,
        limit: i64,
    ) -> ReconcileResult<Vec<LedgerEntry>>;

    /// Recent entries of one event type, newest first
    async fn by_type(
        &self,
        workspace_id: &str,
        event_type: LedgerEventType,
        limit: i64,
    ) -> ReconcileResult<Vec<LedgerEntry>>;
}
