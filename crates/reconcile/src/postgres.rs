//! Postgres-backed store implementations
//!
//! Plans, statuses, and sources are stored as their wire strings; rows are
//! decoded through plain row structs and parsed into the typed enums so a
//! corrupted value surfaces as an error instead of a silent default.

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ReconcileResult;
use crate::ledger::{LedgerEntry, LedgerEventType, LedgerSource, NewLedgerEntry};
use crate::store::{LedgerStore, WorkspaceStore};
use crate::types::{BillingLink, Workspace, WorkspacePatch, WorkspaceUsage};

#[derive(Debug, sqlx::FromRow)]
struct WorkspaceRow {
    id: String,
    name: String,
    plan: String,
    status: String,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    current_period_end: Option<OffsetDateTime>,
    player_count: i64,
    games_this_month: i64,
    storage_used_mb: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl WorkspaceRow {
    fn into_workspace(self) -> ReconcileResult<Workspace> {
        Ok(Workspace {
            plan: self.plan.parse()?,
            status: self.status.parse()?,
            id: self.id,
            name: self.name,
            billing: BillingLink {
                stripe_customer_id: self.stripe_customer_id,
                stripe_subscription_id: self.stripe_subscription_id,
                current_period_end: self.current_period_end,
            },
            usage: WorkspaceUsage {
                player_count: self.player_count,
                games_this_month: self.games_this_month,
                storage_used_mb: self.storage_used_mb,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

const WORKSPACE_COLUMNS: &str = r#"
    id, name, plan, status,
    stripe_customer_id, stripe_subscription_id, current_period_end,
    player_count, games_this_month, storage_used_mb,
    created_at, updated_at, deleted_at
"#;

/// Workspace records in the `workspaces` table
#[derive(Clone)]
pub struct PgWorkspaceStore {
    pool: PgPool,
}

impl PgWorkspaceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkspaceStore for PgWorkspaceStore {
    async fn get_workspace(&self, workspace_id: &str) -> ReconcileResult<Option<Workspace>> {
        let row: Option<WorkspaceRow> = sqlx::query_as(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = $1"
        ))
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkspaceRow::into_workspace).transpose()
    }

    async fn apply_patch(
        &self,
        workspace_id: &str,
        patch: WorkspacePatch,
    ) -> ReconcileResult<()> {
        // Each arm writes exactly the patched columns, nothing else.
        match (patch.plan, patch.status) {
            (Some(plan), Some(status)) => {
                sqlx::query(
                    "UPDATE workspaces SET plan = $2, status = $3, updated_at = NOW() WHERE id = $1",
                )
                .bind(workspace_id)
                .bind(plan.as_str())
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;
            }
            (Some(plan), None) => {
                sqlx::query("UPDATE workspaces SET plan = $2, updated_at = NOW() WHERE id = $1")
                    .bind(workspace_id)
                    .bind(plan.as_str())
                    .execute(&self.pool)
                    .await?;
            }
            (None, Some(status)) => {
                sqlx::query("UPDATE workspaces SET status = $2, updated_at = NOW() WHERE id = $1")
                    .bind(workspace_id)
                    .bind(status.as_str())
                    .execute(&self.pool)
                    .await?;
            }
            (None, None) => {}
        }

        Ok(())
    }

    async fn list_linked_workspaces(&self) -> ReconcileResult<Vec<Workspace>> {
        let rows: Vec<WorkspaceRow> = sqlx::query_as(&format!(
            r#"
            SELECT {WORKSPACE_COLUMNS}
            FROM workspaces
            WHERE stripe_subscription_id IS NOT NULL
              AND deleted_at IS NULL
            ORDER BY id
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(WorkspaceRow::into_workspace)
            .collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    workspace_id: String,
    event_type: String,
    stripe_event_id: Option<String>,
    status_before: Option<String>,
    status_after: Option<String>,
    plan_before: Option<String>,
    plan_after: Option<String>,
    source: String,
    note: Option<String>,
    recorded_at: OffsetDateTime,
}

impl LedgerRow {
    fn into_entry(self) -> ReconcileResult<LedgerEntry> {
        Ok(LedgerEntry {
            event_type: self.event_type.parse()?,
            source: self.source.parse()?,
            status_before: self.status_before.as_deref().map(str::parse).transpose()?,
            status_after: self.status_after.as_deref().map(str::parse).transpose()?,
            plan_before: self.plan_before.as_deref().map(str::parse).transpose()?,
            plan_after: self.plan_after.as_deref().map(str::parse).transpose()?,
            id: self.id.to_string(),
            workspace_id: self.workspace_id,
            stripe_event_id: self.stripe_event_id,
            note: self.note,
            recorded_at: self.recorded_at,
        })
    }
}

const LEDGER_COLUMNS: &str = r#"
    id, workspace_id, event_type, stripe_event_id,
    status_before, status_after, plan_before, plan_after,
    source, note, recorded_at
"#;

/// Append-only billing ledger in the `billing_ledger` table
///
/// No UPDATE or DELETE statement exists in this module.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn append(
        &self,
        workspace_id: &str,
        entry: NewLedgerEntry,
    ) -> ReconcileResult<String> {
        // recorded_at is server-assigned via the column default
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO billing_ledger
                (workspace_id, event_type, stripe_event_id,
                 status_before, status_after, plan_before, plan_after,
                 source, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(workspace_id)
        .bind(entry.event_type.as_str())
        .bind(&entry.stripe_event_id)
        .bind(entry.status_before.map(|s| s.as_str()))
        .bind(entry.status_after.map(|s| s.as_str()))
        .bind(entry.plan_before.map(|p| p.as_str()))
        .bind(entry.plan_after.map(|p| p.as_str()))
        .bind(entry.source.as_str())
        .bind(&entry.note)
        .fetch_one(&self.pool)
        .await?;

        Ok(id.to_string())
    }

    async fn recent(&self, workspace_id: &str, limit: i64) -> ReconcileResult<Vec<LedgerEntry>> {
        let rows: Vec<LedgerRow> = sqlx::query_as(&format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM billing_ledger
            WHERE workspace_id = $1
            ORDER BY recorded_at DESC
            LIMIT $2
            "#
        ))
        .bind(workspace_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LedgerRow::into_entry).collect()
    }

    async fn by_source(
        &self,
        workspace_id: &str,
        source: LedgerSource,
        limit: i64,
    ) -> ReconcileResult<Vec<LedgerEntry>> {
        let rows: Vec<LedgerRow> = sqlx::query_as(&format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM billing_ledger
            WHERE workspace_id = $1 AND source = $2
            ORDER BY recorded_at DESC
            LIMIT $3
            "#
        ))
        .bind(workspace_id)
        .bind(source.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LedgerRow::into_entry).collect()
    }

    async fn by_type(
        &self,
        workspace_id: &str,
        event_type: LedgerEventType,
        limit: i64,
    ) -> ReconcileResult<Vec<LedgerEntry>> {
        let rows: Vec<LedgerRow> = sqlx::query_as(&format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM billing_ledger
            WHERE workspace_id = $1 AND event_type = $2
            ORDER BY recorded_at DESC
            LIMIT $3
            "#
        ))
        .bind(workspace_id)
        .bind(event_type.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LedgerRow::into_entry).collect()
    }
}
