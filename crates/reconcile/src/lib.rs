// Reconcile crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Playmaker Billing Reconciliation
//!
//! Keeps the locally-cached workspace billing state (plan + lifecycle
//! status) in agreement with the external subscription provider, in the
//! presence of out-of-order webhooks, missed events, duplicate deliveries,
//! and manual drift.
//!
//! ## Components
//!
//! - **Plan Mapping**: price id -> plan tier and provider status ->
//!   workspace status translation
//! - **Billing Ledger**: append-only record of every reconciliation
//!   decision, including no-ops
//! - **Enforcement Engine**: the single idempotent path by which a
//!   workspace's plan/status may change
//! - **Drift Auditor**: read-mostly comparator that classifies drift and
//!   self-heals the mechanical cases
//! - **Event Replay**: re-derives state from stored provider events
//!
//! The provider is strictly read-only at this crate's boundary; nothing
//! here can write back to the billing system.

pub mod auditor;
pub mod enforcement;
pub mod error;
pub mod ledger;
pub mod plan_mapping;
pub mod postgres;
pub mod provider;
pub mod replay;
pub mod store;
pub mod types;


pub use auditor::{AuditReport, DriftAuditor, DriftKind, DriftReason, RecommendedFix};
pub use enforcement::{EnforceInput, EnforcementEngine, EnforcementResult};
pub use error::{ReconcileError, ReconcileResult};
pub use ledger::{
    BillingLedger, LedgerEntry, LedgerEventType, LedgerSource, NewLedgerEntry,
};
pub use plan_mapping::{
    display_name, limits_for, monthly_price_usd, status_for_stripe, PlanCatalog, PlanLimits,
};
pub use postgres::{PgLedgerStore, PgWorkspaceStore};
pub use provider::{StripeProvider, SubscriptionProvider};
pub use replay::{EventReplay, ReplayReport, ReplayedEvent, SkippedEvent};
pub use store::{LedgerStore, WorkspaceStore};
pub use types::{
    BillingEvent, BillingLink, SubscriptionSnapshot, Workspace, WorkspacePatch, WorkspacePlan,
    WorkspaceStatus, WorkspaceUsage,
};

use std::sync::Arc;

use sqlx::PgPool;

/// Main reconciliation service combining all components
#[derive(Clone)]
pub struct ReconcileService {
    pub catalog: Arc<PlanCatalog>,
    pub ledger: BillingLedger,
    pub enforcement: EnforcementEngine,
    pub auditor: DriftAuditor,
    pub replay: EventReplay,
}

impl ReconcileService {
    /// Create a service with explicit collaborators
    pub fn new(
        workspaces: Arc<dyn WorkspaceStore>,
        ledger_store: Arc<dyn LedgerStore>,
        provider: Arc<dyn SubscriptionProvider>,
        catalog: PlanCatalog,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let ledger = BillingLedger::new(ledger_store);
        let enforcement =
            EnforcementEngine::new(workspaces.clone(), ledger.clone(), catalog.clone());
        let auditor = DriftAuditor::new(
            workspaces.clone(),
            provider.clone(),
            ledger.clone(),
            catalog.clone(),
            enforcement.clone(),
        );
        let replay = EventReplay::new(workspaces, provider, enforcement.clone());

        Self {
            catalog,
            ledger,
            enforcement,
            auditor,
            replay,
        }
    }

    /// Create a service from environment variables, backed by Postgres
    /// stores and the Stripe API
    pub fn from_env(pool: PgPool) -> ReconcileResult<Self> {
        dotenvy::dotenv().ok();

        let catalog = PlanCatalog::from_env()?;
        let provider = StripeProvider::from_env()?;

        Ok(Self::new(
            Arc::new(PgWorkspaceStore::new(pool.clone())),
            Arc::new(PgLedgerStore::new(pool)),
            Arc::new(provider),
            catalog,
        ))
    }

    /// Apply one live external event with source=webhook
    ///
    /// Entry point for the deployment's webhook receiver once it has
    /// verified the delivery and resolved the workspace.
    pub async fn ingest_event(
        &self,
        workspace_id: &str,
        event: &BillingEvent,
    ) -> ReconcileResult<EnforcementResult> {
        self.enforcement
            .enforce(
                workspace_id,
                EnforceInput {
                    price_id: event.price_id.clone(),
                    external_status: event.status.clone(),
                    source: LedgerSource::Webhook,
                    stripe_event_id: Some(event.event_id.clone()),
                },
            )
            .await
    }
}
