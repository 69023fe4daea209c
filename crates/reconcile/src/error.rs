//! Reconciliation error types

use thiserror::Error;

/// Errors surfaced by the reconciliation engine
///
/// Variants follow the taxonomy callers branch on: validation failures
/// happen before any I/O, lookup failures abort with no partial mutation,
/// and persistence failures are surfaced rather than retried here (retry
/// policy belongs to the caller's queue infrastructure). Drift is never an
/// error; it is returned as structured report data.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Bad input shape: caller bug, raised before any read or write
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Workspace id does not resolve to a local record
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    /// Price id is not in the configured plan catalog
    ///
    /// A hard error by design: silently defaulting an unknown price id
    /// would corrupt convergence.
    #[error("unknown price id: {0}")]
    UnknownPriceId(String),

    /// A store write or read failed after validation passed
    ///
    /// When this comes back from `enforce`, local state and ledger may
    /// have diverged; the caller must treat reconciliation as incomplete.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Database error from the Postgres-backed stores
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stripe API error from the production provider
    #[error("stripe error: {0}")]
    Stripe(#[from] stripe::StripeError),

    /// Provider fetch failed for a reason other than an unknown subscription
    #[error("billing provider error: {0}")]
    Provider(String),

    /// Required configuration is missing or malformed
    #[error("configuration error: {0}")]
    Config(String),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
