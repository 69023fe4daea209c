//! External subscription provider boundary
//!
//! The provider is read-only by construction: this trait exposes no
//! mutating method, so nothing in the reconciliation core can write back
//! to the billing system. That absence is what keeps the provider
//! unambiguously authoritative and rules out feedback loops.

use async_trait::async_trait;
use stripe::{Client, EventObject, Subscription};
use time::OffsetDateTime;

use crate::error::{ReconcileError, ReconcileResult};
use crate::types::{BillingEvent, SubscriptionSnapshot};

/// Read-only view of the external billing provider
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    /// Fetch the current state of a subscription
    ///
    /// Returns `Ok(None)` when the provider reports the subscription
    /// unknown or deleted; that is a drift condition for the auditor,
    /// not an error.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> ReconcileResult<Option<SubscriptionSnapshot>>;

    /// Stored subscription events for a customer, oldest first
    async fn subscription_events(
        &self,
        customer_id: &str,
    ) -> ReconcileResult<Vec<BillingEvent>>;
}

/// Production provider backed by the Stripe API
#[derive(Clone)]
pub struct StripeProvider {
    client: Client,
}

impl StripeProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a provider from `STRIPE_SECRET_KEY`
    pub fn from_env() -> ReconcileResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| ReconcileError::Config("STRIPE_SECRET_KEY must be set".to_string()))?;
        Ok(Self::new(Client::new(secret_key)))
    }
}

#[async_trait]
impl SubscriptionProvider for StripeProvider {
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> ReconcileResult<Option<SubscriptionSnapshot>> {
        let sub_id: stripe::SubscriptionId = subscription_id.parse().map_err(|_| {
            ReconcileError::InvalidInput(format!(
                "malformed subscription id: {subscription_id}"
            ))
        })?;

        let subscription = match Subscription::retrieve(&self.client, &sub_id, &[]).await {
            Ok(subscription) => subscription,
            Err(stripe::StripeError::Stripe(ref request_error))
                if request_error.http_status == 404 =>
            {
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Some(snapshot_from(&subscription)))
    }

    async fn subscription_events(
        &self,
        customer_id: &str,
    ) -> ReconcileResult<Vec<BillingEvent>> {
        let mut params = stripe::ListEvents::new();
        params.limit = Some(100);

        let events = stripe::Event::list(&self.client, &params).await?;

        let mut out: Vec<BillingEvent> = events
            .data
            .into_iter()
            .filter_map(|event| {
                let EventObject::Subscription(subscription) = event.data.object else {
                    return None;
                };
                if subscription.customer.id().as_str() != customer_id {
                    return None;
                }
                let snapshot = snapshot_from(&subscription);
                let price_id = snapshot.price_id?;

                Some(BillingEvent {
                    event_id: event.id.to_string(),
                    price_id,
                    status: snapshot.status,
                    created: OffsetDateTime::from_unix_timestamp(event.created)
                        .unwrap_or_else(|_| OffsetDateTime::now_utc()),
                })
            })
            .collect();

        out.sort_by_key(|event| event.created);
        Ok(out)
    }
}

fn snapshot_from(subscription: &Subscription) -> SubscriptionSnapshot {
    let price_id = subscription
        .items
        .data
        .first()
        .and_then(|item| item.price.as_ref())
        .map(|price| price.id.to_string());

    SubscriptionSnapshot {
        subscription_id: subscription.id.to_string(),
        status: subscription.status.to_string(),
        price_id,
        current_period_end: OffsetDateTime::from_unix_timestamp(
            subscription.current_period_end,
        )
        .ok(),
    }
}
