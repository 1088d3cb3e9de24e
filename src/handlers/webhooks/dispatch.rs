use rusqlite::{Connection, TransactionBehavior};

use crate::config::CustomerIdConflictPolicy;
use crate::error::{AppError, Result};
use crate::payments::{EventData, EventName, WebhookEvent};

use super::customer;
use super::reconcile;

/// Route a validated event to its handlers.
///
/// Everything the event writes (customer link, plan, subscription, user)
/// happens in one immediate transaction. Any handler error rolls it all back
/// and is returned as a reconciliation failure for the audit row.
pub fn process_event(
    conn: &mut Connection,
    policy: CustomerIdConflictPolicy,
    event: &WebhookEvent,
) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| AppError::Reconciliation(e.to_string()))?;

    if let Err(e) = route(&tx, policy, event) {
        tracing::error!(
            "Error processing webhook event {} (object={}): {}",
            event.name(),
            event.object_id(),
            e
        );
        return Err(match e {
            AppError::Reconciliation(_) => e,
            other => AppError::Reconciliation(other.to_string()),
        });
    }

    tx.commit()
        .map_err(|e| AppError::Reconciliation(e.to_string()))
}

fn route(conn: &Connection, policy: CustomerIdConflictPolicy, event: &WebhookEvent) -> Result<()> {
    let name = event.name();
    let customer_id = event.customer_id().to_string();
    let user_id = event.custom_user_id();
    tracing::info!(
        "Processing LemonSqueezy webhook event {} (object={})",
        name,
        event.object_id()
    );

    if name.is_subscription_event() {
        // Any subscription event proves the customer/user pairing.
        if let Some(user_id) = user_id {
            customer::link_customer_id(conn, policy, user_id, &customer_id, "subscription_event")?;
        }

        if name.is_payment_event() {
            tracing::info!(
                "Processing subscription payment event {} (object={})",
                name,
                event.object_id()
            );
        } else if let EventData::Subscription { id, attributes } = &event.data {
            if matches!(name, EventName::SubscriptionCreated)
                && let Some(user_id) = user_id
            {
                customer::link_customer_id(conn, policy, user_id, &customer_id, "subscription")?;
            }
            let outcome = reconcile::reconcile_subscription(conn, id, attributes, user_id)?;
            tracing::debug!("Reconciled subscription {}: {:?}", id, outcome);
        } else {
            tracing::warn!(
                "Subscription event {} carries order data (object={}), nothing to reconcile",
                name,
                event.object_id()
            );
        }
    }

    match name {
        EventName::SubscriptionCreated
        | EventName::SubscriptionUpdated
        | EventName::SubscriptionCancelled
        | EventName::SubscriptionExpired
        | EventName::SubscriptionResumed
        | EventName::SubscriptionPaused => {}
        EventName::OrderCreated => {
            if let Some(user_id) = user_id {
                customer::link_customer_id(conn, policy, user_id, &customer_id, "order")?;
            }
            handle_order_created(conn, event, &customer_id)?;
        }
        EventName::SubscriptionPaymentSuccess => {
            tracing::info!("Payment success for subscription {}", payment_subject(event));
        }
        EventName::SubscriptionPaymentFailed => {
            tracing::warn!("Payment failed for subscription {}", payment_subject(event));
        }
        EventName::SubscriptionPaymentRecovered => {
            tracing::info!("Payment recovered for subscription {}", payment_subject(event));
        }
        EventName::SubscriptionRefunded => {
            tracing::info!("Subscription refunded: {}", event.object_id());
        }
        EventName::OrderRefunded => {
            tracing::info!("Order refunded: {}", event.object_id());
        }
        EventName::Unhandled(other) => {
            tracing::warn!("Unhandled LemonSqueezy webhook event: {}", other);
        }
    }

    Ok(())
}

/// Subscription a payment event refers to.
fn payment_subject(event: &WebhookEvent) -> String {
    event
        .subscription()
        .and_then(|(_, attrs)| attrs.subscription_id)
        .map(|id| id.to_string())
        .unwrap_or_else(|| event.object_id().to_string())
}

/// Orders only resolve their user for now; receipts and one-off feature
/// unlocks would hang off this.
fn handle_order_created(conn: &Connection, event: &WebhookEvent, customer_id: &str) -> Result<()> {
    match customer::find_user_by_customer_id(conn, customer_id)? {
        Some(user) => tracing::info!(
            "Order {} created for user {}",
            event.object_id(),
            user.id
        ),
        None => tracing::warn!(
            "Order {} created for unknown customer {}",
            event.object_id(),
            customer_id
        ),
    }
    Ok(())
}
