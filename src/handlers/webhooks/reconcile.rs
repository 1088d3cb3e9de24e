//! Subscription reconciliation.
//!
//! One code path for every subscription lifecycle event. The event name only
//! matters through the `status` it carries. Callers run this inside the
//! event's transaction, so Plan, Subscription and User writes commit together.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{
    LIFETIME_INTERVAL, Subscription, SubscriptionStatusChange, UpsertPlan, UpsertSubscription,
    User,
};
use crate::payments::events::{FirstSubscriptionItem, SubscriptionAttributes};

use super::customer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// New subscription row written.
    Created {
        subscription_id: String,
        plan_id: String,
    },
    /// Existing row fully updated from complete event data.
    Updated {
        subscription_id: String,
        plan_id: String,
    },
    /// Existing row updated from status fields only.
    StatusSynced { subscription_id: String },
    /// No row for this external id and not enough data to create one.
    /// The user's status and role were still updated.
    SubscriptionMissing,
    /// Event is older than the last one applied to this subscription.
    Stale,
    /// No local user could be resolved.
    UserMissing,
}

fn ts(value: Option<DateTime<Utc>>) -> Option<i64> {
    value.map(|dt| dt.timestamp())
}

/// Plan derived from subscription attributes. One-time purchases use the
/// `lifetime` interval.
fn plan_input(
    product_id: i64,
    variant_id: i64,
    item: &FirstSubscriptionItem,
    attrs: &SubscriptionAttributes,
) -> UpsertPlan {
    let is_subscription = attrs.is_subscription.unwrap_or(true);
    let interval = if is_subscription {
        attrs.interval.clone().unwrap_or_default()
    } else {
        LIFETIME_INTERVAL.to_string()
    };

    UpsertPlan {
        product_id,
        product_name: attrs.product_name.clone().unwrap_or_default(),
        variant_id,
        name: attrs
            .product_name
            .clone()
            .or_else(|| attrs.variant_name.clone())
            .unwrap_or_default(),
        description: String::new(),
        price: item.price_id.to_string(),
        is_usage_based: item.is_usage_based.unwrap_or(false),
        is_one_time_payment: !is_subscription,
        interval,
        interval_count: attrs.interval_count.unwrap_or(0),
        trial_interval: String::new(),
        trial_interval_count: 0,
        sort: 0,
    }
}

fn subscription_input(
    lemon_squeezy_id: &str,
    item: &FirstSubscriptionItem,
    attrs: &SubscriptionAttributes,
) -> UpsertSubscription {
    UpsertSubscription {
        lemon_squeezy_id: lemon_squeezy_id.to_string(),
        order_id: attrs.order_id,
        name: attrs.user_name.clone(),
        email: attrs.user_email.clone(),
        status: attrs.status,
        status_formatted: attrs.status_formatted.clone(),
        renews_at: ts(attrs.renews_at),
        ends_at: ts(attrs.ends_at),
        trial_ends_at: ts(attrs.trial_ends_at),
        price: item.price_id.to_string(),
        is_usage_based: false,
        is_paused: is_paused(attrs),
        subscription_item_id: Some(item.id),
        lemon_squeezy_variant_id: attrs.variant_id.map(|v| v.to_string()),
        lemon_squeezy_order_id: Some(attrs.order_id.to_string()),
        provider_updated_at: ts(attrs.updated_at),
    }
}

fn is_paused(attrs: &SubscriptionAttributes) -> bool {
    attrs.pause.as_ref().is_some_and(|p| !p.is_null())
}

/// True when the incoming event predates the last one applied.
fn is_stale(existing: &Subscription, attrs: &SubscriptionAttributes) -> bool {
    match (existing.provider_updated_at, ts(attrs.updated_at)) {
        (Some(applied), Some(incoming)) => incoming < applied,
        _ => false,
    }
}

fn resolve_user(
    conn: &Connection,
    custom_user_id: Option<&str>,
    customer_id: &str,
) -> Result<Option<User>> {
    if let Some(user_id) = custom_user_id
        && let Some(user) = queries::get_user_by_id(conn, user_id)?
    {
        return Ok(Some(user));
    }
    customer::find_user_by_customer_id(conn, customer_id)
}

/// Apply a subscription lifecycle event to Plan, Subscription and User.
///
/// A new row is only created when the event carries complete plan data
/// (`product_id`, `variant_id`, `first_subscription_item`) and names its user
/// through checkout custom data. Otherwise an existing row is updated and a
/// missing one is logged, not created. The user's status and role follow the
/// event's `status` in every case except a stale event.
pub fn reconcile_subscription(
    conn: &Connection,
    lemon_squeezy_id: &str,
    attrs: &SubscriptionAttributes,
    custom_user_id: Option<&str>,
) -> Result<ReconcileOutcome> {
    let customer_id = attrs.customer_id.to_string();
    let Some(user) = resolve_user(conn, custom_user_id, &customer_id)? else {
        tracing::warn!(
            "Skipping subscription {}: no user for customer {}",
            lemon_squeezy_id,
            customer_id
        );
        return Ok(ReconcileOutcome::UserMissing);
    };

    let existing = queries::get_subscription_by_ls_id(conn, lemon_squeezy_id)?;
    if let Some(existing) = &existing
        && is_stale(existing, attrs)
    {
        tracing::info!(
            "Ignoring stale event for subscription {} (user={}): updated_at {:?} older than applied {:?}",
            lemon_squeezy_id,
            user.id,
            attrs.updated_at,
            existing.provider_updated_at
        );
        return Ok(ReconcileOutcome::Stale);
    }

    let full_data = match (attrs.product_id, attrs.variant_id, &attrs.first_subscription_item) {
        (Some(product_id), Some(variant_id), Some(item)) => Some((product_id, variant_id, item)),
        _ => {
            tracing::warn!(
                "Missing subscription data for plan creation: subscription={}, user={}, has_product_id={}, has_variant_id={}, has_first_item={}",
                lemon_squeezy_id,
                user.id,
                attrs.product_id.is_some(),
                attrs.variant_id.is_some(),
                attrs.first_subscription_item.is_some()
            );
            None
        }
    };
    let can_create = full_data.is_some() && custom_user_id == Some(user.id.as_str());

    let mut plan_name = None;
    let outcome = match (existing, full_data) {
        (Some(existing), Some((product_id, variant_id, item))) => {
            let plan = queries::upsert_plan(conn, &plan_input(product_id, variant_id, item, attrs))?;
            let input = subscription_input(lemon_squeezy_id, item, attrs);
            queries::update_subscription(conn, &existing.id, &input)?;
            tracing::info!(
                "Updated subscription {} (lemon_squeezy_id={}, plan={}, user={})",
                existing.id,
                lemon_squeezy_id,
                plan.id,
                user.id
            );
            plan_name = Some(plan.name);
            ReconcileOutcome::Updated {
                subscription_id: existing.id,
                plan_id: plan.id,
            }
        }
        (Some(existing), None) => {
            let change = SubscriptionStatusChange {
                status: attrs.status,
                status_formatted: attrs.status_formatted.clone(),
                renews_at: ts(attrs.renews_at),
                ends_at: ts(attrs.ends_at),
                trial_ends_at: ts(attrs.trial_ends_at),
                is_paused: is_paused(attrs),
                lemon_squeezy_variant_id: attrs.variant_id.map(|v| v.to_string()),
                provider_updated_at: ts(attrs.updated_at),
            };
            queries::update_subscription_status(conn, &existing.id, &change)?;
            tracing::info!(
                "Updated status of subscription {} to {} (lemon_squeezy_id={}, user={})",
                existing.id,
                attrs.status,
                lemon_squeezy_id,
                user.id
            );
            ReconcileOutcome::StatusSynced {
                subscription_id: existing.id,
            }
        }
        (None, Some((product_id, variant_id, item))) if can_create => {
            let plan = queries::upsert_plan(conn, &plan_input(product_id, variant_id, item, attrs))?;
            let input = subscription_input(lemon_squeezy_id, item, attrs);
            let subscription = queries::create_subscription(conn, &input, &user.id, &plan.id)?;
            tracing::info!(
                "Saved subscription and plan data: subscription={}, lemon_squeezy_id={}, plan={}, user={}",
                subscription.id,
                lemon_squeezy_id,
                plan.id,
                user.id
            );
            plan_name = Some(plan.name);
            ReconcileOutcome::Created {
                subscription_id: subscription.id,
                plan_id: plan.id,
            }
        }
        (None, _) => {
            tracing::warn!(
                "No subscription found with lemonSqueezyId: {} (user={})",
                lemon_squeezy_id,
                user.id
            );
            ReconcileOutcome::SubscriptionMissing
        }
    };

    queries::update_user_subscription_status(
        conn,
        &user.id,
        attrs.status,
        plan_name.as_deref().filter(|n| !n.is_empty()),
    )?;
    tracing::info!(
        "User {} subscription status set to {} (subscription={})",
        user.id,
        attrs.status,
        lemon_squeezy_id
    );

    Ok(outcome)
}
