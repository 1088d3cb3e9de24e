//! Mapping between LemonSqueezy customer ids and local users.

use rusqlite::Connection;

use crate::config::CustomerIdConflictPolicy;
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// First link for this user.
    Linked,
    /// Already linked to the same customer id.
    Unchanged,
    /// Linked to a different id, which was kept.
    KeptExisting,
    /// Linked to a different id, which was replaced.
    Overwritten,
}

/// Record `customer_id` as the user's LemonSqueezy customer id.
///
/// Re-linking to the same id is a no-op. A different existing id is handled
/// according to `policy`; `Reject` fails the event with `Conflict`.
pub fn link_customer_id(
    conn: &Connection,
    policy: CustomerIdConflictPolicy,
    user_id: &str,
    customer_id: &str,
    source: &str,
) -> Result<LinkOutcome> {
    let user = queries::get_user_by_id(conn, user_id)?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

    let outcome = match user.lemon_squeezy_customer_id.as_deref() {
        None => {
            queries::set_user_customer_id(conn, user_id, customer_id)?;
            LinkOutcome::Linked
        }
        Some(existing) if existing == customer_id => LinkOutcome::Unchanged,
        Some(existing) => {
            tracing::warn!(
                "User {} is linked to customer {} but {} event carries customer {}",
                user_id,
                existing,
                source,
                customer_id
            );
            match policy {
                CustomerIdConflictPolicy::Keep => LinkOutcome::KeptExisting,
                CustomerIdConflictPolicy::Overwrite => {
                    queries::set_user_customer_id(conn, user_id, customer_id)?;
                    LinkOutcome::Overwritten
                }
                CustomerIdConflictPolicy::Reject => {
                    return Err(AppError::Conflict(format!(
                        "customer id mismatch for user {}: stored {}, received {}",
                        user_id, existing, customer_id
                    )));
                }
            }
        }
    };

    if matches!(outcome, LinkOutcome::Linked | LinkOutcome::Overwritten) {
        tracing::info!(
            "Updated LemonSqueezy customer ID from {}: user={}, customer={}",
            source,
            user_id,
            customer_id
        );
    }
    Ok(outcome)
}

/// Find the user behind an external customer id, falling back to the id as a user id.
pub fn find_user_by_customer_id(conn: &Connection, customer_id: &str) -> Result<Option<User>> {
    let user = queries::find_user_by_customer_id(conn, customer_id)?;
    match &user {
        Some(u) => tracing::debug!("Customer {} resolved to user {}", customer_id, u.id),
        None => tracing::warn!("No user found for LemonSqueezy customer ID: {}", customer_id),
    }
    Ok(user)
}
