use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};

/// Portal URL used when the API cannot supply one.
pub fn fallback_portal_url(portal_base: &str, customer_id: &str) -> String {
    format!("{}?customer_id={}", portal_base, customer_id)
}

/// Resolve the LemonSqueezy customer portal URL for a local user.
///
/// Prefers the portal link of the user's most recent subscription as reported
/// by the API. Any upstream failure falls back to the configured portal.
pub async fn customer_portal_url(state: &AppState, user_id: &str) -> Result<String> {
    let (customer_id, subscription) = {
        let conn = state.db.get()?;
        let user = queries::get_user_by_id(&conn, user_id)?
            .ok_or_else(|| AppError::NotFound(msg::USER_NOT_FOUND.into()))?;
        let customer_id = user
            .lemon_squeezy_customer_id
            .ok_or_else(|| AppError::Conflict(msg::NO_CUSTOMER_ID.into()))?;
        let subscription = queries::get_latest_subscription_for_user(&conn, user_id)?;
        (customer_id, subscription)
    };

    if let Some(subscription) = subscription {
        tracing::info!(
            "Looking up portal URL for user {} via subscription {}",
            user_id,
            subscription.lemon_squeezy_id
        );
        match state
            .client
            .get_subscription(&subscription.lemon_squeezy_id)
            .await
            .into_result()
        {
            Ok(remote) => {
                if let Some(url) = remote
                    .attributes
                    .urls
                    .and_then(|u| u.customer_portal)
                    .filter(|u| !u.is_empty())
                {
                    return Ok(url);
                }
                tracing::info!(
                    "Subscription {} has no customer portal URL",
                    subscription.lemon_squeezy_id
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch subscription {} for portal URL: {}",
                    subscription.lemon_squeezy_id,
                    e
                );
            }
        }
    }

    tracing::info!("Using default customer portal URL for user {}", user_id);
    Ok(fallback_portal_url(
        &state.lemonsqueezy.portal_url,
        &customer_id,
    ))
}
