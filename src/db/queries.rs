use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, types::Value};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{
    FromRow, PLAN_COLS, SUBSCRIPTION_COLS, USER_COLS, WEBHOOK_EVENT_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builder for UPDATE statements where only some columns change.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
        }
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Apply the update (always bumping `updated_at`) and return the row.
    /// Returns None if no row has this id.
    fn execute_returning<T: FromRow>(
        mut self,
        conn: &Connection,
        returning_cols: &str,
    ) -> Result<Option<T>> {
        self.fields.push(("updated_at", now().into()));
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? RETURNING {}",
            self.table,
            sets.join(", "),
            returning_cols
        );
        conn.query_row(&sql, rusqlite::params_from_iter(values), T::from_row)
            .optional()
            .map_err(Into::into)
    }
}

// ============ Users ============

pub fn create_user(conn: &Connection, input: &CreateUser) -> Result<User> {
    let id = gen_id();
    let now = now();
    let email = input.email.trim().to_lowercase();

    conn.execute(
        "INSERT INTO users (id, email, name, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, &email, &input.name, UserRole::User.as_str(), now, now],
    )?;

    Ok(User {
        id,
        email,
        name: input.name.clone(),
        role: UserRole::User,
        lemon_squeezy_customer_id: None,
        subscription_status: None,
        plan_name: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

/// Exact match on the stored LemonSqueezy customer id. No fallback.
pub fn get_user_by_customer_id(conn: &Connection, customer_id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM users WHERE lemon_squeezy_customer_id = ?1
             ORDER BY created_at ASC LIMIT 1",
            USER_COLS
        ),
        &[&customer_id],
    )
}

/// Resolve a user from an external customer id.
///
/// Matches `lemon_squeezy_customer_id` first, then falls back to treating
/// the value as a local user id (users who bought before being linked).
pub fn find_user_by_customer_id(conn: &Connection, customer_id: &str) -> Result<Option<User>> {
    if let Some(user) = get_user_by_customer_id(conn, customer_id)? {
        return Ok(Some(user));
    }
    get_user_by_id(conn, customer_id)
}

/// Unconditionally write the customer id. Conflict policy lives in the linker.
pub fn set_user_customer_id(conn: &Connection, user_id: &str, customer_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE users SET lemon_squeezy_customer_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![customer_id, now(), user_id],
    )?;
    Ok(affected > 0)
}

/// Record the latest subscription status on the user and derive the role from it.
///
/// Statuses with no role mapping (paused, past_due, unpaid) leave the role as is.
/// `plan_name` is only written when known.
pub fn update_user_subscription_status(
    conn: &Connection,
    user_id: &str,
    status: SubscriptionStatus,
    plan_name: Option<&str>,
) -> Result<Option<User>> {
    UpdateBuilder::new("users", user_id)
        .set("subscription_status", status.as_str().to_string())
        .set_opt("role", UserRole::for_status(status).map(|r| r.as_str().to_string()))
        .set_opt("plan_name", plan_name.map(str::to_string))
        .execute_returning(conn, USER_COLS)
}

// ============ Plans ============

/// Insert or fully overwrite the plan for `input.variant_id`.
pub fn upsert_plan(conn: &Connection, input: &UpsertPlan) -> Result<Plan> {
    let now = now();
    let plan = conn.query_row(
        &format!(
            "INSERT INTO plans (id, product_id, product_name, variant_id, name, description, price,
                is_usage_based, is_one_time_payment, interval, interval_count, trial_interval,
                trial_interval_count, sort, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
             ON CONFLICT(variant_id) DO UPDATE SET
                product_id = excluded.product_id,
                product_name = excluded.product_name,
                name = excluded.name,
                description = excluded.description,
                price = excluded.price,
                is_usage_based = excluded.is_usage_based,
                is_one_time_payment = excluded.is_one_time_payment,
                interval = excluded.interval,
                interval_count = excluded.interval_count,
                trial_interval = excluded.trial_interval,
                trial_interval_count = excluded.trial_interval_count,
                sort = excluded.sort,
                updated_at = excluded.updated_at
             RETURNING {}",
            PLAN_COLS
        ),
        params![
            gen_id(),
            input.product_id,
            &input.product_name,
            input.variant_id,
            &input.name,
            &input.description,
            &input.price,
            input.is_usage_based as i32,
            input.is_one_time_payment as i32,
            &input.interval,
            input.interval_count,
            &input.trial_interval,
            input.trial_interval_count,
            input.sort,
            now,
        ],
        Plan::from_row,
    )?;
    Ok(plan)
}

pub fn get_plan_by_variant_id(conn: &Connection, variant_id: i64) -> Result<Option<Plan>> {
    query_one(
        conn,
        &format!("SELECT {} FROM plans WHERE variant_id = ?1", PLAN_COLS),
        &[&variant_id],
    )
}

// ============ Subscriptions ============

pub fn get_subscription_by_ls_id(
    conn: &Connection,
    lemon_squeezy_id: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE lemon_squeezy_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&lemon_squeezy_id],
    )
}

/// Most recently created subscription for a user (the current plan).
pub fn get_latest_subscription_for_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            SUBSCRIPTION_COLS
        ),
        &[&user_id],
    )
}

pub fn list_subscriptions_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Subscription>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
            SUBSCRIPTION_COLS
        ),
        &[&user_id],
    )
}

pub fn create_subscription(
    conn: &Connection,
    input: &UpsertSubscription,
    user_id: &str,
    plan_id: &str,
) -> Result<Subscription> {
    let now = now();
    let subscription = conn.query_row(
        &format!(
            "INSERT INTO subscriptions (id, lemon_squeezy_id, order_id, name, email, status,
                status_formatted, renews_at, ends_at, trial_ends_at, price, is_usage_based,
                is_paused, subscription_item_id, lemon_squeezy_variant_id, lemon_squeezy_order_id,
                provider_updated_at, user_id, plan_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                ?18, ?19, ?20, ?20)
             RETURNING {}",
            SUBSCRIPTION_COLS
        ),
        params![
            gen_id(),
            &input.lemon_squeezy_id,
            input.order_id,
            &input.name,
            &input.email,
            input.status.as_str(),
            &input.status_formatted,
            input.renews_at,
            input.ends_at,
            input.trial_ends_at,
            &input.price,
            input.is_usage_based as i32,
            input.is_paused as i32,
            input.subscription_item_id,
            &input.lemon_squeezy_variant_id,
            &input.lemon_squeezy_order_id,
            input.provider_updated_at,
            user_id,
            plan_id,
            now,
        ],
        Subscription::from_row,
    )?;
    Ok(subscription)
}

/// Overwrite the mutable fields of an existing subscription.
///
/// Ownership (`user_id`, `plan_id`) and the snapshot taken at creation
/// (`order_id`, `name`, `email`, `is_usage_based`, `subscription_item_id`)
/// are never touched.
pub fn update_subscription(
    conn: &Connection,
    id: &str,
    input: &UpsertSubscription,
) -> Result<Option<Subscription>> {
    UpdateBuilder::new("subscriptions", id)
        .set("status", input.status.as_str().to_string())
        .set("status_formatted", input.status_formatted.clone())
        .set("renews_at", input.renews_at)
        .set("ends_at", input.ends_at)
        .set("trial_ends_at", input.trial_ends_at)
        .set("price", input.price.clone())
        .set("is_paused", input.is_paused as i32)
        .set_opt("lemon_squeezy_variant_id", input.lemon_squeezy_variant_id.clone())
        .set_opt("lemon_squeezy_order_id", input.lemon_squeezy_order_id.clone())
        .set_opt("provider_updated_at", input.provider_updated_at)
        .execute_returning(conn, SUBSCRIPTION_COLS)
}

/// Status update used by the lifecycle path when plan data is absent.
///
/// Writes status, pause and timing fields; price and plan stay as they are.
pub fn update_subscription_status(
    conn: &Connection,
    id: &str,
    change: &SubscriptionStatusChange,
) -> Result<Option<Subscription>> {
    UpdateBuilder::new("subscriptions", id)
        .set("status", change.status.as_str().to_string())
        .set("status_formatted", change.status_formatted.clone())
        .set("renews_at", change.renews_at)
        .set("ends_at", change.ends_at)
        .set("trial_ends_at", change.trial_ends_at)
        .set("is_paused", change.is_paused as i32)
        .set_opt("lemon_squeezy_variant_id", change.lemon_squeezy_variant_id.clone())
        .set_opt("provider_updated_at", change.provider_updated_at)
        .execute_returning(conn, SUBSCRIPTION_COLS)
}

// ============ Webhook Events ============

pub fn create_webhook_event(
    conn: &Connection,
    event_name: &str,
    body: &str,
) -> Result<WebhookEventRecord> {
    let now = now();
    conn.execute(
        "INSERT INTO webhook_events (event_name, body, processed, created_at)
         VALUES (?1, ?2, 0, ?3)",
        params![event_name, body, now],
    )?;

    Ok(WebhookEventRecord {
        id: conn.last_insert_rowid(),
        event_name: event_name.to_string(),
        body: body.to_string(),
        processed: false,
        processing_error: None,
        created_at: now,
    })
}

/// Record the outcome of a handling attempt. `processing_error` is cleared on success.
pub fn update_webhook_event_status(
    conn: &Connection,
    id: i64,
    processed: bool,
    processing_error: Option<&str>,
) -> Result<Option<WebhookEventRecord>> {
    query_one(
        conn,
        &format!(
            "UPDATE webhook_events SET processed = ?1, processing_error = ?2
             WHERE id = ?3 RETURNING {}",
            WEBHOOK_EVENT_COLS
        ),
        &[&(processed as i32), &processing_error, &id],
    )
}

pub fn get_webhook_event(conn: &Connection, id: i64) -> Result<Option<WebhookEventRecord>> {
    query_one(
        conn,
        &format!("SELECT {} FROM webhook_events WHERE id = ?1", WEBHOOK_EVENT_COLS),
        &[&id],
    )
}

/// Events whose handling never concluded, oldest first (replay order).
pub fn list_unprocessed_webhook_events(conn: &Connection) -> Result<Vec<WebhookEventRecord>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_events WHERE processed = 0 ORDER BY created_at ASC, id ASC",
            WEBHOOK_EVENT_COLS
        ),
        &[],
    )
}

/// Events that concluded with an error, newest first.
pub fn list_failed_webhook_events(
    conn: &Connection,
    limit: i64,
) -> Result<Vec<WebhookEventRecord>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_events WHERE processing_error IS NOT NULL
             ORDER BY created_at DESC, id DESC LIMIT ?1",
            WEBHOOK_EVENT_COLS
        ),
        &[&limit],
    )
}

pub fn count_webhook_events(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM webhook_events", [], |row| row.get(0))?;
    Ok(count)
}
