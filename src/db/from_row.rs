//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! Models implement `FromRow` to define how they are built from a row;
//! `query_one` and `query_all` cover the common query shapes.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// Invalid enum values (corruption, manual edits) surface as errors instead of panics.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, name, role, lemon_squeezy_customer_id, subscription_status, plan_name, created_at, updated_at";

pub const PLAN_COLS: &str = "id, product_id, product_name, variant_id, name, description, price, is_usage_based, is_one_time_payment, interval, interval_count, trial_interval, trial_interval_count, sort, created_at, updated_at";

pub const SUBSCRIPTION_COLS: &str = "id, lemon_squeezy_id, order_id, name, email, status, status_formatted, renews_at, ends_at, trial_ends_at, price, is_usage_based, is_paused, subscription_item_id, lemon_squeezy_variant_id, lemon_squeezy_order_id, provider_updated_at, user_id, plan_id, created_at, updated_at";

pub const WEBHOOK_EVENT_COLS: &str =
    "id, event_name, body, processed, processing_error, created_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            role: parse_enum(row, 3, "role")?,
            lemon_squeezy_customer_id: row.get(4)?,
            subscription_status: row.get(5)?,
            plan_name: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for Plan {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Plan {
            id: row.get(0)?,
            product_id: row.get(1)?,
            product_name: row.get(2)?,
            variant_id: row.get(3)?,
            name: row.get(4)?,
            description: row.get(5)?,
            price: row.get(6)?,
            is_usage_based: row.get::<_, i32>(7)? != 0,
            is_one_time_payment: row.get::<_, i32>(8)? != 0,
            interval: row.get(9)?,
            interval_count: row.get(10)?,
            trial_interval: row.get(11)?,
            trial_interval_count: row.get(12)?,
            sort: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            lemon_squeezy_id: row.get(1)?,
            order_id: row.get(2)?,
            name: row.get(3)?,
            email: row.get(4)?,
            status: parse_enum(row, 5, "status")?,
            status_formatted: row.get(6)?,
            renews_at: row.get(7)?,
            ends_at: row.get(8)?,
            trial_ends_at: row.get(9)?,
            price: row.get(10)?,
            is_usage_based: row.get::<_, i32>(11)? != 0,
            is_paused: row.get::<_, i32>(12)? != 0,
            subscription_item_id: row.get(13)?,
            lemon_squeezy_variant_id: row.get(14)?,
            lemon_squeezy_order_id: row.get(15)?,
            provider_updated_at: row.get(16)?,
            user_id: row.get(17)?,
            plan_id: row.get(18)?,
            created_at: row.get(19)?,
            updated_at: row.get(20)?,
        })
    }
}

impl FromRow for WebhookEventRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookEventRecord {
            id: row.get(0)?,
            event_name: row.get(1)?,
            body: row.get(2)?,
            processed: row.get::<_, i32>(3)? != 0,
            processing_error: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}
