use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        -- Users (only the fields the billing pipeline reads or writes)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT,
            role TEXT NOT NULL DEFAULT 'USER' CHECK (role IN ('USER', 'PREMIUM', 'ADMIN')),
            lemon_squeezy_customer_id TEXT,
            subscription_status TEXT,
            plan_name TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_ls_customer ON users(lemon_squeezy_customer_id);

        -- Plans (one per LemonSqueezy variant, overwritten on every upsert)
        CREATE TABLE IF NOT EXISTS plans (
            id TEXT PRIMARY KEY,
            product_id INTEGER NOT NULL,
            product_name TEXT NOT NULL DEFAULT '',
            variant_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            price TEXT NOT NULL DEFAULT '0',
            is_usage_based INTEGER NOT NULL DEFAULT 0,
            is_one_time_payment INTEGER NOT NULL DEFAULT 0,
            interval TEXT NOT NULL DEFAULT '',
            interval_count INTEGER NOT NULL DEFAULT 0,
            trial_interval TEXT NOT NULL DEFAULT '',
            trial_interval_count INTEGER NOT NULL DEFAULT 0,
            sort INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Subscriptions (history per user; newest created_at is current)
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            lemon_squeezy_id TEXT NOT NULL UNIQUE,
            order_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            status TEXT NOT NULL,
            status_formatted TEXT NOT NULL,
            renews_at INTEGER,
            ends_at INTEGER,
            trial_ends_at INTEGER,
            price TEXT NOT NULL,
            is_usage_based INTEGER NOT NULL DEFAULT 0,
            is_paused INTEGER NOT NULL DEFAULT 0,
            subscription_item_id INTEGER,
            lemon_squeezy_variant_id TEXT,
            lemon_squeezy_order_id TEXT,
            provider_updated_at INTEGER,
            user_id TEXT NOT NULL REFERENCES users(id),
            plan_id TEXT NOT NULL REFERENCES plans(id),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id, created_at);

        -- Webhook audit log (one row per accepted delivery, never deleted)
        CREATE TABLE IF NOT EXISTS webhook_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_name TEXT NOT NULL,
            body TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            processing_error TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_processed ON webhook_events(processed);
        CREATE INDEX IF NOT EXISTS idx_webhook_events_failed ON webhook_events(processing_error)
            WHERE processing_error IS NOT NULL;
        "#,
    )
}
