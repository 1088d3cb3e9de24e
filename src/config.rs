use std::env;
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://api.lemonsqueezy.com/v1";
const DEFAULT_PORTAL_URL: &str = "https://skillielts.lemonsqueezy.com/billing";

/// What the customer-id linker does when a user is already linked to a
/// different LemonSqueezy customer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CustomerIdConflictPolicy {
    /// Keep the existing id and log a warning.
    #[default]
    Keep,
    /// Replace the existing id, logging a warning.
    Overwrite,
    /// Fail the event; the error lands on the audit row.
    Reject,
}

impl CustomerIdConflictPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "keep" => Some(Self::Keep),
            "overwrite" => Some(Self::Overwrite),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// LemonSqueezy API credentials and endpoints.
#[derive(Debug, Clone)]
pub struct LemonSqueezyConfig {
    pub api_key: Option<String>,
    pub store_id: Option<String>,
    /// Shared secret for webhook signatures. Absence is reported per request.
    pub webhook_secret: Option<String>,
    pub api_url: String,
    /// Fallback customer portal, used when the API has no portal URL.
    pub portal_url: String,
}

/// Batched log shipping. Disabled when `url` is unset.
#[derive(Debug, Clone)]
pub struct LogSinkConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub capacity: usize,
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            batch_size: 10,
            flush_interval: Duration::from_millis(5000),
            capacity: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub dev_mode: bool,
    pub lemonsqueezy: LemonSqueezyConfig,
    pub customer_id_conflict: CustomerIdConflictPolicy,
    pub log_sink: LogSinkConfig,
}

/// Read a non-empty environment variable.
fn var_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    var_opt(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("SKILLPAY_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let customer_id_conflict = match var_opt("CUSTOMER_ID_CONFLICT") {
            Some(raw) => CustomerIdConflictPolicy::from_str(&raw).unwrap_or_else(|| {
                // Runs before the subscriber is installed
                eprintln!(
                    "Unknown CUSTOMER_ID_CONFLICT value '{}', falling back to 'keep'",
                    raw
                );
                CustomerIdConflictPolicy::Keep
            }),
            None => CustomerIdConflictPolicy::default(),
        };

        let sink_defaults = LogSinkConfig::default();

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: var_parse("PORT", 3000),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "skillpay.db".to_string()),
            dev_mode,
            lemonsqueezy: LemonSqueezyConfig {
                api_key: var_opt("LEMON_SQUEEZY_API_KEY"),
                store_id: var_opt("LEMON_SQUEEZY_STORE_ID"),
                webhook_secret: var_opt("LEMON_SQUEEZY_WEBHOOK_SECRET"),
                api_url: var_opt("LEMON_SQUEEZY_API_URL")
                    .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                portal_url: var_opt("LEMON_SQUEEZY_PORTAL_URL")
                    .unwrap_or_else(|| DEFAULT_PORTAL_URL.to_string()),
            },
            customer_id_conflict,
            log_sink: LogSinkConfig {
                url: var_opt("LOG_SINK_URL"),
                token: var_opt("LOG_SINK_TOKEN"),
                batch_size: var_parse("LOG_SINK_BATCH_SIZE", sink_defaults.batch_size).max(1),
                flush_interval: Duration::from_millis(
                    var_parse(
                        "LOG_SINK_FLUSH_INTERVAL_MS",
                        sink_defaults.flush_interval.as_millis() as u64,
                    )
                    .max(1),
                ),
                capacity: var_parse("LOG_SINK_CAPACITY", sink_defaults.capacity).max(1),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
