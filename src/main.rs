use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skillpay::config::Config;
use skillpay::db::{AppState, create_pool, init_db};
use skillpay::handlers::{self, webhooks::replay};
use skillpay::observability::LogSink;
use skillpay::payments::portal;

#[derive(Parser, Debug)]
#[command(name = "skillpay")]
#[command(about = "LemonSqueezy webhook ingestion and subscription reconciliation")]
struct Cli {
    /// Re-dispatch stored webhook events that were never marked processed, then exit
    #[arg(long)]
    replay_unprocessed: bool,

    /// Print stored webhook events that failed processing, then exit
    #[arg(long)]
    list_failed: bool,

    /// Number of failed events to print (for --list-failed)
    #[arg(long, default_value_t = 50)]
    limit: i64,

    /// Print the customer portal URL for a user, then exit
    #[arg(long, value_name = "USER_ID")]
    portal_url: Option<String>,
}

fn print_failed_events(state: &AppState, limit: i64) -> Result<(), String> {
    let events = replay::list_failed(state, limit).map_err(|e| e.to_string())?;
    if events.is_empty() {
        println!("No failed webhook events.");
        return Ok(());
    }

    println!("{} failed webhook event(s):", events.len());
    for event in &events {
        let when = chrono::DateTime::from_timestamp(event.created_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| event.created_at.to_string());
        println!(
            "  [{}] {} at {}: {}",
            event.id,
            event.event_name,
            when,
            event.processing_error.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::from_env();

    // The sink only exists when LOG_SINK_URL is set
    let sink = LogSink::from_config(&config.log_sink);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skillpay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(sink.as_ref().map(LogSink::layer))
        .init();

    if let Some(sink) = &sink {
        sink.start();
        tracing::info!("Log shipping enabled");
    }

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.lemonsqueezy.webhook_secret.is_none() {
        tracing::warn!("LEMON_SQUEEZY_WEBHOOK_SECRET is not set; webhooks will be rejected");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState::new(db_pool, &config);

    // Operator commands run once and exit without starting the server
    let command_result = if cli.replay_unprocessed {
        Some(
            replay::replay_unprocessed(&state)
                .map(|summary| {
                    println!(
                        "Replayed {} event(s): {} succeeded, {} failed",
                        summary.replayed, summary.succeeded, summary.failed
                    );
                })
                .map_err(|e| e.to_string()),
        )
    } else if cli.list_failed {
        Some(print_failed_events(&state, cli.limit))
    } else if let Some(user_id) = &cli.portal_url {
        Some(
            portal::customer_portal_url(&state, user_id)
                .await
                .map(|url| println!("{}", url))
                .map_err(|e| e.to_string()),
        )
    } else {
        None
    };

    if let Some(result) = command_result {
        if let Some(sink) = &sink {
            sink.stop().await;
        }
        if let Err(e) = result {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let app = handlers::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("skillpay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if let Some(sink) = &sink {
        sink.stop().await;
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
