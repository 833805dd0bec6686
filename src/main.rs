use marketplace_checkout::{
    api_v1_routes, config::AppConfig, db, events,
    gateways::{HttpPaymentGateway, InMemoryWalletLedger, LogNotifier},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(AppConfig::load()?);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let db = Arc::new(db::establish_connection_from_app_config(&config).await?);
    if config.auto_migrate {
        db::ensure_schema(&db).await?;
    }

    let wallet = Arc::new(InMemoryWalletLedger::new());
    let gateway = Arc::new(HttpPaymentGateway::new(config.gateway.clone())?);

    let (state, event_rx) = AppState::build(db.clone(), config.clone(), wallet, gateway);

    tokio::spawn(events::process_events(event_rx));
    events::outbox::start_worker(
        db.clone(),
        state.event_sender.clone(),
        Arc::new(LogNotifier),
    );

    let app = axum::Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!(%addr, "starting marketplace-checkout");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
