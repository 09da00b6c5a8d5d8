use std::{sync::Arc, time::Duration};

use anyhow::Context;
use storefront_api::{
    config::{init_tracing, load_config},
    db,
    events::{process_events, EventSender},
    gateway::HttpPaymentGateway,
    AppState,
};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_json);

    let config = Arc::new(config);
    let db = Arc::new(db::connect(&config).await.context("database connection")?);

    if config.auto_migrate {
        db::create_schema(&db).await.context("schema creation")?;
    }

    let (tx, rx) = mpsc::channel(config.event_channel_capacity);
    tokio::spawn(process_events(rx));
    let event_sender = Arc::new(EventSender::new(tx));

    let gateway = Arc::new(
        HttpPaymentGateway::new(
            config.gateway_base_url.clone(),
            config.gateway_key_id.clone(),
            config.gateway_key_secret.clone(),
            Duration::from_secs(config.gateway_timeout_secs),
        )
        .context("payment gateway client")?,
    );

    let state = AppState::new(db, config.clone(), event_sender, gateway);
    let app = storefront_api::app(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
