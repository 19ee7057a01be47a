use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solwatch::adapters::social::SocialAdapter;
use solwatch::adapters::ObservationSource;
use solwatch::browser::cdp::CdpRenderer;
use solwatch::browser::session::SessionProvider;
use solwatch::config::Config;
use solwatch::dedup::DedupEngine;
use solwatch::delivery::{OutputChannel, WebhookSink};
use solwatch::market::{MarketData, MarketDataClient};
use solwatch::scheduler::{Orchestrator, PollLoop};
use solwatch::store::Store;
use solwatch::transfers::{TransferClient, TransferFeed};
use solwatch::workers::price::PriceWorker;
use solwatch::workers::social::SocialWorker;
use solwatch::workers::whale::WhaleWorker;

fn init_tracing() {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(console_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("👁️  Solwatch - Source Monitoring Service");
    info!("========================================");

    let config = Config::from_env()?;
    let store = match Store::connect(&config.database_url).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to open database");
            return Err(e.into());
        }
    };
    info!(database = %config.database_url, "Store ready");

    // Shared collaborators.
    let sink: Arc<dyn OutputChannel> = Arc::new(WebhookSink::new());
    let market: Arc<dyn MarketData> = Arc::new(MarketDataClient::new());
    let transfers: Arc<dyn TransferFeed> =
        Arc::new(TransferClient::new(&config.helius_api_key));
    let renderer = Arc::new(CdpRenderer::new(&config.devtools_url));
    let sessions = SessionProvider::new(config.session.clone());
    let adapter: Arc<dyn ObservationSource> =
        Arc::new(SocialAdapter::new(renderer, sessions));

    let social_worker = SocialWorker::new(
        store.clone(),
        DedupEngine::new(store.clone(), config.max_events_per_tick),
        adapter,
        Arc::clone(&sink),
        config.channels.tracked_posts.clone(),
    );
    let price_worker = PriceWorker::new(
        store.clone(),
        Arc::clone(&market),
        Arc::clone(&sink),
        config.channels.price_alerts.clone(),
    );
    let whale_worker = WhaleWorker::new(
        store.clone(),
        transfers,
        market,
        sink,
        config.channels.whale_moves.clone(),
        config.whale_threshold_usd,
    );

    let mut orchestrator = Orchestrator::new();
    orchestrator.spawn(PollLoop::new(
        Arc::new(social_worker),
        config.social_interval,
        Duration::from_secs(10),
    ));
    orchestrator.spawn(PollLoop::new(
        Arc::new(price_worker),
        config.price_interval,
        Duration::from_secs(15),
    ));
    orchestrator.spawn(PollLoop::new(
        Arc::new(whale_worker),
        config.whale_interval,
        Duration::from_secs(20),
    ));

    info!("🎯 All poll loops started, press Ctrl+C to shut down");

    match signal::ctrl_c().await {
        Ok(()) => info!("🛑 Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    orchestrator.shutdown().await;
    info!("👋 Solwatch shutdown complete");
    Ok(())
}
