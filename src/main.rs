use anyhow::{Context, Result};
use futures::future::join_all;
use stable_gate::{
    chains::{ChainAdapter, EvmAdapter, Scanner, SolanaAdapter, TronAdapter},
    config::Config,
    handlers::{router, AppState},
    services::*,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting stable-gate v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        order_expiry_secs = config.order_expiry().num_seconds(),
        wallets = config.wallet_addresses.len(),
        "Gateway settings"
    );

    let cancel = CancellationToken::new();

    // Storage and shared services
    let store = Arc::new(MemoryStore::new());
    for wallet in &config.wallet_addresses {
        store.upsert_wallet(wallet.clone());
    }
    let store: Arc<dyn OrderStore> = store;
    let cache = Arc::new(
        CacheService::new(config.redis_url.as_deref(), config.notify.dedup_window).await?,
    );
    let analytics = Arc::new(Analytics::new());
    let announcer: Arc<dyn Announcer> = Arc::new(LogAnnouncer);

    let notify_client = reqwest::Client::builder()
        .timeout(config.notify.timeout)
        .build()
        .context("Failed to build webhook client")?;
    let rpc_client = reqwest::Client::builder()
        .timeout(config.scan.rpc_timeout)
        .build()
        .context("Failed to build RPC client")?;

    let notifier = Arc::new(Notifier::new(
        notify_client,
        store.clone(),
        cache.clone(),
        announcer.clone(),
        analytics.clone(),
        config.notify.auth_token.clone(),
    ));
    let matcher = Arc::new(OrderMatcher::new(
        store.clone(),
        notifier,
        announcer,
        analytics.clone(),
        config.trade_is_confirmed,
    ));
    let rates = Arc::new(RateOracle::new(rpc_client.clone(), &config.rates));

    // Chain adapters
    let mut adapters: Vec<Arc<dyn ChainAdapter>> = Vec::new();
    if let Some(tron) = &config.tron {
        adapters.push(Arc::new(TronAdapter::new(rpc_client.clone(), tron)));
    }
    for chain in &config.evm {
        let adapter = EvmAdapter::new(chain.network, &chain.rpc_url)
            .with_context(|| format!("Failed to create {} adapter", chain.network))?;
        adapters.push(Arc::new(adapter));
    }
    if let Some(url) = &config.solana_rpc_url {
        adapters.push(Arc::new(SolanaAdapter::new(rpc_client.clone(), url)));
    }
    if adapters.is_empty() {
        tracing::warn!("No chains configured, nothing will be scanned");
    }

    // Background tasks
    let (sink, transfers) = mpsc::unbounded_channel();
    let mut tasks = Vec::new();
    for adapter in adapters {
        let scanner = Scanner::new(
            adapter,
            store.clone(),
            &analytics,
            config.scan.clone(),
            config.trade_is_confirmed,
            sink.clone(),
        );
        tasks.push(scanner.spawn(cancel.clone()));
    }
    drop(sink);
    tasks.push(tokio::spawn(matcher.run(
        transfers,
        config.scan.interval,
        cancel.clone(),
    )));
    tasks.extend(rates.clone().spawn(config.rates.interval, cancel.clone()));

    let app = router(AppState {
        cache,
        analytics,
        rates,
    });

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    for result in join_all(tasks).await {
        if let Err(e) = result {
            tracing::error!("Background task panicked: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for ctrl+c: {}", e);
                cancel.cancelled().await;
            }
        }
        _ = cancel.cancelled() => {}
    }
    tracing::info!("Shutting down gracefully...");
    cancel.cancel();
}
