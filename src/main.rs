use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use quota_pay as api;
use quota_pay::services::{
    GatewayClient, HttpGatewayClient, InMemoryOrderStore, InMemoryQuotaLedger, OrderStore,
    PaymentService, QuotaLedger, RedisOrderStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);
    api::handlers::health::init_start_time();

    let orders: Arc<dyn OrderStore> = if cfg.uses_redis_store() {
        info!(namespace = %cfg.redis_namespace, "using Redis order store");
        Arc::new(
            RedisOrderStore::new(&cfg.redis_url, cfg.redis_namespace.clone())
                .context("invalid redis_url")?,
        )
    } else {
        if !cfg.is_development() {
            warn!("in-memory order store selected outside development; orders are lost on restart");
        }
        Arc::new(InMemoryOrderStore::new())
    };

    let ledger: Arc<dyn QuotaLedger> = Arc::new(InMemoryQuotaLedger::new());
    let gateway: Arc<dyn GatewayClient> = Arc::new(
        HttpGatewayClient::new(Duration::from_secs(cfg.gateway_timeout_secs))
            .context("failed to build gateway client")?,
    );

    let payments = Arc::new(PaymentService::new(
        Arc::new(cfg.payment.clone()),
        orders,
        ledger,
        gateway,
    ));
    let identity = Arc::new(api::auth::JwtIdentityResolver::new(&cfg.jwt_secret));
    let state = api::AppState::new(payments, identity);

    if cfg.cors_allowed_origins.is_none() {
        info!("no CORS origins configured; using permissive CORS");
    }
    let app = api::app_router(
        state,
        api::cors_layer(cfg.cors_allowed_origins.as_deref()),
        Duration::from_secs(cfg.request_timeout_secs),
    );

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!("quota-pay listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
