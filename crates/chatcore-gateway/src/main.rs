//! chatcore gateway process entry point.
//!
//! Startup order mirrors spec §9's "global state" note: one Store, one Hub,
//! one Retry Worker, wired here and shut down in reverse order on drain.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use chatcore_gateway::{app_state::AppState, config::GatewayConfig, retry_worker, router, store::Store};

#[tokio::main]
async fn main() {
    let cfg = GatewayConfig::from_env();

    fmt().with_env_filter(EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info"))).init();

    if let Err(e) = cfg.validate() {
        tracing::error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }

    let listen: SocketAddr = match cfg.listen_addr.parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "LISTEN_ADDR did not parse after validation");
            std::process::exit(1);
        }
    };

    let store = match Store::open(&cfg.database_dsn) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!(error = %e, "failed to open store");
            std::process::exit(1);
        }
    };

    let state = AppState::new(cfg.clone(), store.clone());

    let retry_handle = retry_worker::spawn(
        store.clone(),
        state.hub(),
        retry_worker::RetryWorkerConfig {
            interval: cfg.worker_interval,
            base_backoff: cfg.retry_interval,
            max_attempts: cfg.retry_max_attempts,
        },
    );

    let checkpoint_store = store.clone();
    let checkpoint_handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            checkpoint_store.checkpoint();
        }
    });

    let app = router::build_router(state.clone());

    let listener = match tokio::net::TcpListener::bind(listen).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, %listen, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(%listen, "chatcore-gateway starting");

    let shutdown_state = state.clone();
    let drain_timeout = cfg.shutdown_drain_timeout;
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received, draining");
        shutdown_state.set_draining();
    });

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    state.hub().shutdown(drain_timeout).await;
    retry_handle.abort();
    checkpoint_handle.abort();
    store.checkpoint();

    tracing::info!("chatcore-gateway stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
