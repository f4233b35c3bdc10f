//! OIDC Login Gateway
//!
//! Single-binary Rust service that mounts both legs of the authorization
//! code flow for one issuer domain:
//! 1. `/who` and `/get` discover the issuer and redirect the browser to it
//! 2. `/redirect` redeems the state token, exchanges the code, verifies
//!    the ID token, and returns the result as JSON

mod config;
mod error;
mod metrics;
mod redirect;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use oidc_client::{ClientOptions, MemoryStateStore, Url, spawn_sweep_task};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Maximum time to wait for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How often expired state tokens are purged.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const FLOW_ID_TOKEN: &str = "id_token";
const FLOW_ACCESS_TOKEN: &str = "access_token";

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    client: oidc_client::Client,
    /// Same store the client issues into; read for health reporting
    store: Arc<MemoryStateStore>,
    domain: Arc<str>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/who", get(who_handler))
        .route("/get", get(get_handler))
        .route(
            "/redirect",
            get(redirect::render_outcome).route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                redirect::complete_redirect,
            )),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting oidc-login-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        domain = %config.oidc.domain,
        client_id = %config.oidc.client_id,
        scope_policy = ?config.oidc.scope_policy,
        private_key = config.oidc.private_key.is_some(),
        "configuration loaded"
    );

    let defaults = config
        .oidc
        .client_options()
        .context("failed to load client credentials")?;

    let http = reqwest::Client::builder()
        .timeout(config.oidc.http_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let store = Arc::new(MemoryStateStore::new(config.oidc.state_ttl()));

    let client = oidc_client::Client::builder()
        .http_client(http)
        .defaults(defaults)
        .state_store(store.clone())
        .discovery_scheme(config.oidc.discovery_scheme())
        .scope_policy(config.oidc.scope_policy)
        .access_document(config.oidc.access_document.clone())
        .build()
        .context("invalid OIDC client configuration")?;

    let sweeper = spawn_sweep_task(store.clone(), SWEEP_INTERVAL);

    let app_state = AppState {
        client,
        store,
        domain: Arc::from(config.oidc.domain.as_str()),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    sweeper.abort();

    info!("shutdown complete");
    Ok(())
}

/// Begin the identity-token flow.
async fn who_handler(State(state): State<AppState>) -> Result<Redirect, error::Error> {
    let result = state
        .client
        .get_id_token(&state.domain, &ClientOptions::new(), None)
        .await;
    login_redirect(FLOW_ID_TOKEN, result)
}

/// Begin the access-token flow.
async fn get_handler(State(state): State<AppState>) -> Result<Redirect, error::Error> {
    let result = state
        .client
        .get_access_token(&state.domain, &ClientOptions::new(), None)
        .await;
    login_redirect(FLOW_ACCESS_TOKEN, result)
}

fn login_redirect(
    flow: &'static str,
    result: oidc_client::Result<Url>,
) -> Result<Redirect, error::Error> {
    match result {
        Ok(url) => {
            metrics::record_login_started(flow);
            Ok(Redirect::to(url.as_str()))
        }
        Err(e) => {
            metrics::record_begin_error(flow, &e);
            Err(e.into())
        }
    }
}

/// Health endpoint: status, issuer domain, pending logins, uptime.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pending = state.store.len().await;
    let uptime = state.started_at.elapsed().as_secs();

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "status": "healthy",
            "domain": &*state.domain,
            "pending_authorizations": pending,
            "uptime_seconds": uptime,
        })),
    )
}

/// Prometheus metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
