mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use hush_api::push::{FcmClient, PushProvider};
use hush_api::router::build_router;
use hush_api::state::{AppState, AppStateInner};
use hush_api::telemetry::LoopMonitor;
use hush_api::tokens::TokenService;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hush_server=debug,hush_api=debug,hush_db=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env().inspect_err(|e| error!("FATAL: {:#}", e))?;
    let tokens = TokenService::new(config.tokens.clone())
        .inspect_err(|e| error!("FATAL: token configuration rejected: {}", e))?;
    info!("Token keys loaded ({:?})", config.tokens.algorithm);

    let db = hush_db::Database::open_with_readers(&config.db_path, config.db_readers)?;

    let push: Option<Arc<dyn PushProvider>> = match &config.fcm {
        Some(fcm) => {
            let client = FcmClient::new(&fcm.project_id, fcm.access_token.clone())?;
            info!("Push notifications enabled (FCM project {})", fcm.project_id);
            Some(Arc::new(client) as Arc<dyn PushProvider>)
        }
        None => {
            warn!("FCM_PROJECT_ID/FCM_ACCESS_TOKEN not set, push notifications disabled");
            None
        }
    };

    let monitor = LoopMonitor::new();
    let watchdog = monitor.spawn(config.watchdog_period, config.watchdog_warn);

    let state: AppState = Arc::new(AppStateInner {
        db,
        tokens,
        push,
        monitor,
        cookie_secure: config.cookie_secure,
    });

    let app = build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Hush server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    watchdog.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
