use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use hush_db::Database;

use crate::error::ApiError;
use crate::push::PushProvider;
use crate::telemetry::LoopMonitor;
use crate::tokens::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
    /// `None` when no provider is configured; delivery then skips fan-out.
    pub push: Option<Arc<dyn PushProvider>>,
    pub monitor: Arc<LoopMonitor>,
    pub cookie_secure: bool,
}

/// Runs a blocking store call off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            anyhow!("store task failed: {}", e)
        })?;
    Ok(result?)
}
