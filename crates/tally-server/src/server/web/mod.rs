//! Web role: an HTTP front end over the counter service.
//!
//! ## Structure
//!
//! - [`handler`] - request handlers (`/`, `/enqueue`, `/healthz`).
//! - [`cookie`] - `sid` cookie parsing and issuing.
//! - [`error`] - mapping of failures to HTTP responses.

pub mod cookie;
pub mod error;
pub mod handler;

use crate::server::config::ServerConfig;
use axum::{Router, routing::get};
use std::sync::Arc;
use tally_core::{CounterService, IdentityResolver, OsRandom, RandSource, Store};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Store handle shared by every request task.
pub type SharedStore = Arc<dyn Store>;

/// Random source used to mint visitor identities.
pub type SharedRand = Arc<dyn RandSource>;

/// State shared by all handlers. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    counters: CounterService<SharedStore>,
    resolver: IdentityResolver<SharedRand>,
    hostname: Arc<str>,
    queue: Arc<str>,
}

impl AppState {
    pub fn new(store: SharedStore, hostname: &str, queue: &str) -> Self {
        Self {
            counters: CounterService::new(store),
            resolver: IdentityResolver::with_rand(Arc::new(OsRandom)),
            hostname: Arc::from(hostname),
            queue: Arc::from(queue),
        }
    }

    /// Replaces the random source identities are minted from.
    #[must_use]
    pub fn with_rand(mut self, rand: SharedRand) -> Self {
        self.resolver = IdentityResolver::with_rand(rand);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handler::visit))
        .route("/enqueue", get(handler::enqueue))
        .route("/healthz", get(handler::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves HTTP on `config.port` until `shutdown` resolves, then drains
/// in-flight requests.
pub async fn run_web<F>(
    config: &ServerConfig,
    store: SharedStore,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = AppState::new(store, &config.hostname, &config.queue);
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;

    tracing::info!(
        addr = %listener.local_addr()?,
        served_by = %config.hostname,
        "Web role listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Web role shut down");
    Ok(())
}
