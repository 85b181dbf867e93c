//! HTTP and websocket surface.
//!
//! ```text
//!   GET  /health            liveness probe
//!   GET  /ws                observer channel (see `ws`)
//!   /api/chats | /api/selected | /api/select | /api/deselect
//!   /api/config | /api/health | /api/stats
//!   *                       dashboard assets when a static dir exists, else 404 JSON
//! ```
//!
//! Routes are assembled by [`router`]; [`HttpServer`] only owns the listener
//! and its shutdown signal.

mod error;
mod routes;
mod ws;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::handler::HandlerWithoutStateExt;
use axum::http::Method;
use axum::routing::{get, post};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::delivery::DeliveryMetrics;
use crate::error::ServerError;
use crate::fanout::EventHub;
use crate::selection::SelectionStore;
use crate::session::{ReconnectionController, SessionHandle};

pub use error::ApiError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ReconnectionController>,
    pub session: SessionHandle,
    pub selection: Arc<SelectionStore>,
    pub hub: Arc<EventHub>,
    pub metrics: Arc<DeliveryMetrics>,
}

/// Build the full application router.
///
/// When `static_dir` exists, unmatched paths are served from it (the
/// dashboard); anything it cannot serve still gets the JSON 404.
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/chats", get(routes::list_chats))
        .route("/selected", get(routes::selected_chats))
        .route("/select", post(routes::select_chat))
        .route("/deselect", post(routes::deselect_chat))
        .route("/config", get(routes::config_summary))
        .route("/health", get(routes::api_health))
        .route("/stats", get(routes::delivery_stats));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(routes::liveness))
        .route("/ws", get(ws::ws_handler))
        .nest("/api", api)
        .with_state(state);

    match static_dir {
        Some(dir) if dir.is_dir() => {
            tracing::info!(dir = %dir.display(), "Serving dashboard assets");
            let assets = ServeDir::new(dir).not_found_service(routes::not_found.into_service());
            app = app.fallback_service(assets);
        }
        _ => app = app.fallback(routes::not_found),
    }

    app.layer(TraceLayer::new_for_http()).layer(cors)
}

/// Owns the bound listener and the spawned serve task.
pub struct HttpServer {
    addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HttpServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the server. Returns the bound address.
    pub async fn start(&mut self, app: Router) -> Result<SocketAddr, ServerError> {
        let bind_error = |reason: String| ServerError::Bind {
            addr: self.addr.to_string(),
            reason,
        };

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| bind_error(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| bind_error(e.to_string()))?;

        tracing::info!(addr = %local_addr, "HTTP server listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("HTTP server shutting down");
                })
                .await
            {
                tracing::error!(error = %e, "HTTP server error");
            }
        });

        self.local_addr = Some(local_addr);
        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
