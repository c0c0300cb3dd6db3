//! Proxy edge for the gatelist admin screens.
//!
//! The browser never talks to the backend service directly: every
//! `/api/*` call lands here first. Keeping this hop lets us
//!
//! - terminate CORS in one place instead of on the backend,
//! - forward the HTTP-only refresh cookie to `/api/auth/refresh` and
//!   pass the rotated cookie back, so the browser's access token can be
//!   re-minted without the frontend ever seeing the refresh credential,
//! - validate batch entities before they cost a backend round trip.
//!
//! No business logic lives here. Queries, pagination math, and the
//! batch response cache are all the backend's; this crate only mirrors
//! statuses, JSON bodies, and cookies.
//!
//!
//!
//! # Environment
//!
//! - `GATELIST_PORT`: listen port (default 3000)
//! - `GATELIST_BACKEND_URL`: upstream base URL (default `http://backend:5008`)
//! - `RUST_LOG`: tracing filter, e.g. `info,server=debug`

use std::time::Duration;

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{delete, get, post, put},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod utils;

use routes::{batch_handler, proxy_handler};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new();

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/api/batch/{entity}", post(batch_handler))
        .route("/api/batch/stats", post(proxy_handler))
        .route("/api/batch/cache/clear", post(proxy_handler))
        .route("/api/batch/cache/stats", get(proxy_handler))
        .route("/api/auth/refresh", post(proxy_handler))
        .route("/api/auth/login", post(proxy_handler))
        .route("/api/auth/logout", post(proxy_handler))
        .route("/api/guests", get(proxy_handler).post(proxy_handler))
        .route(
            "/api/guests/{id}",
            get(proxy_handler).put(proxy_handler).delete(proxy_handler),
        )
        .route("/api/guests/bulk-delete", delete(proxy_handler))
        .route("/api/guests/bulk-rsvp", put(proxy_handler))
        .route("/api/guests/bulk-checkin", post(proxy_handler))
        .route("/api/guests/bulk-checkout", post(proxy_handler))
        .route("/api/guests/checked-in", get(proxy_handler))
        .route("/api/events", get(proxy_handler).post(proxy_handler))
        .route(
            "/api/events/{id}",
            get(proxy_handler).put(proxy_handler).delete(proxy_handler),
        )
        .route("/api/checkin", get(proxy_handler))
        .route("/api/checkin/{id}", post(proxy_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
