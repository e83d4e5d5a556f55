//!
//! keyward HTTP server
//! -------------------
//! Axum routes for the key distribution API.
//!
//! Responsibilities:
//! - `/api/v1/keys/{host}/{user}`: the lookup endpoint sshd polls through
//!   auth.sh. Renders the resolved listing as comment headers and key lines.
//! - `/api/v1/hello`: connectivity probe used by setup.sh.
//! - `/auth.sh`: the client script, rendered with the configured base URL.
//! - `/metrics`: OpenMetrics exposition of the request and fetch counters.
//! - Graceful shutdown on SIGINT/SIGTERM.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::signal;
use tracing::{error, info, warn};

use crate::directory::{Directory, UserKeys};
use crate::metrics::Metrics;
use crate::scripts;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<Directory>,
    pub metrics: Arc<Metrics>,
    /// External base URL baked into generated client scripts.
    pub base_url: String,
}

/// Mount all routes onto a router with the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/keys/{host}/{user}", get(get_keys))
        .route("/api/v1/hello", get(hello))
        .route("/auth.sh", get(auth_sh))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

/// Serve until SIGINT or SIGTERM.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn get_keys(
    State(state): State<AppState>,
    Path((host, user)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.directory.resolve(&host, &user) {
        Ok(listing) => {
            state.metrics.record_keys_request(200, &host, &user);
            (StatusCode::OK, render_listing(&listing))
        }
        Err(err) => {
            let code = err.http_status();
            state.metrics.record_keys_request(code, &host, &user);
            warn!(host = %host, user = %user, code, "{err}");
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, format!("# {err}"))
        }
    }
}

/// Render a resolved listing: one `# user:` header per username, then that
/// user's non-empty keys, one per line.
fn render_listing(listing: &[UserKeys]) -> String {
    let mut out = String::new();
    for entry in listing {
        let _ = writeln!(out, "# user: {}", entry.username);
        for key in &entry.keys {
            let _ = writeln!(out, "{key}");
        }
    }
    out
}

async fn hello() -> String {
    format!(
        "Successfully connected to keyward ('{}')\n",
        env!("CARGO_PKG_VERSION")
    )
}

async fn auth_sh(State(state): State<AppState>) -> String {
    scripts::auth_script(&state.base_url)
}

async fn metrics_text(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!("metrics encoding failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_renders_headers_then_keys() {
        let listing = vec![
            UserKeys { username: "alice".into(), keys: vec!["k1".into(), "k2".into()] },
            UserKeys { username: "bob".into(), keys: vec![] },
        ];
        assert_eq!(render_listing(&listing), "# user: alice\nk1\nk2\n# user: bob\n");
    }

    #[test]
    fn empty_listing_renders_empty_body() {
        assert_eq!(render_listing(&[]), "");
    }
}
