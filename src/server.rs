use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    config::SshConfig,
    orchestrator::ScanOrchestrator,
    ssh::SshAuthenticator,
    trial,
    types::ScanId,
};

#[derive(Clone)]
pub struct AppState {
    orchestrator: ScanOrchestrator,
    authenticator: Arc<dyn SshAuthenticator>,
    ssh: SshConfig,
}

impl AppState {
    pub fn new(
        orchestrator: ScanOrchestrator,
        authenticator: Arc<dyn SshAuthenticator>,
        ssh: SshConfig,
    ) -> Self {
        Self {
            orchestrator,
            authenticator,
            ssh,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub report_id: i64,
    #[serde(alias = "option")]
    pub host: String,
    #[serde(default)]
    pub wordlist: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanAccepted {
    pub scan_id: ScanId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    pub ip: String,
    pub file_path: PathBuf,
    #[serde(default)]
    pub port: Option<u16>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/scans", post(post_scan))
        .route("/status/{scan_id}", get(get_status))
        .route("/check-ssh", get(get_check_ssh))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on `bind` until `shutdown` is cancelled.
pub async fn spawn_server(bind: &str, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> impl IntoResponse {
    if req.report_id <= 0 {
        return (StatusCode::BAD_REQUEST, "reportId must be a positive integer").into_response();
    }
    if let Err(msg) = validate_host(&req.host) {
        return (StatusCode::BAD_REQUEST, msg).into_response();
    }
    let wordlist = match req
        .wordlist
        .or_else(|| app.orchestrator.default_wordlist().map(PathBuf::from))
    {
        Some(w) => w,
        None => {
            return (StatusCode::BAD_REQUEST, "no wordlist given and no default configured")
                .into_response()
        }
    };

    let scan_id = app
        .orchestrator
        .start_scan(req.report_id, req.host.trim(), wordlist);
    (StatusCode::ACCEPTED, Json(ScanAccepted { scan_id })).into_response()
}

async fn get_status(State(app): State<AppState>, Path(scan_id): Path<String>) -> impl IntoResponse {
    (StatusCode::OK, app.orchestrator.scan_status_text(&scan_id))
}

async fn get_check_ssh(State(app): State<AppState>, Query(q): Query<CheckQuery>) -> impl IntoResponse {
    if let Err(msg) = validate_host(&q.ip) {
        return (StatusCode::BAD_REQUEST, msg.to_string());
    }
    let port = q.port.unwrap_or(app.ssh.port);
    match trial::check_ssh(app.authenticator.as_ref(), q.ip.trim(), port, &q.file_path).await {
        Ok(outcome) => (StatusCode::OK, outcome.to_string()),
        Err(e) => {
            error!(error = %e, "ssh check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error reading credentials file: {e:#}"),
            )
        }
    }
}

/// Hosts end up as positional arguments of the probe, so option-like values are refused.
fn validate_host(host: &str) -> Result<(), &'static str> {
    let host = host.trim();
    if host.is_empty() {
        return Err("host must not be empty");
    }
    if host.starts_with('-') {
        return Err("host must not start with '-'");
    }
    if host.chars().any(char::is_whitespace) {
        return Err("host must not contain whitespace");
    }
    Ok(())
}
