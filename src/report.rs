use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use thiserror::Error;

use crate::types::{ForwardFailure, ScanResult};

/// Path appended to the report service base URL.
pub const REPORT_PATH: &str = "/report/bfssh";

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("report service unreachable: {0}")]
    ResourceAccess(String),

    #[error("report endpoint not found")]
    NotFound,

    #[error("report service error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("report rejected: HTTP {status}")]
    Rejected { status: u16 },
}

impl ForwardError {
    pub fn failure(&self) -> ForwardFailure {
        match self {
            ForwardError::ResourceAccess(_) => ForwardFailure::ResourceError,
            ForwardError::NotFound => ForwardFailure::NotFound,
            ForwardError::ServerError { .. } => ForwardFailure::ServerError,
            ForwardError::Rejected { status } => ForwardFailure::Rejected(*status),
        }
    }

    fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::NOT_FOUND {
            ForwardError::NotFound
        } else if status.is_server_error() {
            ForwardError::ServerError {
                status: status.as_u16(),
            }
        } else {
            ForwardError::Rejected {
                status: status.as_u16(),
            }
        }
    }
}

/// Destination for finished scan results.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn forward(&self, result: &ScanResult) -> Result<(), ForwardError>;
}

/// Posts results as JSON to `{base_url}/report/bfssh`.
#[derive(Debug, Clone)]
pub struct HttpReporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReporter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bfssh-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), REPORT_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ReportSink for HttpReporter {
    async fn forward(&self, result: &ScanResult) -> Result<(), ForwardError> {
        // `.json()` sets the content type.
        let resp = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .json(result)
            .send()
            .await
            .map_err(|e| ForwardError::ResourceAccess(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ForwardError::from_status(status))
        }
    }
}
