use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel returned by the status surface for identifiers that were never issued.
pub const UNKNOWN_SCAN_ID: &str = "UNKNOWN_SCAN_ID";

/// One `username:password` candidate. Order in the source list is the trial order.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Opaque identifier handed out for every scan request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ScanId(Uuid);

impl ScanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ScanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Structured payload printed by the probe executable and forwarded to the report service.
///
/// Absent optional fields are omitted from the serialized form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<i64>,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// How the probe process itself ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed { output: String },
    ProcessError { exit_code: i32, output: String },
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::Completed { output } => write!(f, "COMPLETED: {output}"),
            ScanOutcome::ProcessError { exit_code, output } => {
                write!(f, "ERROR: Exit code {exit_code} : {output}")
            }
        }
    }
}

/// Why a finished scan could not be delivered to the report service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardFailure {
    ResourceError,
    ServerError,
    NotFound,
    Rejected(u16),
}

impl fmt::Display for ForwardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardFailure::ResourceError => f.write_str("Resource access error"),
            ForwardFailure::ServerError => f.write_str("Server error"),
            ForwardFailure::NotFound => f.write_str("Not Found error"),
            ForwardFailure::Rejected(status) => write!(f, "Client error {status}"),
        }
    }
}

/// Lifecycle state of a scan.
///
/// Transitions only move forward: `InProgress` is followed by exactly one of
/// `Finished`/`Exception`, and a `Finished` scan may later be annotated with
/// `ForwardFailed` (which keeps the outcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    Unknown,
    InProgress,
    Finished {
        outcome: ScanOutcome,
    },
    Exception {
        message: String,
    },
    ForwardFailed {
        failure: ForwardFailure,
        outcome: ScanOutcome,
    },
}

impl ScanStatus {
    pub fn completed(output: impl Into<String>) -> Self {
        ScanStatus::Finished {
            outcome: ScanOutcome::Completed {
                output: output.into(),
            },
        }
    }

    pub fn process_error(exit_code: i32, output: impl Into<String>) -> Self {
        ScanStatus::Finished {
            outcome: ScanOutcome::ProcessError {
                exit_code,
                output: output.into(),
            },
        }
    }

    pub fn exception(message: impl Into<String>) -> Self {
        ScanStatus::Exception {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanStatus::Unknown | ScanStatus::InProgress)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Unknown => f.write_str(UNKNOWN_SCAN_ID),
            ScanStatus::InProgress => f.write_str("IN_PROGRESS"),
            ScanStatus::Finished { outcome } => fmt::Display::fmt(outcome, f),
            ScanStatus::Exception { message } => write!(f, "EXCEPTION: {message}"),
            ScanStatus::ForwardFailed { failure, outcome } => {
                write!(f, "ERROR: {failure} while posting scan result | {outcome}")
            }
        }
    }
}
