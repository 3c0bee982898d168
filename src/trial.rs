use std::fmt;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::credentials;
use crate::ssh::{LoginAttempt, SshAuthenticator};
use crate::types::Credential;

/// Try each credential in order and return the first one the target accepts.
///
/// Stops at the first success. Rejections and connection failures just move
/// on to the next entry; nothing is retried.
pub async fn try_all<A>(
    auth: &A,
    host: &str,
    port: u16,
    credentials: &[Credential],
) -> Option<Credential>
where
    A: SshAuthenticator + ?Sized,
{
    for (idx, cred) in credentials.iter().enumerate() {
        match auth.try_login(host, port, cred).await {
            LoginAttempt::Accepted => {
                info!(host, port, user = %cred.username, attempt = idx + 1, "login accepted");
                return Some(cred.clone());
            }
            LoginAttempt::Rejected => {
                debug!(host, port, user = %cred.username, "login rejected");
            }
            LoginAttempt::Unreachable(reason) => {
                debug!(host, port, user = %cred.username, %reason, "login attempt failed");
            }
        }
    }
    None
}

/// Result of the probe-then-trial check.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CheckOutcome {
    PortClosed { host: String },
    Found { host: String, credential: Credential },
    Exhausted { host: String, attempted: usize },
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::PortClosed { host } => write!(f, "SSH port is not open on {host}"),
            CheckOutcome::Found { host, credential } => write!(
                f,
                "Successful login on {host} with username: {} and password: {}",
                credential.username, credential.password
            ),
            CheckOutcome::Exhausted { host, .. } => {
                write!(f, "Failed to login on {host} with provided credentials")
            }
        }
    }
}

/// Probe `host:port`, then run the credential list from `path` against it.
///
/// Only an unreadable credential file is an error.
pub async fn check_ssh<A>(
    auth: &A,
    host: &str,
    port: u16,
    path: impl AsRef<Path>,
) -> Result<CheckOutcome>
where
    A: SshAuthenticator + ?Sized,
{
    if !auth.probe(host, port).await {
        info!(host, port, "ssh port not open");
        return Ok(CheckOutcome::PortClosed { host: host.to_string() });
    }

    let creds = credentials::load_credentials_from_path(path)?;
    info!(host, port, count = creds.len(), "trying credentials");
    Ok(match try_all(auth, host, port, &creds).await {
        Some(credential) => CheckOutcome::Found {
            host: host.to_string(),
            credential,
        },
        None => CheckOutcome::Exhausted {
            host: host.to_string(),
            attempted: creds.len(),
        },
    })
}
