//! SSH reachability probing and single login attempts.
//!
//! Host keys are accepted without verification: this is an audit probe, not
//! a client that trusts the remote end with anything.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;
use russh_keys::key::PublicKey;
use tokio::time;
use tracing::debug;

use crate::types::Credential;

/// User name sent when probing; the server only has to answer the auth request.
pub const PROBE_USER: &str = "test";

/// Result of one login attempt. Never an error: the trial loop just moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAttempt {
    Accepted,
    Rejected,
    /// Connection, handshake or timeout failure.
    Unreachable(String),
}

impl LoginAttempt {
    pub fn is_accepted(&self) -> bool {
        matches!(self, LoginAttempt::Accepted)
    }
}

#[async_trait]
pub trait SshAuthenticator: Send + Sync {
    /// Is an SSH endpoint answering on `host:port`? All failures collapse to `false`.
    async fn probe(&self, host: &str, port: u16) -> bool;

    /// Attempt password authentication with one credential.
    async fn try_login(&self, host: &str, port: u16, credential: &Credential) -> LoginAttempt;
}

/// `russh`-backed authenticator with a bounded connect+auth timeout.
#[derive(Clone)]
pub struct RusshAuthenticator {
    timeout: Duration,
    config: Arc<client::Config>,
}

impl RusshAuthenticator {
    pub fn new(timeout: Duration) -> Self {
        let config = client::Config {
            inactivity_timeout: Some(timeout),
            ..Default::default()
        };
        Self {
            timeout,
            config: Arc::new(config),
        }
    }
}

impl Default for RusshAuthenticator {
    fn default() -> Self {
        Self::new(Duration::from_millis(3000))
    }
}

#[async_trait]
impl SshAuthenticator for RusshAuthenticator {
    async fn probe(&self, host: &str, port: u16) -> bool {
        // Any answer to an auth request means key exchange finished.
        let attempt = async {
            let mut session =
                client::connect(self.config.clone(), (host, port), AcceptAnyHostKey).await?;
            let answered = session.authenticate_none(PROBE_USER).await;
            hang_up(&session).await;
            answered
        };
        match time::timeout(self.timeout, attempt).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host, port, error = %e, "ssh probe failed");
                false
            }
            Err(_) => {
                debug!(host, port, timeout = ?self.timeout, "ssh probe timed out");
                false
            }
        }
    }

    async fn try_login(&self, host: &str, port: u16, credential: &Credential) -> LoginAttempt {
        let attempt = async {
            let mut session =
                client::connect(self.config.clone(), (host, port), AcceptAnyHostKey).await?;
            let accepted = session
                .authenticate_password(credential.username.as_str(), credential.password.as_str())
                .await;
            hang_up(&session).await;
            accepted
        };
        match time::timeout(self.timeout, attempt).await {
            Ok(Ok(true)) => LoginAttempt::Accepted,
            Ok(Ok(false)) => LoginAttempt::Rejected,
            Ok(Err(e)) => LoginAttempt::Unreachable(e.to_string()),
            Err(_) => LoginAttempt::Unreachable(format!(
                "login attempt timed out after {:?}",
                self.timeout
            )),
        }
    }
}

async fn hang_up(session: &Handle<AcceptAnyHostKey>) {
    let _ = session
        .disconnect(Disconnect::ByApplication, "", "en")
        .await;
}

/// Client handler that trusts every server key.
#[derive(Debug, Clone, Copy)]
pub struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}
