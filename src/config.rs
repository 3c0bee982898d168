use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

/// Address the HTTP API listens on unless told otherwise.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Report service base URL. Must not point back at [`DEFAULT_BIND`].
pub const DEFAULT_REPORT_URL: &str = "http://localhost:8081";

/// Settings for launching probe scans and forwarding their results.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Probe executable, invoked as `<exe> <reportId> <host> <wordlistPath>`.
    pub probe_executable: PathBuf,
    /// Word list used when a scan request does not name one.
    pub default_wordlist: Option<PathBuf>,
    pub report_base_url: String,
    /// Kill the probe after this long. `None` waits forever.
    pub scan_timeout: Option<Duration>,
    pub report_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            probe_executable: PathBuf::from("./sshConnexion"),
            default_wordlist: None,
            report_base_url: DEFAULT_REPORT_URL.to_string(),
            scan_timeout: None,
            report_timeout: Duration::from_secs(10),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.probe_executable.as_os_str().is_empty() {
            bail!("probe executable path must not be empty");
        }
        let url = self.report_base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("report base URL must start with http:// or https://: {url}");
        }
        if self.scan_timeout.is_some_and(|t| t.is_zero()) {
            bail!("scan timeout must be greater than zero");
        }
        if self.report_timeout.is_zero() {
            bail!("report timeout must be greater than zero");
        }
        Ok(())
    }
}

/// Settings for the synchronous SSH probe and credential trials.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub port: u16,
    pub timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: 22,
            timeout: Duration::from_millis(3000),
        }
    }
}

impl SshConfig {
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("ssh port out of range: 0");
        }
        if self.timeout.is_zero() {
            bail!("ssh timeout must be greater than zero");
        }
        Ok(())
    }
}
