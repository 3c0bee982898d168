use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::OrchestratorConfig;
use crate::registry::ScanRegistry;
use crate::report::{HttpReporter, ReportSink};
use crate::runner::ProcessRunner;
use crate::types::{ScanId, ScanOutcome, ScanResult, ScanStatus};

/// Starts probe scans in the background and tracks them in a [`ScanRegistry`].
///
/// Cheap to clone; clones share the registry and reporter.
#[derive(Clone)]
pub struct ScanOrchestrator {
    inner: Arc<Shared>,
}

struct Shared {
    registry: ScanRegistry,
    runner: ProcessRunner,
    reporter: Arc<dyn ReportSink>,
    probe_executable: PathBuf,
    default_wordlist: Option<PathBuf>,
}

impl ScanOrchestrator {
    pub fn new(config: &OrchestratorConfig, reporter: Arc<dyn ReportSink>) -> Self {
        Self {
            inner: Arc::new(Shared {
                registry: ScanRegistry::new(),
                runner: ProcessRunner::new(config.scan_timeout),
                reporter,
                probe_executable: config.probe_executable.clone(),
                default_wordlist: config.default_wordlist.clone(),
            }),
        }
    }

    /// Build an orchestrator that forwards to the HTTP report service named in `config`.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        let reporter = HttpReporter::new(&config.report_base_url, config.report_timeout)
            .context("failed to build report client")?;
        Ok(Self::new(config, Arc::new(reporter)))
    }

    pub fn registry(&self) -> &ScanRegistry {
        &self.inner.registry
    }

    pub fn default_wordlist(&self) -> Option<&Path> {
        self.inner.default_wordlist.as_deref()
    }

    /// Register a new scan and run it in the background. Returns immediately.
    pub fn start_scan(
        &self,
        report_id: i64,
        host: impl Into<String>,
        wordlist: impl Into<PathBuf>,
    ) -> ScanId {
        let (id, _task) = self.spawn_scan(report_id, host, wordlist);
        id
    }

    /// Like [`start_scan`](Self::start_scan) but also hands back the task,
    /// which resolves to the last status the scan wrote.
    pub fn spawn_scan(
        &self,
        report_id: i64,
        host: impl Into<String>,
        wordlist: impl Into<PathBuf>,
    ) -> (ScanId, JoinHandle<ScanStatus>) {
        let id = ScanId::new();
        let host = host.into();
        let wordlist = wordlist.into();
        self.inner.registry.put(id, ScanStatus::InProgress);
        info!(%id, report_id, %host, wordlist = %wordlist.display(), "scan queued");

        let span = info_span!("scan", %id, report_id, %host);
        let this = self.clone();
        let task = tokio::spawn(
            async move { this.execute(id, report_id, &host, &wordlist).await }.instrument(span),
        );
        (id, task)
    }

    pub fn scan_status(&self, id: &ScanId) -> ScanStatus {
        self.inner.registry.get(id)
    }

    /// Status text for a raw identifier; anything unparsable is unknown.
    pub fn scan_status_text(&self, raw_id: &str) -> String {
        match raw_id.parse::<ScanId>() {
            Ok(id) => self.scan_status(&id).to_string(),
            Err(_) => ScanStatus::Unknown.to_string(),
        }
    }

    async fn execute(&self, id: ScanId, report_id: i64, host: &str, wordlist: &Path) -> ScanStatus {
        let shared = &self.inner;
        let args = [
            OsString::from(report_id.to_string()),
            OsString::from(host),
            wordlist.as_os_str().to_os_string(),
        ];

        let output = match shared.runner.run(&shared.probe_executable, &args).await {
            Ok(o) => o,
            Err(e) => {
                error!(error = %e, "scan could not run");
                return self.record(id, ScanStatus::exception(e.to_string()));
            }
        };

        let succeeded = output.success();
        let parsed = parse_scan_result(&output.output);
        let outcome = if succeeded {
            ScanOutcome::Completed {
                output: output.output,
            }
        } else {
            ScanOutcome::ProcessError {
                exit_code: output.exit_code,
                output: output.output,
            }
        };

        // A failed run is still forwarded if it printed a well-formed result.
        let result = match parsed {
            Ok(r) => Some(r),
            Err(e) if succeeded => {
                error!(error = %e, "probe exited 0 with unparsable output");
                return self.record(
                    id,
                    ScanStatus::exception(format!("failed to parse scan output: {e}")),
                );
            }
            Err(_) => None,
        };

        match &outcome {
            ScanOutcome::Completed { .. } => info!("scan completed"),
            ScanOutcome::ProcessError { exit_code, output } => {
                error!(exit_code, output = %output.trim_end(), "probe exited with error")
            }
        }
        let finished = self.record(
            id,
            ScanStatus::Finished {
                outcome: outcome.clone(),
            },
        );

        let Some(result) = result else {
            return finished;
        };
        match shared.reporter.forward(&result).await {
            Ok(()) => {
                info!("scan result forwarded");
                finished
            }
            Err(e) => {
                warn!(error = %e, "failed to forward scan result");
                self.record(
                    id,
                    ScanStatus::ForwardFailed {
                        failure: e.failure(),
                        outcome,
                    },
                )
            }
        }
    }

    fn record(&self, id: ScanId, status: ScanStatus) -> ScanStatus {
        self.inner.registry.put(id, status.clone());
        status
    }
}

/// Parse the probe's stdout as a single JSON [`ScanResult`] document.
pub fn parse_scan_result(output: &str) -> serde_json::Result<ScanResult> {
    serde_json::from_str(output.trim())
}
