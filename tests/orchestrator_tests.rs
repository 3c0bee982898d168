#![cfg(unix)]

use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bfssh_rs::config::OrchestratorConfig;
use bfssh_rs::orchestrator::ScanOrchestrator;
use bfssh_rs::report::{ForwardError, HttpReporter, ReportSink};
use bfssh_rs::types::{ForwardFailure, ScanId, ScanOutcome, ScanResult, ScanStatus};
use tempfile::{tempdir, TempDir};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SCENARIO_JSON: &str =
    r#"{"host":"10.0.0.5","user":"admin","password":"correct123","message":"ok"}"#;

/// Records every forwarded result and answers with a fixed outcome.
struct RecordingSink {
    fail_with: Option<fn() -> ForwardError>,
    received: Mutex<Vec<ScanResult>>,
}

impl RecordingSink {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail_with: None,
            received: Mutex::new(Vec::new()),
        })
    }

    fn failing(f: fn() -> ForwardError) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(f),
            received: Mutex::new(Vec::new()),
        })
    }

    fn received(&self) -> Vec<ScanResult> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for RecordingSink {
    async fn forward(&self, result: &ScanResult) -> Result<(), ForwardError> {
        self.received.lock().unwrap().push(result.clone());
        match self.fail_with {
            Some(f) => Err(f()),
            None => Ok(()),
        }
    }
}

fn write_probe(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("probe.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn orchestrator_with(probe: PathBuf, sink: Arc<dyn ReportSink>) -> ScanOrchestrator {
    let config = OrchestratorConfig {
        probe_executable: probe,
        ..Default::default()
    };
    ScanOrchestrator::new(&config, sink)
}

fn setup(body: &str, sink: Arc<dyn ReportSink>) -> (TempDir, ScanOrchestrator) {
    let dir = tempdir().unwrap();
    let probe = write_probe(dir.path(), body);
    (dir, orchestrator_with(probe, sink))
}

async fn wait_for_terminal(orch: &ScanOrchestrator, id: &ScanId) -> ScanStatus {
    for _ in 0..400 {
        let status = orch.scan_status(id);
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("scan {id} did not finish");
}

#[tokio::test]
async fn successful_probe_completes_and_forwards_once() {
    let sink = RecordingSink::ok();
    let (_dir, orch) = setup(&format!("echo '{SCENARIO_JSON}'"), sink.clone());

    let (id, task) = orch.spawn_scan(42, "10.0.0.5", "/tmp/creds.txt");
    let final_status = task.await.unwrap();

    let expected_output = format!("{SCENARIO_JSON}\n");
    assert_eq!(final_status, ScanStatus::completed(expected_output.clone()));
    assert_eq!(orch.scan_status(&id), final_status);
    assert_eq!(
        orch.scan_status_text(&id.to_string()),
        format!("COMPLETED: {expected_output}")
    );

    let received = sink.received();
    assert_eq!(received.len(), 1);
    let expected: ScanResult = serde_json::from_str(SCENARIO_JSON).unwrap();
    assert_eq!(received[0], expected);
    assert_eq!(received[0].report_id, None);
}

#[tokio::test]
async fn probe_receives_report_id_host_and_wordlist() {
    let sink = RecordingSink::ok();
    let (_dir, orch) = setup(
        r#"printf '{"reportId":%s,"host":"%s","message":"%s"}\n' "$1" "$2" "$3""#,
        sink.clone(),
    );

    let (_id, task) = orch.spawn_scan(42, "10.0.0.5", "/tmp/creds.txt");
    task.await.unwrap();

    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].report_id, Some(42));
    assert_eq!(received[0].host, "10.0.0.5");
    assert_eq!(received[0].message.as_deref(), Some("/tmp/creds.txt"));
}

#[tokio::test]
async fn unparsable_success_output_is_an_exception_without_forwarding() {
    let sink = RecordingSink::ok();
    let (_dir, orch) = setup("echo 'Le port 22 (SSH) est ouvert'", sink.clone());

    let (id, task) = orch.spawn_scan(1, "10.0.0.5", "/tmp/creds.txt");
    let status = task.await.unwrap();

    assert!(matches!(status, ScanStatus::Exception { .. }), "got {status:?}");
    assert!(orch
        .scan_status_text(&id.to_string())
        .starts_with("EXCEPTION: failed to parse scan output"));
    assert!(sink.received().is_empty());
}

#[tokio::test]
async fn nonzero_exit_records_code_and_full_output() {
    let sink = RecordingSink::ok();
    let (_dir, orch) = setup("echo 'cannot open wordlist'; echo 'details' 1>&2; exit 3", sink.clone());

    let (id, task) = orch.spawn_scan(1, "10.0.0.5", "/tmp/creds.txt");
    let status = task.await.unwrap();

    match &status {
        ScanStatus::Finished {
            outcome: ScanOutcome::ProcessError { exit_code, output },
        } => {
            assert_eq!(*exit_code, 3);
            assert!(output.contains("cannot open wordlist\n"));
            assert!(output.contains("details\n"));
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert!(orch
        .scan_status_text(&id.to_string())
        .starts_with("ERROR: Exit code 3 : "));
    assert!(sink.received().is_empty());
}

#[tokio::test]
async fn nonzero_exit_with_result_document_is_still_forwarded() {
    let sink = RecordingSink::ok();
    let (_dir, orch) = setup(
        r#"echo '{"reportId":-1,"host":"","message":"Arguments invalides","error":"Usage"}'; exit 1"#,
        sink.clone(),
    );

    let (_id, task) = orch.spawn_scan(1, "10.0.0.5", "/tmp/creds.txt");
    let status = task.await.unwrap();

    assert!(matches!(
        status,
        ScanStatus::Finished {
            outcome: ScanOutcome::ProcessError { exit_code: 1, .. }
        }
    ));
    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].error.as_deref(), Some("Usage"));
}

#[tokio::test]
async fn nonzero_exit_forward_failure_keeps_process_error() {
    let doc = r#"{"reportId":-1,"host":"","message":"Arguments invalides","error":"Usage"}"#;
    let sink = RecordingSink::failing(|| ForwardError::ServerError { status: 502 });
    let (_dir, orch) = setup(&format!("echo '{doc}'; exit 1"), sink.clone());

    let (id, task) = orch.spawn_scan(1, "10.0.0.5", "/tmp/creds.txt");
    let status = task.await.unwrap();

    assert_eq!(
        status,
        ScanStatus::ForwardFailed {
            failure: ForwardFailure::ServerError,
            outcome: ScanOutcome::ProcessError {
                exit_code: 1,
                output: format!("{doc}\n"),
            },
        }
    );
    assert_eq!(sink.received().len(), 1);
    let text = orch.scan_status_text(&id.to_string());
    assert!(text.starts_with("ERROR: Server error while posting scan result | "));
    assert!(text.contains(&format!("ERROR: Exit code 1 : {doc}")), "got {text}");
}

#[tokio::test]
async fn wordlist_path_bytes_are_passed_through() {
    let sink = RecordingSink::ok();
    let (dir, orch) = setup(
        &format!(r#"printf '%s' "$3" > "$(dirname "$0")/wordlist-arg"; echo '{SCENARIO_JSON}'"#),
        sink,
    );
    let wordlist = PathBuf::from(OsStr::from_bytes(b"/tmp/mots-\xe9t\xe9.txt"));

    let (_id, task) = orch.spawn_scan(1, "10.0.0.5", wordlist.clone());
    let status = task.await.unwrap();

    assert!(matches!(status, ScanStatus::Finished { .. }), "got {status:?}");
    let seen = fs::read(dir.path().join("wordlist-arg")).unwrap();
    assert_eq!(seen, wordlist.as_os_str().as_bytes());
}

#[tokio::test]
async fn missing_executable_is_an_exception() {
    let sink = RecordingSink::ok();
    let orch = orchestrator_with(PathBuf::from("/definitely/not/here/sshConnexion"), sink.clone());

    let (id, task) = orch.spawn_scan(1, "10.0.0.5", "/tmp/creds.txt");
    let status = task.await.unwrap();

    assert!(matches!(status, ScanStatus::Exception { .. }));
    assert!(orch
        .scan_status_text(&id.to_string())
        .starts_with("EXCEPTION: failed to launch"));
    assert!(sink.received().is_empty());
}

#[tokio::test]
async fn forwarding_failures_map_to_distinct_statuses() {
    let cases: [(fn() -> ForwardError, ForwardFailure); 4] = [
        (
            || ForwardError::ResourceAccess("connection refused".into()),
            ForwardFailure::ResourceError,
        ),
        (|| ForwardError::ServerError { status: 503 }, ForwardFailure::ServerError),
        (|| ForwardError::NotFound, ForwardFailure::NotFound),
        (|| ForwardError::Rejected { status: 400 }, ForwardFailure::Rejected(400)),
    ];

    for (make_err, expected) in cases {
        let sink = RecordingSink::failing(make_err);
        let (_dir, orch) = setup(&format!("echo '{SCENARIO_JSON}'"), sink.clone());

        let (id, task) = orch.spawn_scan(42, "10.0.0.5", "/tmp/creds.txt");
        let status = task.await.unwrap();

        assert_eq!(
            status,
            ScanStatus::ForwardFailed {
                failure: expected,
                outcome: ScanOutcome::Completed {
                    output: format!("{SCENARIO_JSON}\n")
                },
            }
        );
        assert_eq!(sink.received().len(), 1);
        let text = orch.scan_status_text(&id.to_string());
        assert!(text.contains(SCENARIO_JSON), "payload lost in {text}");
    }
}

#[tokio::test]
async fn start_scan_returns_before_the_probe_finishes() {
    let sink = RecordingSink::ok();
    let (_dir, orch) = setup(&format!("sleep 1; echo '{SCENARIO_JSON}'"), sink.clone());

    let id = orch.start_scan(42, "10.0.0.5", "/tmp/creds.txt");
    assert_eq!(orch.scan_status(&id), ScanStatus::InProgress);
    assert_eq!(orch.scan_status_text(&id.to_string()), "IN_PROGRESS");

    let status = wait_for_terminal(&orch, &id).await;
    assert!(status.is_terminal());
}

#[tokio::test]
async fn status_never_returns_to_in_progress_once_terminal() {
    let sink = RecordingSink::failing(|| ForwardError::NotFound);
    let (_dir, orch) = setup(&format!("echo '{SCENARIO_JSON}'"), sink);

    let (id, task) = orch.spawn_scan(42, "10.0.0.5", "/tmp/creds.txt");
    let mut seen_terminal = false;
    while !task.is_finished() {
        let s = orch.scan_status(&id);
        if seen_terminal {
            assert_ne!(s, ScanStatus::InProgress);
        }
        seen_terminal |= s.is_terminal();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    task.await.unwrap();
    for _ in 0..20 {
        assert!(orch.scan_status(&id).is_terminal());
    }
}

#[tokio::test]
async fn unknown_identifiers_report_the_sentinel() {
    let orch = orchestrator_with(PathBuf::from("/bin/true"), RecordingSink::ok());
    assert_eq!(orch.scan_status(&ScanId::new()), ScanStatus::Unknown);
    assert_eq!(orch.scan_status_text(&ScanId::new().to_string()), "UNKNOWN_SCAN_ID");
    assert_eq!(orch.scan_status_text("not-a-scan-id"), "UNKNOWN_SCAN_ID");
}

#[tokio::test]
async fn concurrent_scans_get_distinct_ids_and_finish_independently() {
    let sink = RecordingSink::ok();
    let (_dir, orch) = setup(
        r#"printf '{"reportId":%s,"host":"%s"}\n' "$1" "$2""#,
        sink.clone(),
    );

    let mut tasks = Vec::new();
    for n in 1..=5i64 {
        tasks.push((n, orch.spawn_scan(n, format!("10.0.0.{n}"), "/tmp/creds.txt")));
    }
    let ids: std::collections::HashSet<_> = tasks.iter().map(|(_, (id, _))| *id).collect();
    assert_eq!(ids.len(), 5);

    for (n, (id, task)) in tasks {
        let status = task.await.unwrap();
        assert!(matches!(status, ScanStatus::Finished { .. }));
        assert_eq!(orch.scan_status(&id), status);
        assert!(status.to_string().contains(&format!("\"reportId\":{n}")));
    }
    assert_eq!(sink.received().len(), 5);
    assert_eq!(orch.registry().len(), 5);
}

#[tokio::test]
async fn http_reporter_receives_exact_payload() {
    let mock = MockServer::start().await;
    let expected: serde_json::Value = serde_json::from_str(SCENARIO_JSON).unwrap();
    Mock::given(method("POST"))
        .and(path("/report/bfssh"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .and(body_json(&expected))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock)
        .await;

    let reporter = HttpReporter::new(&mock.uri(), Duration::from_secs(5)).unwrap();
    let (_dir, orch) = setup(&format!("echo '{SCENARIO_JSON}'"), Arc::new(reporter));

    let (_id, task) = orch.spawn_scan(42, "10.0.0.5", "/tmp/creds.txt");
    let status = task.await.unwrap();
    assert!(matches!(
        status,
        ScanStatus::Finished {
            outcome: ScanOutcome::Completed { .. }
        }
    ));
}

#[tokio::test]
async fn unreachable_report_service_keeps_payload_in_status() {
    // Reserve a port and release it so nothing answers there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let reporter =
        HttpReporter::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).unwrap();
    let (_dir, orch) = setup(&format!("echo '{SCENARIO_JSON}'"), Arc::new(reporter));

    let (id, task) = orch.spawn_scan(42, "10.0.0.5", "/tmp/creds.txt");
    let status = task.await.unwrap();

    assert!(matches!(
        status,
        ScanStatus::ForwardFailed {
            failure: ForwardFailure::ResourceError,
            ..
        }
    ));
    let text = orch.scan_status_text(&id.to_string());
    assert!(text.starts_with("ERROR: Resource access error while posting scan result"));
    assert!(text.contains(&format!("COMPLETED: {SCENARIO_JSON}")));
}
