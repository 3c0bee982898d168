use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time;
use tracing::{debug, warn};

/// Exit code reported when the child was terminated by a signal.
pub const SIGNALLED_EXIT_CODE: i32 = -1;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to launch {}: {source}", .path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running probe: {0}")]
    Io(#[from] io::Error),

    #[error("scan timed out after {}s", .after.as_secs_f64())]
    TimedOut { after: Duration },
}

/// Exit code plus stdout and stderr interleaved in the order the child wrote them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Launches the external probe executable and collects its output.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Run `executable` with positional `args` and wait for it to exit.
    ///
    /// Stdout and stderr share one pipe, so the collected text keeps the
    /// child's write order. A binary that cannot be started yields
    /// [`RunError::Launch`]; a binary that started and exited non-zero is a
    /// normal `Ok` with that exit code.
    pub async fn run<I, S>(&self, executable: &Path, args: I) -> Result<ProcessOutput, RunError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (reader, writer) = io::pipe()?;
        let stderr = writer.try_clone()?;
        // The Command owns our copies of the write end and drops them here,
        // so the reader sees EOF once the child side closes.
        let mut child = Command::new(executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Launch {
                path: executable.to_path_buf(),
                source,
            })?;
        debug!(executable = %executable.display(), pid = ?child.id(), "probe started");

        let collect = async {
            let output = read_merged(reader).await?;
            let status = child.wait().await?;
            Ok::<_, io::Error>((status, output))
        };

        let waited = match self.timeout {
            Some(after) => time::timeout(after, collect).await.map_err(|_| after),
            None => Ok(collect.await),
        };
        let (status, output) = match waited {
            Ok(res) => res?,
            Err(after) => {
                warn!(executable = %executable.display(), ?after, "probe timed out, killing it");
                let _ = child.kill().await;
                return Err(RunError::TimedOut { after });
            }
        };

        Ok(ProcessOutput {
            exit_code: status.code().unwrap_or(SIGNALLED_EXIT_CODE),
            output,
        })
    }
}

#[cfg(unix)]
async fn read_merged(reader: io::PipeReader) -> io::Result<String> {
    let reader = tokio::net::unix::pipe::Receiver::from_owned_fd(reader.into())?;
    collect_lines(reader).await
}

#[cfg(not(unix))]
async fn read_merged(mut reader: io::PipeReader) -> io::Result<String> {
    use std::io::Read;

    let raw = tokio::task::spawn_blocking(move || {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw).map(|_| raw)
    })
    .await
    .map_err(io::Error::other)??;
    collect_lines(raw.as_slice()).await
}

/// Read `reader` to EOF, ending every line with a single `\n`.
/// Invalid UTF-8 is replaced, not fatal.
async fn collect_lines<R>(reader: R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut combined = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        combined.push_str(line.trim_end_matches(['\n', '\r']));
        combined.push('\n');
    }
    Ok(combined)
}
