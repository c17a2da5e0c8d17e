//! Boundary to the tool that materializes checkpoint archives
//!
//! The audit pipeline never looks inside the administrative tool; it only asks
//! a [`SnapshotExtractor`] for the zip bytes of one checkpoint. Two
//! implementations ship with the crate:
//!
//! - [`WsadminExtractor`] drives `wsadmin` with a generated Jython script that
//!   calls `AdminTask.extractRepositoryCheckpoint`, bounded by a timeout
//! - [`ArchiveDirExtractor`] picks up `<checkpoint>.zip` files that were
//!   materialized earlier, for offline re-audits

use crate::error::{AuditError, Result};
use crate::types::Checkpoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[cfg(windows)]
const WSADMIN_SCRIPT: &str = "wsadmin.bat";
#[cfg(not(windows))]
const WSADMIN_SCRIPT: &str = "wsadmin.sh";

/// How often a running extraction is checked for exit, timeout or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Produces the archive for a checkpoint
pub trait SnapshotExtractor: Send + Sync {
    /// Return the zip bytes for `checkpoint`
    ///
    /// A missing or empty archive is an error.
    fn extract(&self, checkpoint: &Checkpoint) -> Result<Vec<u8>>;
}

/// Administrator credentials for the extraction tool
///
/// Supplied at runtime, never stored in configuration.
#[derive(Clone)]
pub struct Credentials {
    /// Admin user name
    pub username: String,
    /// Admin password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connector type accepted by `wsadmin -conntype`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectorType {
    /// SOAP connector (deployment manager default)
    #[default]
    Soap,
    /// RMI connector
    Rmi,
    /// Inter-process connector
    Ipc,
    /// Local mode, no server connection
    None,
}

impl ConnectorType {
    /// Value passed on the command line
    pub fn as_arg(&self) -> &'static str {
        match self {
            ConnectorType::Soap => "SOAP",
            ConnectorType::Rmi => "RMI",
            ConnectorType::Ipc => "IPC",
            ConnectorType::None => "NONE",
        }
    }
}

/// Where and how to reach the administrative server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Directory containing the `wsadmin` launcher
    pub tool_dir: PathBuf,
    /// Connector type
    pub conntype: ConnectorType,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            tool_dir: PathBuf::from("/opt/IBM/WebSphere/AppServer/bin"),
            conntype: ConnectorType::Soap,
            host: "localhost".to_string(),
            port: 8879,
        }
    }
}

/// Extracts checkpoints by running `wsadmin`
#[derive(Debug, Clone)]
pub struct WsadminExtractor {
    connection: ConnectionParams,
    credentials: Credentials,
    timeout: Duration,
    cancel: Option<CancellationToken>,
}

impl WsadminExtractor {
    /// Create an extractor with the given connection, credentials and time limit
    pub fn new(connection: ConnectionParams, credentials: Credentials, timeout: Duration) -> Self {
        Self {
            connection,
            credentials,
            timeout,
            cancel: None,
        }
    }

    /// Abort running extractions when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Path of the launcher that will be executed
    pub fn launcher(&self) -> PathBuf {
        self.connection.tool_dir.join(WSADMIN_SCRIPT)
    }

    /// Wait for `child`, killing it on timeout or cancellation
    fn wait_bounded(
        &self,
        checkpoint: &Checkpoint,
        child: &mut std::process::Child,
        started: Instant,
    ) -> Result<ExitStatus> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                kill_quietly(child);
                return Err(AuditError::Cancelled);
            }
            if started.elapsed() >= self.timeout {
                kill_quietly(child);
                return Err(AuditError::ExtractionTimeout {
                    checkpoint: checkpoint.name.clone(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait for the output relays within what is left of the time limit
    ///
    /// Descendants of the launcher can hold the pipes open after it exits.
    /// Relays still running at the deadline or on cancellation are detached.
    fn drain_relays(&self, done: &mpsc::Receiver<()>, mut pending: usize, started: Instant) {
        while pending > 0 {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                break;
            }
            let remaining = self.timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            match done.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(()) => pending -= 1,
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => return,
            }
        }
        if pending > 0 {
            warn!("Extraction output still open after wsadmin exited, detaching");
        }
    }
}

impl SnapshotExtractor for WsadminExtractor {
    #[instrument(skip_all, fields(checkpoint = %checkpoint.name))]
    fn extract(&self, checkpoint: &Checkpoint) -> Result<Vec<u8>> {
        let scratch = tempfile::Builder::new().prefix("extract_checkpoint_").tempdir()?;
        let archive_path = scratch.path().join(format!("{}.zip", checkpoint.name));
        let script_path = scratch.path().join("extract_checkpoint.py");
        fs::write(&script_path, extraction_script(&checkpoint.name, &archive_path))?;

        let launcher = self.launcher();
        debug!("Running {} with script {}", launcher.display(), script_path.display());

        let mut child = Command::new(&launcher)
            .arg("-conntype")
            .arg(self.connection.conntype.as_arg())
            .arg("-host")
            .arg(&self.connection.host)
            .arg("-port")
            .arg(self.connection.port.to_string())
            .arg("-user")
            .arg(&self.credentials.username)
            .arg("-password")
            .arg(&self.credentials.password)
            .arg("-f")
            .arg(&script_path)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AuditError::extraction(&checkpoint.name, format!("cannot start {}: {}", launcher.display(), e))
            })?;

        let started = Instant::now();
        let (done_tx, done_rx) = mpsc::channel();
        let mut relays = 0;
        if let Some(stdout) = child.stdout.take() {
            relay_output(stdout, done_tx.clone());
            relays += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            relay_output(stderr, done_tx.clone());
            relays += 1;
        }
        drop(done_tx);

        // On timeout or cancellation the relays are left to finish on their own
        let status = self.wait_bounded(checkpoint, &mut child, started)?;
        self.drain_relays(&done_rx, relays, started);

        if !status.success() {
            return Err(AuditError::extraction(
                &checkpoint.name,
                format!("wsadmin exited with {}", status),
            ));
        }

        let bytes = match fs::read(&archive_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AuditError::extraction(
                    &checkpoint.name,
                    format!("archive not created: {}", archive_path.display()),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Err(AuditError::extraction(&checkpoint.name, "archive is empty"));
        }

        info!("Extracted checkpoint {} ({} bytes)", checkpoint.name, bytes.len());
        Ok(bytes)
    }
}

/// Reads archives materialized ahead of time as `<dir>/<checkpoint>.zip`
#[derive(Debug, Clone)]
pub struct ArchiveDirExtractor {
    dir: PathBuf,
}

impl ArchiveDirExtractor {
    /// Create an extractor reading from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Archive location for a checkpoint
    pub fn archive_path(&self, checkpoint: &Checkpoint) -> PathBuf {
        self.dir.join(format!("{}.zip", checkpoint.name))
    }
}

impl SnapshotExtractor for ArchiveDirExtractor {
    fn extract(&self, checkpoint: &Checkpoint) -> Result<Vec<u8>> {
        let path = self.archive_path(checkpoint);
        let bytes = fs::read(&path).map_err(|e| {
            AuditError::extraction(&checkpoint.name, format!("{}: {}", path.display(), e))
        })?;
        if bytes.is_empty() {
            return Err(AuditError::extraction(&checkpoint.name, "archive is empty"));
        }
        Ok(bytes)
    }
}

/// Jython script asking the server to write the checkpoint archive
fn extraction_script(checkpoint_name: &str, archive_path: &Path) -> String {
    let archive = archive_path.to_string_lossy();
    format!(
        "# Checkpoint extraction script\n\
         checkpointName = '{name}'\n\
         zipFileName = '{archive}'\n\
         AdminTask.extractRepositoryCheckpoint('[-checkpointName ' + checkpointName + ' -extractToFile \"' + zipFileName + '\"]')\n\
         print 'Checkpoint extracted to: ' + zipFileName\n",
        name = python_escape(checkpoint_name),
        archive = python_escape(&archive),
    )
}

/// Escape a value for a single-quoted Python string literal
fn python_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Forward each line of a child stream to the log, signalling `done` at end of stream
fn relay_output<R: Read + Send + 'static>(stream: R, done: mpsc::Sender<()>) {
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => debug!("wsadmin: {}", line),
                Err(_) => break,
            }
        }
        let _ = done.send(());
    });
}

fn kill_quietly(child: &mut std::process::Child) {
    if let Err(e) = child.kill() {
        warn!(error = %e, "Failed to kill extraction process");
    }
    let _ = child.wait();
}
