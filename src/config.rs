//! Configuration file handling
//!
//! The monitor reads a TOML file such as:
//!
//! ```toml
//! checkpoint_dir = "/dmgr/config/temp/download/cells/was90cell/repository/checkpoints"
//! checkpoint_prefix = "Delta-"
//! audit_log = "./audit.log"
//! cursor_file = ".last_processed_timestamp"
//! interval = "60m"
//!
//! [extractor]
//! kind = "wsadmin"
//! tool_dir = "/opt/IBM/WebSphere/AppServer/bin"
//! conntype = "SOAP"
//! host = "localhost"
//! port = 8879
//! timeout = "10m"
//! ```
//!
//! Credentials never appear here; see [`crate::extractor::Credentials`].

use crate::error::{AuditError, Result};
use crate::extractor::{ArchiveDirExtractor, ConnectionParams, ConnectorType, Credentials, SnapshotExtractor, WsadminExtractor};
use crate::scanner::DEFAULT_PREFIX;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Top-level monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Directory the administrative tool writes checkpoints into
    pub checkpoint_dir: PathBuf,
    /// Name prefix preceding the ordering key
    pub checkpoint_prefix: String,
    /// Append-only audit log
    pub audit_log: PathBuf,
    /// File holding the cursor
    pub cursor_file: PathBuf,
    /// Delay between scheduled runs
    #[serde(with = "duration_str")]
    pub interval: Duration,
    /// How checkpoint archives are obtained
    pub extractor: ExtractorConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from(
                "/dmgr/config/temp/download/cells/was90cell/repository/checkpoints",
            ),
            checkpoint_prefix: DEFAULT_PREFIX.to_string(),
            audit_log: PathBuf::from("./audit.log"),
            cursor_file: PathBuf::from(".last_processed_timestamp"),
            interval: Duration::from_secs(60 * 60),
            extractor: ExtractorConfig::default(),
        }
    }
}

/// Extraction backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExtractorConfig {
    /// Run `wsadmin` against the deployment manager
    Wsadmin {
        /// Directory containing the launcher
        #[serde(default = "default_tool_dir")]
        tool_dir: PathBuf,
        /// Connector type
        #[serde(default)]
        conntype: ConnectorType,
        /// Server host
        #[serde(default = "default_host")]
        host: String,
        /// Server port
        #[serde(default = "default_port")]
        port: u16,
        /// Upper bound for one extraction
        #[serde(default = "default_timeout", with = "duration_str")]
        timeout: Duration,
    },
    /// Read pre-materialized `<checkpoint>.zip` files
    ArchiveDir {
        /// Directory holding the archives
        dir: PathBuf,
    },
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        let connection = ConnectionParams::default();
        ExtractorConfig::Wsadmin {
            tool_dir: connection.tool_dir,
            conntype: connection.conntype,
            host: connection.host,
            port: connection.port,
            timeout: default_timeout(),
        }
    }
}

fn default_tool_dir() -> PathBuf {
    ConnectionParams::default().tool_dir
}

fn default_host() -> String {
    ConnectionParams::default().host
}

fn default_port() -> u16 {
    ConnectionParams::default().port
}

fn default_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

impl ExtractorConfig {
    /// Whether this backend needs administrator credentials
    pub fn needs_credentials(&self) -> bool {
        matches!(self, ExtractorConfig::Wsadmin { .. })
    }

    /// Build the configured extractor
    ///
    /// `credentials` is required for the `wsadmin` backend.
    pub fn build(
        &self,
        credentials: Option<Credentials>,
        cancel: Option<CancellationToken>,
    ) -> Result<Box<dyn SnapshotExtractor>> {
        match self {
            ExtractorConfig::Wsadmin {
                tool_dir,
                conntype,
                host,
                port,
                timeout,
            } => {
                let credentials = credentials.ok_or_else(|| {
                    AuditError::config("the wsadmin extractor needs a username and password")
                })?;
                let connection = ConnectionParams {
                    tool_dir: tool_dir.clone(),
                    conntype: *conntype,
                    host: host.clone(),
                    port: *port,
                };
                let mut extractor = WsadminExtractor::new(connection, credentials, *timeout);
                if let Some(token) = cancel {
                    extractor = extractor.with_cancellation(token);
                }
                Ok(Box::new(extractor))
            }
            ExtractorConfig::ArchiveDir { dir } => Ok(Box::new(ArchiveDirExtractor::new(dir.clone()))),
        }
    }
}

impl AuditConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AuditError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: AuditConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default configuration to `path`
    pub fn write_default(path: &Path) -> Result<Self> {
        let config = AuditConfig::default();
        let body = toml::to_string_pretty(&config)?;
        let content = format!(
            "# Checkpoint audit monitor configuration\n\
             # Credentials are passed on the command line or via\n\
             # CHECKPOINT_AUDIT_USER / CHECKPOINT_AUDIT_PASSWORD.\n\n{}",
            body
        );
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_prefix.is_empty() {
            return Err(AuditError::config("checkpoint_prefix must not be empty"));
        }
        if self.interval.is_zero() {
            return Err(AuditError::config("interval must be greater than zero"));
        }
        if let ExtractorConfig::Wsadmin { port, timeout, .. } = &self.extractor {
            if *port == 0 {
                return Err(AuditError::config("extractor.port must be greater than zero"));
            }
            if timeout.is_zero() {
                return Err(AuditError::config("extractor.timeout must be greater than zero"));
            }
        }
        Ok(())
    }
}

/// Serde adapter for humantime durations (`"90s"`, `"1h 30m"`)
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
