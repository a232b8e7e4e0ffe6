//! Direct delivery of the bootstrap payload to a freshly deployed node.
//!
//! The node is brand new and presents a self-signed certificate, so
//! certificate verification is always off for this call, independent of the
//! manager connection's setting. Its service may not be listening yet, which
//! is what the retry budget and short per-attempt timeout are for.
//!
//! On failure the payload is written to `<recovery_dir>/<hostname>.xml` so it
//! can be re-sent later with [`Bootstrapper::deliver`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reqwest::Method;
use tracing::{error, info, warn};

use crate::error::ProvisionError;
use crate::routes::BOOTSTRAP_PATH;
use crate::transport::{RequestBody, RetryPolicy, RetryingTransport, TransportConfig};

/// Port the node's bootstrap service listens on.
pub const DEFAULT_BOOTSTRAP_PORT: u16 = 8443;

/// Per-attempt timeout for the bootstrap call.
pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Opaque configuration generated by the manager for one node.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapPayload(Vec<u8>);

impl BootstrapPayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Load a payload saved by an earlier failed bootstrap.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ProvisionError> {
        let path = path.as_ref();
        tokio::fs::read(path)
            .await
            .map(Self)
            .map_err(|source| ProvisionError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn write_to(&self, path: &Path) -> Result<(), ProvisionError> {
        tokio::fs::write(path, &self.0)
            .await
            .map_err(|source| ProvisionError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl fmt::Debug for BootstrapPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Payloads carry node credentials.
        write!(f, "BootstrapPayload({} bytes)", self.0.len())
    }
}

/// Bootstrap delivery settings.
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    pub scheme: String,
    pub port: u16,
    pub timeout: Duration,
    /// Directory recovery files are written to.
    pub recovery_dir: PathBuf,
    pub retry: RetryPolicy,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            port: DEFAULT_BOOTSTRAP_PORT,
            timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
            recovery_dir: PathBuf::from("."),
            retry: RetryPolicy::default(),
        }
    }
}

/// Why a bootstrap attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapFailure {
    /// Connection or timeout failure once retries were spent.
    Unreachable { timed_out: bool, message: String },
    /// The node answered with a non-success status.
    Rejected { status: u16, body: String },
}

impl fmt::Display for BootstrapFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable {
                timed_out: true,
                message,
            } => write!(f, "connection timed out: {message}"),
            Self::Unreachable { message, .. } => write!(f, "unreachable: {message}"),
            Self::Rejected { status, body } => write!(f, "status {status}: {body}"),
        }
    }
}

/// Classification of one bootstrap delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Success { status: u16 },
    Failed(BootstrapFailure),
}

impl BootstrapOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Result of a bootstrap delivery, with timing and any recovery file.
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub hostname: String,
    pub outcome: BootstrapOutcome,
    pub elapsed: Duration,
    pub recovery_file: Option<PathBuf>,
    /// Set when the payload could not be written to the recovery file.
    pub recovery_error: Option<String>,
}

/// Delivers bootstrap payloads to nodes.
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    transport: RetryingTransport,
    settings: BootstrapSettings,
}

impl Bootstrapper {
    pub fn new(settings: BootstrapSettings) -> Result<Self, ProvisionError> {
        let transport = RetryingTransport::new(TransportConfig {
            verify_tls: false,
            timeout: Some(settings.timeout),
            retry: settings.retry.clone(),
        })?;

        Ok(Self {
            transport,
            settings,
        })
    }

    /// Bootstrap URL for a node address (hostname, IPv4 or IPv6).
    pub fn endpoint(&self, address: &str) -> String {
        let host = if address.contains(':') && !address.starts_with('[') {
            format!("[{address}]")
        } else {
            address.to_string()
        };
        format!(
            "{}://{}:{}{}",
            self.settings.scheme, host, self.settings.port, BOOTSTRAP_PATH
        )
    }

    /// Where a failed payload for `hostname` is persisted.
    ///
    /// Characters outside `[A-Za-z0-9._-]` are replaced with `_`, so the file
    /// always lands directly inside the recovery directory.
    pub fn recovery_path(&self, hostname: &str) -> PathBuf {
        let stem: String = hostname
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.settings.recovery_dir.join(format!("{stem}.xml"))
    }

    /// Send `payload` to the node at `address` and classify the result.
    ///
    /// Nothing is written to disk.
    pub async fn deliver(&self, payload: &BootstrapPayload, address: &str, hostname: &str) -> BootstrapReport {
        let url = self.endpoint(address);
        let body = RequestBody::xml(payload.as_bytes());
        info!(hostname, address, "Attempting to provision node");

        let start = Instant::now();
        let outcome = match self.transport.send(Method::POST, &url, Some(&body)).await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    info!(hostname, status = status.as_u16(), "Node accepted bootstrap payload");
                    BootstrapOutcome::Success {
                        status: status.as_u16(),
                    }
                } else {
                    let body = response.text().await.unwrap_or_default();
                    warn!(hostname, status = status.as_u16(), body = %body, "Error response while provisioning node");
                    BootstrapOutcome::Failed(BootstrapFailure::Rejected {
                        status: status.as_u16(),
                        body,
                    })
                }
            }
            Err(ProvisionError::Network(err)) => {
                let timed_out = err.is_timeout();
                warn!(hostname, error = %err, timed_out, "Could not reach node");
                BootstrapOutcome::Failed(BootstrapFailure::Unreachable {
                    timed_out,
                    message: err.to_string(),
                })
            }
            Err(err) => {
                warn!(hostname, error = %err, "Unknown error while provisioning node");
                BootstrapOutcome::Failed(BootstrapFailure::Unreachable {
                    timed_out: false,
                    message: err.to_string(),
                })
            }
        };
        let elapsed = start.elapsed();
        info!(hostname, ?elapsed, "Bootstrap finished");

        BootstrapReport {
            hostname: hostname.to_string(),
            outcome,
            elapsed,
            recovery_file: None,
            recovery_error: None,
        }
    }

    /// Deliver `payload`, persisting it for a later retry if delivery fails.
    ///
    /// A failed write is recorded on the report next to the delivery failure.
    pub async fn bootstrap(&self, payload: &BootstrapPayload, address: &str, hostname: &str) -> BootstrapReport {
        let mut report = self.deliver(payload, address, hostname).await;

        if !report.outcome.is_success() {
            let path = self.recovery_path(hostname);
            match payload.write_to(&path).await {
                Ok(()) => {
                    warn!(hostname, path = %path.display(), "Wrote bootstrap payload to disk for retry");
                    report.recovery_file = Some(path);
                }
                Err(err) => {
                    error!(hostname, error = %err, "Could not save bootstrap payload");
                    report.recovery_error = Some(err.to_string());
                }
            }
        }

        report
    }
}
