//! Per-node provisioning workflow.
//!
//! ```text
//! Start -> CheckExistence -> AlreadyExists
//!                         -> ResolveReferences -> Register -> Bootstrap -> Created
//!                                                                       -> RegisteredButBootstrapFailed
//! (ResolveReferences | Register) error -> Failed
//! ```
//!
//! Batches run the same workflow for each request, strictly in order. A failed
//! node never stops the nodes after it.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bootstrap::{
    BootstrapOutcome, BootstrapPayload, BootstrapReport, BootstrapSettings, Bootstrapper,
};
use crate::client::{object_id, ManagerClient};
use crate::error::ProvisionError;
use crate::existence;
use crate::register::register;
use crate::request::{ManagerConnection, ProvisioningRequest};
use crate::resolve::ReferenceResolver;
use crate::routes::Resource;
use crate::transport::TransportConfig;

/// Terminal state of one node's workflow.
#[derive(Debug)]
pub enum Outcome {
    /// A node with this hostname was already registered. Nothing was changed.
    AlreadyExists,
    /// Registered and bootstrapped.
    Created(BootstrapReport),
    /// Registered, but the node did not accept its payload. The record stays on
    /// the manager; the payload was saved to `report.recovery_file`, or
    /// `report.recovery_error` says why it could not be.
    RegisteredButBootstrapFailed(BootstrapReport),
    /// Remove workflow: the node record was deleted.
    Removed,
    /// Remove workflow: there was no node record to delete.
    NotFound,
    Failed(ProvisionError),
}

impl Outcome {
    /// Whether this outcome should make the process exit non-zero.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::RegisteredButBootstrapFailed(_) | Self::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyExists => "already-exists",
            Self::Created(_) => "created",
            Self::RegisteredButBootstrapFailed(_) => "registered-but-bootstrap-failed",
            Self::Removed => "removed",
            Self::NotFound => "not-found",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => f.write_str("already exists; no changes were made"),
            Self::Created(report) => write!(f, "created in {:.1?}", report.elapsed),
            Self::RegisteredButBootstrapFailed(report) => {
                write!(f, "registered, but bootstrap failed")?;
                if let BootstrapOutcome::Failed(reason) = &report.outcome {
                    write!(f, " ({reason})")?;
                }
                if let Some(path) = &report.recovery_file {
                    write!(f, "; payload saved to {}", path.display())?;
                }
                if let Some(err) = &report.recovery_error {
                    write!(f, "; payload could not be saved: {err}")?;
                }
                Ok(())
            }
            Self::Removed => f.write_str("removed"),
            Self::NotFound => f.write_str("not found; nothing to remove"),
            Self::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Outcome for a named node.
#[derive(Debug)]
pub struct NodeReport {
    pub hostname: String,
    pub outcome: Outcome,
}

/// One request or an ordered batch.
#[derive(Debug, Clone)]
pub enum ProvisionTarget {
    Single(ProvisioningRequest),
    Batch(Vec<ProvisioningRequest>),
}

impl ProvisionTarget {
    pub fn into_requests(self) -> Vec<ProvisioningRequest> {
        match self {
            Self::Single(request) => vec![request],
            Self::Batch(requests) => requests,
        }
    }
}

impl From<ProvisioningRequest> for ProvisionTarget {
    fn from(request: ProvisioningRequest) -> Self {
        Self::Single(request)
    }
}

impl From<Vec<ProvisioningRequest>> for ProvisionTarget {
    fn from(requests: Vec<ProvisioningRequest>) -> Self {
        Self::Batch(requests)
    }
}

/// Process exit code for a set of reports: 0 unless any node failed.
pub fn exit_code(reports: &[NodeReport]) -> i32 {
    if reports.iter().any(|r| r.outcome.is_failure()) {
        1
    } else {
        0
    }
}

/// Runs the create/remove workflows.
///
/// Holds one manager client per distinct connection and a reference cache,
/// both scoped to this value's lifetime.
#[derive(Debug)]
pub struct Provisioner {
    transport: TransportConfig,
    bootstrapper: Bootstrapper,
    clients: HashMap<ManagerConnection, ManagerClient>,
    resolver: ReferenceResolver,
}

impl Provisioner {
    pub fn new(transport: TransportConfig, bootstrap: BootstrapSettings) -> Result<Self, ProvisionError> {
        Ok(Self {
            transport,
            bootstrapper: Bootstrapper::new(bootstrap)?,
            clients: HashMap::new(),
            resolver: ReferenceResolver::new(),
        })
    }

    fn client(&mut self, connection: &ManagerConnection) -> Result<ManagerClient, ProvisionError> {
        if let Some(client) = self.clients.get(connection) {
            return Ok(client.clone());
        }
        let client = ManagerClient::new(connection, self.transport.clone())?;
        self.clients.insert(connection.clone(), client.clone());
        Ok(client)
    }

    /// Run the create workflow for every request, in order.
    pub async fn create_all(&mut self, target: impl Into<ProvisionTarget>) -> Vec<NodeReport> {
        let mut reports = Vec::new();
        for request in target.into().into_requests() {
            let hostname = request.display_name().to_string();
            let outcome = self.create(&request).await;
            reports.push(NodeReport { hostname, outcome });
        }
        reports
    }

    /// Run the create workflow for one node.
    pub async fn create(&mut self, request: &ProvisioningRequest) -> Outcome {
        let span = info_span!("create", hostname = request.display_name());
        match self.try_create(request).instrument(span).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(hostname = request.display_name(), error = %err, "Node provisioning failed");
                Outcome::Failed(err)
            }
        }
    }

    async fn try_create(&mut self, request: &ProvisioningRequest) -> Result<Outcome, ProvisionError> {
        let node = request.node_definition()?;
        let client = self.client(request.connection()?)?;

        debug!("Checking for an existing node record");
        if existence::exists(&client, node.hostname).await? {
            info!(
                manager = client.base_url(),
                "Configuration found; no changes were made"
            );
            return Ok(Outcome::AlreadyExists);
        }

        debug!("Resolving references");
        let refs = self
            .resolver
            .resolve_node_references(
                &client,
                node.tls_certificate_subject_name,
                node.system_location_name,
            )
            .await?;

        debug!("Registering node");
        let payload = register(&client, request, &refs).await?;

        debug!(bytes = payload.len(), "Bootstrapping node");
        let report = self
            .bootstrapper
            .bootstrap(&payload, node.private_ip, node.hostname)
            .await;

        if report.outcome.is_success() {
            Ok(Outcome::Created(report))
        } else {
            Ok(Outcome::RegisteredButBootstrapFailed(report))
        }
    }

    /// Run the remove workflow for every request, in order.
    pub async fn remove_all(&mut self, target: impl Into<ProvisionTarget>) -> Vec<NodeReport> {
        let mut reports = Vec::new();
        for request in target.into().into_requests() {
            let hostname = request.display_name().to_string();
            let outcome = self.remove(&request).await;
            reports.push(NodeReport { hostname, outcome });
        }
        reports
    }

    /// Delete the node record named by `request.hostname`, if present.
    pub async fn remove(&mut self, request: &ProvisioningRequest) -> Outcome {
        let span = info_span!("remove", hostname = request.display_name());
        match self.try_remove(request).instrument(span).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(hostname = request.display_name(), error = %err, "Node removal failed");
                Outcome::Failed(err)
            }
        }
    }

    async fn try_remove(&mut self, request: &ProvisioningRequest) -> Result<Outcome, ProvisionError> {
        let hostname = request
            .hostname
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or(ProvisionError::MissingArgument { field: "hostname" })?;
        let client = self.client(request.connection()?)?;

        let Some(record) = existence::find_node(&client, hostname).await? else {
            warn!("No node record to remove");
            return Ok(Outcome::NotFound);
        };

        let id = object_id(&record)?;
        client.delete(Resource::Node, &id).await?;
        info!(id = %id, "Removed node record");
        Ok(Outcome::Removed)
    }

    /// Re-send a payload saved by an earlier failed bootstrap.
    ///
    /// Only the Bootstrap state runs; the manager is not contacted and the
    /// file is left in place whatever the result.
    pub async fn bootstrap_from_file(
        &self,
        path: impl AsRef<Path>,
        address: &str,
        hostname: &str,
    ) -> Result<BootstrapReport, ProvisionError> {
        let payload = BootstrapPayload::from_file(path).await?;
        Ok(self.bootstrapper.deliver(&payload, address, hostname).await)
    }
}
