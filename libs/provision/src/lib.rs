//! # pexnode-provision
//!
//! Provisions conferencing transcoder nodes in two phases:
//!
//! 1. **Register** the node's configuration record on the management API,
//!    after checking it does not already exist and resolving the TLS
//!    certificate and system location it references.
//! 2. **Bootstrap** the new node by posting the generated payload straight to
//!    the node's own endpoint.
//!
//! ## Components
//!
//! - [`RetryingTransport`]: HTTP with exponential-backoff retries
//! - [`ReferenceResolver`]: name → object path lookups, cached per invocation
//! - [`existence`]: duplicate-creation guard
//! - [`register()`]: node creation on the manager
//! - [`Bootstrapper`]: payload delivery with recovery-to-disk
//! - [`Provisioner`]: the per-node state machine, single or batch
//!
//! Every workflow runs its network calls one at a time; batches are processed
//! strictly in order.

mod bootstrap;
mod client;
mod error;
pub mod existence;
mod orchestrator;
mod register;
mod request;
mod resolve;
mod routes;
mod transport;

pub use bootstrap::{
    BootstrapFailure, BootstrapOutcome, BootstrapPayload, BootstrapReport, BootstrapSettings,
    Bootstrapper, DEFAULT_BOOTSTRAP_PORT, DEFAULT_BOOTSTRAP_TIMEOUT,
};
pub use client::ManagerClient;
pub use error::ProvisionError;
pub use orchestrator::{exit_code, NodeReport, Outcome, ProvisionTarget, Provisioner};
pub use register::{register, NodeCreateDocument};
pub use request::{ManagerConnection, NodeDefinition, ProvisioningRequest, REQUIRED_CREATE_FIELDS};
pub use resolve::{resolve, NodeReferences, ReferenceResolver, ResolvedReference};
pub use routes::Resource;
pub use transport::{
    RequestBody, RetryPolicy, RetryingTransport, TransportConfig, DEFAULT_BACKOFF_FACTOR,
    DEFAULT_BACKOFF_MAX, DEFAULT_MAX_RETRIES, DEFAULT_STATUS_FORCELIST,
};
