//! Management API route table.
//!
//! Every collection the provisioner touches lives under a fixed route keyed by
//! a logical resource name. Object paths are `{route}{id}/`.

use std::fmt;

/// A management API collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Conferencing (worker) nodes.
    Node,
    /// TLS certificates, matched by subject name.
    TlsCertificate,
    /// System locations, matched by name.
    SystemLocation,
}

impl Resource {
    /// Collection route, with leading and trailing slash.
    pub fn route(self) -> &'static str {
        match self {
            Self::Node => "/api/admin/configuration/v1/worker_vm/",
            Self::TlsCertificate => "/api/admin/configuration/v1/tls_certificate/",
            Self::SystemLocation => "/api/admin/configuration/v1/system_location/",
        }
    }

    /// Logical resource name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::TlsCertificate => "tls_certificate",
            Self::SystemLocation => "system_location",
        }
    }

    /// Human readable label used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Node => "Node",
            Self::TlsCertificate => "TLS Certificate",
            Self::SystemLocation => "System Location",
        }
    }

    /// Path of a single object in this collection.
    pub fn object_path(self, id: &str) -> String {
        format!("{}{}/", self.route(), id)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed fields merged into every node creation document.
pub const NODE_DESCRIPTION: &str = "Transcoding Node";
pub const NODE_TYPE: &str = "CONFERENCING";
pub const DEPLOYMENT_TYPE: &str = "MANUAL-PROVISION-ONLY";

/// Path of the bootstrap endpoint on a freshly deployed node.
pub const BOOTSTRAP_PATH: &str = "/configuration/bootstrap";
