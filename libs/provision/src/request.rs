//! Per-node provisioning input.

use std::fmt;

use crate::error::ProvisionError;

/// Fields that must be present and non-empty before a node can be created.
pub const REQUIRED_CREATE_FIELDS: [&str; 9] = [
    "hostname",
    "domain",
    "private_ip",
    "public_ip",
    "netmask",
    "gateway",
    "node_password",
    "tls_certificate_subject_name",
    "system_location_name",
];

/// Connection details for the management API.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ManagerConnection {
    /// Base URL of the manager, e.g. `https://manager.example.com`.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Verify the manager's TLS certificate. `false` is insecure mode.
    pub verify_tls: bool,
}

impl ManagerConnection {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            verify_tls: true,
        }
    }

    /// Disable certificate verification for this session.
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.verify_tls = !insecure;
        self
    }
}

impl fmt::Debug for ManagerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerConnection")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("verify_tls", &self.verify_tls)
            .finish_non_exhaustive()
    }
}

/// Validated input for one node, as delivered by the CLI/config layer.
///
/// Node fields stay optional here so that a missing value surfaces as
/// [`ProvisionError::MissingArgument`] naming the field, instead of an empty
/// string sneaking into the creation document.
#[derive(Clone, Default)]
pub struct ProvisioningRequest {
    pub hostname: Option<String>,
    pub domain: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub netmask: Option<String>,
    pub gateway: Option<String>,
    pub node_password: Option<String>,
    pub tls_certificate_subject_name: Option<String>,
    pub system_location_name: Option<String>,
    pub connection: Option<ManagerConnection>,
}

impl ProvisioningRequest {
    /// Start a request for `hostname` against `connection`.
    pub fn new(hostname: impl Into<String>, connection: ManagerConnection) -> Self {
        Self {
            hostname: Some(hostname.into()),
            connection: Some(connection),
            ..Default::default()
        }
    }

    /// Hostname for reporting, even when the request is incomplete.
    pub fn display_name(&self) -> &str {
        self.hostname.as_deref().unwrap_or("<unnamed>")
    }

    fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "hostname" => &self.hostname,
            "domain" => &self.domain,
            "private_ip" => &self.private_ip,
            "public_ip" => &self.public_ip,
            "netmask" => &self.netmask,
            "gateway" => &self.gateway,
            "node_password" => &self.node_password,
            "tls_certificate_subject_name" => &self.tls_certificate_subject_name,
            "system_location_name" => &self.system_location_name,
            _ => return None,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// Check every required field and return a borrowed, fully populated view.
    pub fn node_definition(&self) -> Result<NodeDefinition<'_>, ProvisionError> {
        if let Some(field) = REQUIRED_CREATE_FIELDS
            .into_iter()
            .find(|name| self.field(name).is_none())
        {
            return Err(ProvisionError::MissingArgument { field });
        }

        let get = |name: &'static str| {
            self.field(name)
                .ok_or(ProvisionError::MissingArgument { field: name })
        };

        Ok(NodeDefinition {
            hostname: get("hostname")?,
            domain: get("domain")?,
            private_ip: get("private_ip")?,
            public_ip: get("public_ip")?,
            netmask: get("netmask")?,
            gateway: get("gateway")?,
            node_password: get("node_password")?,
            tls_certificate_subject_name: get("tls_certificate_subject_name")?,
            system_location_name: get("system_location_name")?,
        })
    }

    /// The manager connection, required by every workflow.
    pub fn connection(&self) -> Result<&ManagerConnection, ProvisionError> {
        self.connection
            .as_ref()
            .filter(|c| !c.url.trim().is_empty())
            .ok_or(ProvisionError::MissingArgument {
                field: "manager_url",
            })
    }
}

impl fmt::Debug for ProvisioningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningRequest")
            .field("hostname", &self.hostname)
            .field("domain", &self.domain)
            .field("private_ip", &self.private_ip)
            .field("public_ip", &self.public_ip)
            .field("netmask", &self.netmask)
            .field("gateway", &self.gateway)
            .field(
                "tls_certificate_subject_name",
                &self.tls_certificate_subject_name,
            )
            .field("system_location_name", &self.system_location_name)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

/// A request with every required field present.
#[derive(Debug, Clone, Copy)]
pub struct NodeDefinition<'a> {
    pub hostname: &'a str,
    pub domain: &'a str,
    pub private_ip: &'a str,
    pub public_ip: &'a str,
    pub netmask: &'a str,
    pub gateway: &'a str,
    pub node_password: &'a str,
    pub tls_certificate_subject_name: &'a str,
    pub system_location_name: &'a str,
}

#[cfg(test)]
pub(crate) fn complete_request(hostname: &str) -> ProvisioningRequest {
    ProvisioningRequest {
        domain: Some("example.com".to_string()),
        private_ip: Some("10.0.0.10".to_string()),
        public_ip: Some("203.0.113.10".to_string()),
        netmask: Some("255.255.255.0".to_string()),
        gateway: Some("10.0.0.1".to_string()),
        node_password: Some("s3cret".to_string()),
        tls_certificate_subject_name: Some("cert-a".to_string()),
        system_location_name: Some("london".to_string()),
        ..ProvisioningRequest::new(
            hostname,
            ManagerConnection::new("https://manager.test", "admin", "pw"),
        )
    }
}
