//! Node registration on the management API.

use serde::Serialize;
use tracing::{error, info};

use crate::bootstrap::BootstrapPayload;
use crate::client::ManagerClient;
use crate::error::ProvisionError;
use crate::request::{NodeDefinition, ProvisioningRequest};
use crate::resolve::NodeReferences;
use crate::routes::{Resource, DEPLOYMENT_TYPE, NODE_DESCRIPTION, NODE_TYPE};
use crate::transport::RequestBody;

/// Creation document for a conferencing node.
#[derive(Debug, Serialize)]
pub struct NodeCreateDocument<'a> {
    pub name: &'a str,
    pub hostname: &'a str,
    pub domain: &'a str,
    pub address: &'a str,
    pub static_nat_address: &'a str,
    pub netmask: &'a str,
    pub gateway: &'a str,
    pub password: &'a str,
    pub tls_certificate: &'a str,
    pub system_location: &'a str,
    pub description: &'static str,
    pub node_type: &'static str,
    pub deployment_type: &'static str,
}

impl<'a> NodeCreateDocument<'a> {
    pub fn new(node: &NodeDefinition<'a>, refs: &'a NodeReferences) -> Self {
        Self {
            name: node.hostname,
            hostname: node.hostname,
            domain: node.domain,
            address: node.private_ip,
            static_nat_address: node.public_ip,
            netmask: node.netmask,
            gateway: node.gateway,
            password: node.node_password,
            tls_certificate: &refs.tls_certificate.path,
            system_location: &refs.system_location.path,
            description: NODE_DESCRIPTION,
            node_type: NODE_TYPE,
            deployment_type: DEPLOYMENT_TYPE,
        }
    }
}

/// Register a node and return the generated bootstrap payload.
///
/// Required fields are checked before anything is sent. The POST is issued
/// once; the response body is returned verbatim on success.
pub async fn register(
    client: &ManagerClient,
    request: &ProvisioningRequest,
    refs: &NodeReferences,
) -> Result<BootstrapPayload, ProvisionError> {
    let node = request.node_definition()?;
    let body = RequestBody::json(&NodeCreateDocument::new(&node, refs))?;

    let response = client.create(Resource::Node, &body).await?;
    let status = response.status();
    let content = response.bytes().await?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&content).into_owned();
        error!(hostname = node.hostname, status = status.as_u16(), body = %body, "Node registration rejected");
        return Err(ProvisionError::RegistrationFailed {
            status: status.as_u16(),
            body,
        });
    }

    info!(hostname = node.hostname, "Successfully created node configuration");
    Ok(BootstrapPayload::new(content.to_vec()))
}
