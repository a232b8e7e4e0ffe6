//! Duplicate-creation guard.

use serde_json::Value;

use crate::client::{find_by, ManagerClient};
use crate::error::ProvisionError;
use crate::routes::Resource;

/// Look up the node record named `hostname`, if one exists.
pub async fn find_node(client: &ManagerClient, hostname: &str) -> Result<Option<Value>, ProvisionError> {
    let nodes = client.list(Resource::Node).await?;
    Ok(find_by(&nodes, "name", hostname).cloned())
}

/// Whether a node named `hostname` is already registered.
pub async fn exists(client: &ManagerClient, hostname: &str) -> Result<bool, ProvisionError> {
    Ok(find_node(client, hostname).await?.is_some())
}
