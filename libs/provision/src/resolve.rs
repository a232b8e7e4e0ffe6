//! Name → path resolution for dependency objects.
//!
//! The creation document references the node's TLS certificate and system
//! location by object path. Operators know them by name, so each name is
//! resolved by listing the collection and matching one field.

use std::collections::HashMap;

use tracing::debug;

use crate::client::{find_by, object_id, ManagerClient};
use crate::error::ProvisionError;
use crate::routes::Resource;

/// A resolved dependency object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    pub name: String,
    /// Object path, e.g. `/api/admin/configuration/v1/tls_certificate/1/`.
    pub path: String,
}

/// The two references a creation document needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReferences {
    pub tls_certificate: ResolvedReference,
    pub system_location: ResolvedReference,
}

/// Resolve `match_value` in `resource` to an object path.
///
/// Fails with [`ProvisionError::ReferenceNotFound`] when nothing matches.
pub async fn resolve(
    client: &ManagerClient,
    resource: Resource,
    match_field: &str,
    match_value: &str,
) -> Result<ResolvedReference, ProvisionError> {
    let objects = client.list(resource).await?;
    let found = find_by(&objects, match_field, match_value).ok_or_else(|| {
        ProvisionError::ReferenceNotFound {
            kind: resource.label(),
            name: match_value.to_string(),
        }
    })?;

    let path = resource.object_path(&object_id(found)?);
    debug!(resource = %resource, name = match_value, path = %path, "Resolved reference");

    Ok(ResolvedReference {
        name: match_value.to_string(),
        path,
    })
}

/// Resolver that remembers earlier answers for the lifetime of one invocation.
///
/// Keyed by manager URL, collection and name, so a batch that shares one
/// certificate issues a single listing for it.
#[derive(Debug, Default)]
pub struct ReferenceResolver {
    cache: HashMap<(String, Resource, String), ResolvedReference>,
}

impl ReferenceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a reference, consulting the cache first.
    pub async fn resolve(
        &mut self,
        client: &ManagerClient,
        resource: Resource,
        match_field: &str,
        match_value: &str,
    ) -> Result<ResolvedReference, ProvisionError> {
        let key = (
            client.base_url().to_string(),
            resource,
            match_value.to_string(),
        );
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        let resolved = resolve(client, resource, match_field, match_value).await?;
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Resolve a node's certificate (by subject name) and location (by name).
    pub async fn resolve_node_references(
        &mut self,
        client: &ManagerClient,
        tls_certificate_subject_name: &str,
        system_location_name: &str,
    ) -> Result<NodeReferences, ProvisionError> {
        let tls_certificate = self
            .resolve(
                client,
                Resource::TlsCertificate,
                "subject_name",
                tls_certificate_subject_name,
            )
            .await?;
        let system_location = self
            .resolve(client, Resource::SystemLocation, "name", system_location_name)
            .await?;

        Ok(NodeReferences {
            tls_certificate,
            system_location,
        })
    }
}
