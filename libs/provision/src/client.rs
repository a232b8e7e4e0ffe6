//! Management API client.
//!
//! Lists collections (following `meta.next` pagination), creates and deletes
//! objects. All calls go through the [`RetryingTransport`].

use std::collections::HashSet;

use reqwest::{Method, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::ProvisionError;
use crate::request::ManagerConnection;
use crate::routes::Resource;
use crate::transport::{RequestBody, RetryingTransport, TransportConfig};

/// A collection listing page.
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    meta: Option<ListMeta>,
    #[serde(default)]
    objects: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ListMeta {
    #[serde(default)]
    next: Option<String>,
}

/// Client for one management API endpoint.
#[derive(Debug, Clone)]
pub struct ManagerClient {
    transport: RetryingTransport,
    base_url: String,
}

impl ManagerClient {
    /// Build a client for `connection`, retrying per `config.retry`.
    ///
    /// `config.verify_tls` is overridden by the connection's own setting.
    pub fn new(connection: &ManagerConnection, config: TransportConfig) -> Result<Self, ProvisionError> {
        let config = TransportConfig {
            verify_tls: connection.verify_tls,
            ..config
        };
        let transport = RetryingTransport::new(config)?
            .with_basic_auth(&connection.username, &connection.password);

        Ok(Self {
            transport,
            base_url: connection.url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a URL for an API path. Absolute URLs are passed through.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Fetch every object in a collection.
    pub async fn list(&self, resource: Resource) -> Result<Vec<Value>, ProvisionError> {
        let mut objects = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(resource.route().to_string());

        while let Some(path) = next.take() {
            if !visited.insert(path.clone()) {
                return Err(ProvisionError::InvalidResponse(format!(
                    "pagination for {resource} revisits {path}"
                )));
            }
            debug!(resource = %resource, path = %path, "Listing collection");
            let response = self.transport.send(Method::GET, &self.url(&path), None).await?;
            let page: ListResponse = read_json(response).await?;

            objects.extend(page.objects);
            next = page
                .meta
                .and_then(|m| m.next)
                .filter(|n| !n.is_empty());
        }

        Ok(objects)
    }

    /// POST a JSON document to a collection and return the raw response.
    ///
    /// Status handling is left to the caller.
    pub async fn create(&self, resource: Resource, body: &RequestBody) -> Result<Response, ProvisionError> {
        self.transport
            .send(Method::POST, &self.url(resource.route()), Some(body))
            .await
    }

    /// DELETE an object by id.
    pub async fn delete(&self, resource: Resource, id: &str) -> Result<(), ProvisionError> {
        let response = self
            .transport
            .send(Method::DELETE, &self.url(&resource.object_path(id)), None)
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }
}

/// Decode a successful JSON response, or turn a failure into an API error.
async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ProvisionError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| ProvisionError::InvalidResponse(format!("failed to parse response: {e}")))
}

async fn api_error(response: Response) -> ProvisionError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    error!(status, body = %body, "Management API request failed");
    ProvisionError::Api { status, body }
}

/// Find the first object whose `field` equals `value`.
///
/// String and numeric fields are both compared by their textual form.
pub fn find_by<'a>(objects: &'a [Value], field: &str, value: &str) -> Option<&'a Value> {
    objects
        .iter()
        .find(|obj| obj.get(field).and_then(value_text).as_deref() == Some(value))
}

/// Textual form of a scalar JSON value.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The `id` of an object, as text.
pub fn object_id(obj: &Value) -> Result<String, ProvisionError> {
    obj.get("id")
        .and_then(value_text)
        .ok_or_else(|| ProvisionError::InvalidResponse("object has no usable 'id' field".to_string()))
}
