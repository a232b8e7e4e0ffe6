//! Shared fixtures: a fake management API and a fake node.
#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use pexnode_provision::{
    BootstrapSettings, ManagerConnection, ProvisioningRequest, Provisioner, Resource, RetryPolicy,
    TransportConfig,
};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PAYLOAD: &str = "<xml/>";

/// Millisecond-scale retry policy so tests never sleep for seconds.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff_factor: Duration::from_millis(1),
        backoff_max: Duration::from_millis(10),
        ..Default::default()
    }
}

pub fn connection(server: &MockServer) -> ManagerConnection {
    ManagerConnection::new(server.uri(), "admin", "secret")
}

/// A complete request whose node address points at the local host.
pub fn request(server: &MockServer, hostname: &str) -> ProvisioningRequest {
    ProvisioningRequest {
        domain: Some("example.com".to_string()),
        private_ip: Some("127.0.0.1".to_string()),
        public_ip: Some("203.0.113.10".to_string()),
        netmask: Some("255.255.255.0".to_string()),
        gateway: Some("10.0.0.1".to_string()),
        node_password: Some("node-pass".to_string()),
        tls_certificate_subject_name: Some("cert-a".to_string()),
        system_location_name: Some("london".to_string()),
        ..ProvisioningRequest::new(hostname, connection(server))
    }
}

/// Bootstrap settings aimed at a plain-HTTP fake node on `port`.
pub fn bootstrap_settings(port: u16, recovery_dir: &Path, retries: u32) -> BootstrapSettings {
    BootstrapSettings {
        scheme: "http".to_string(),
        port,
        timeout: Duration::from_millis(500),
        recovery_dir: recovery_dir.to_path_buf(),
        retry: fast_retry(retries),
    }
}

pub fn provisioner(bootstrap: BootstrapSettings) -> Provisioner {
    let transport = TransportConfig {
        retry: fast_retry(2),
        ..Default::default()
    };
    Provisioner::new(transport, bootstrap).unwrap()
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn listing(objects: Vec<Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "meta": { "limit": 20, "next": null, "offset": 0, "total_count": objects.len() },
        "objects": objects,
    }))
}

pub async fn mount_nodes(server: &MockServer, names: &[&str]) {
    let objects = names
        .iter()
        .enumerate()
        .map(|(i, name)| json!({ "id": i + 1, "name": name }))
        .collect();
    Mock::given(method("GET"))
        .and(path(Resource::Node.route()))
        .respond_with(listing(objects))
        .mount(server)
        .await;
}

pub async fn mount_certificates(server: &MockServer, subject_names: &[&str]) {
    let objects = subject_names
        .iter()
        .enumerate()
        .map(|(i, name)| json!({ "id": i + 1, "subject_name": name }))
        .collect();
    Mock::given(method("GET"))
        .and(path(Resource::TlsCertificate.route()))
        .respond_with(listing(objects))
        .mount(server)
        .await;
}

pub async fn mount_locations(server: &MockServer, names: &[&str]) {
    let objects = names
        .iter()
        .enumerate()
        .map(|(i, name)| json!({ "id": i + 1, "name": name }))
        .collect();
    Mock::given(method("GET"))
        .and(path(Resource::SystemLocation.route()))
        .respond_with(listing(objects))
        .mount(server)
        .await;
}

/// Count requests received with `http_method` on `route`.
pub async fn count_requests(server: &MockServer, http_method: &str, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == route)
        .count()
}
