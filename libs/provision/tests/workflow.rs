//! End-to-end create/remove/recovery workflows against a fake manager and node.

mod harness;

use std::time::Duration;

use harness::{
    bootstrap_settings, closed_port, count_requests, listing, mount_certificates,
    mount_locations, mount_nodes, provisioner, request, PAYLOAD,
};
use pexnode_provision::{
    exit_code, BootstrapFailure, BootstrapOutcome, NodeReport, Outcome, ProvisionError, Resource,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NODE_ROUTE: &str = "/api/admin/configuration/v1/worker_vm/";
const BOOTSTRAP: &str = "/configuration/bootstrap";

async fn mount_registration(manager: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path(NODE_ROUTE))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(manager)
        .await;
}

async fn mount_node_endpoint(node: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path(BOOTSTRAP))
        .and(header("content-type", "text/xml"))
        .respond_with(ResponseTemplate::new(status))
        .mount(node)
        .await;
}

fn dir_is_empty(dir: &std::path::Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn creates_and_bootstraps_new_node() {
    let manager = MockServer::start().await;
    let node = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &["other-node"]).await;
    mount_certificates(&manager, &["cert-z", "cert-a"]).await;
    mount_locations(&manager, &["london"]).await;
    Mock::given(method("POST"))
        .and(path(NODE_ROUTE))
        .and(body_partial_json(json!({
            "name": "node1",
            "address": "127.0.0.1",
            "tls_certificate": "/api/admin/configuration/v1/tls_certificate/2/",
            "system_location": "/api/admin/configuration/v1/system_location/1/",
            "node_type": "CONFERENCING",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_string(PAYLOAD))
        .expect(1)
        .mount(&manager)
        .await;
    Mock::given(method("POST"))
        .and(path(BOOTSTRAP))
        .and(header("content-type", "text/xml"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&node)
        .await;

    let mut provisioner = provisioner(bootstrap_settings(node.address().port(), recovery.path(), 2));
    let outcome = provisioner.create(&request(&manager, "node1")).await;

    match &outcome {
        Outcome::Created(report) => {
            assert_eq!(report.outcome, BootstrapOutcome::Success { status: 200 });
            assert!(report.recovery_file.is_none());
        }
        other => panic!("expected Created, got {other:?}"),
    }
    assert!(!outcome.is_failure());
    assert!(dir_is_empty(recovery.path()));

    let received = node.received_requests().await.unwrap();
    assert_eq!(received[0].body, PAYLOAD.as_bytes());
}

#[tokio::test]
async fn unreachable_node_leaves_payload_on_disk() {
    let manager = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &[]).await;
    mount_certificates(&manager, &["cert-a"]).await;
    mount_locations(&manager, &["london"]).await;
    mount_registration(&manager, 200, PAYLOAD).await;

    let mut provisioner = provisioner(bootstrap_settings(closed_port(), recovery.path(), 2));
    let outcome = provisioner.create(&request(&manager, "node1")).await;

    let report = match &outcome {
        Outcome::RegisteredButBootstrapFailed(report) => report,
        other => panic!("expected RegisteredButBootstrapFailed, got {other:?}"),
    };
    assert!(matches!(
        report.outcome,
        BootstrapOutcome::Failed(BootstrapFailure::Unreachable { .. })
    ));

    let saved = recovery.path().join("node1.xml");
    assert_eq!(report.recovery_file.as_deref(), Some(saved.as_path()));
    assert_eq!(std::fs::read_to_string(&saved).unwrap(), PAYLOAD);

    let reports = [NodeReport {
        hostname: "node1".into(),
        outcome,
    }];
    assert_eq!(exit_code(&reports), 1);
}

#[tokio::test]
async fn unwritable_recovery_dir_keeps_bootstrap_failure() {
    let manager = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let missing = root.path().join("no-such-dir");

    mount_nodes(&manager, &[]).await;
    mount_certificates(&manager, &["cert-a"]).await;
    mount_locations(&manager, &["london"]).await;
    mount_registration(&manager, 201, PAYLOAD).await;

    let mut provisioner = provisioner(bootstrap_settings(closed_port(), &missing, 0));
    let outcome = provisioner.create(&request(&manager, "node1")).await;

    assert_eq!(outcome.label(), "registered-but-bootstrap-failed");
    let report = match &outcome {
        Outcome::RegisteredButBootstrapFailed(report) => report,
        other => panic!("expected RegisteredButBootstrapFailed, got {other:?}"),
    };
    assert!(matches!(
        report.outcome,
        BootstrapOutcome::Failed(BootstrapFailure::Unreachable { .. })
    ));
    assert!(report.recovery_file.is_none());
    assert!(report
        .recovery_error
        .as_deref()
        .is_some_and(|e| e.contains("no-such-dir")));

    let text = outcome.to_string();
    assert!(text.contains("unreachable"), "{text}");
    assert!(text.contains("could not be saved"), "{text}");
}

#[tokio::test]
async fn slow_node_times_out_and_is_persisted() {
    let manager = MockServer::start().await;
    let node = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &[]).await;
    mount_certificates(&manager, &["cert-a"]).await;
    mount_locations(&manager, &["london"]).await;
    mount_registration(&manager, 200, PAYLOAD).await;
    Mock::given(method("POST"))
        .and(path(BOOTSTRAP))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&node)
        .await;

    let mut provisioner = provisioner(bootstrap_settings(node.address().port(), recovery.path(), 2));
    let outcome = provisioner.create(&request(&manager, "node1")).await;

    match outcome {
        Outcome::RegisteredButBootstrapFailed(report) => {
            assert!(matches!(
                report.outcome,
                BootstrapOutcome::Failed(BootstrapFailure::Unreachable {
                    timed_out: true,
                    ..
                })
            ));
        }
        other => panic!("expected RegisteredButBootstrapFailed, got {other:?}"),
    }
    assert!(recovery.path().join("node1.xml").exists());
}

#[tokio::test]
async fn node_rejecting_payload_is_persisted() {
    let manager = MockServer::start().await;
    let node = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &[]).await;
    mount_certificates(&manager, &["cert-a"]).await;
    mount_locations(&manager, &["london"]).await;
    mount_registration(&manager, 200, PAYLOAD).await;
    mount_node_endpoint(&node, 400).await;

    let mut provisioner = provisioner(bootstrap_settings(node.address().port(), recovery.path(), 2));
    let outcome = provisioner.create(&request(&manager, "node1")).await;

    match outcome {
        Outcome::RegisteredButBootstrapFailed(report) => {
            assert!(matches!(
                report.outcome,
                BootstrapOutcome::Failed(BootstrapFailure::Rejected { status: 400, .. })
            ));
        }
        other => panic!("expected RegisteredButBootstrapFailed, got {other:?}"),
    }
    assert!(recovery.path().join("node1.xml").exists());
    assert_eq!(count_requests(&node, "POST", BOOTSTRAP).await, 1);
}

#[tokio::test]
async fn existing_node_short_circuits_before_any_post() {
    let manager = MockServer::start().await;
    let node = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &["node1"]).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&manager)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&node)
        .await;

    let mut provisioner = provisioner(bootstrap_settings(node.address().port(), recovery.path(), 2));
    let reports = provisioner.create_all(request(&manager, "node1")).await;

    assert_eq!(reports.len(), 1);
    assert!(matches!(reports[0].outcome, Outcome::AlreadyExists));
    assert_eq!(exit_code(&reports), 0);
    assert_eq!(count_requests(&manager, "GET", Resource::TlsCertificate.route()).await, 0);
}

#[tokio::test]
async fn unknown_certificate_fails_before_registration() {
    let manager = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &[]).await;
    mount_certificates(&manager, &["cert-a"]).await;
    mount_locations(&manager, &["london"]).await;
    Mock::given(method("POST"))
        .and(path(NODE_ROUTE))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&manager)
        .await;

    let mut req = request(&manager, "node1");
    req.tls_certificate_subject_name = Some("cert-x".to_string());

    let mut provisioner = provisioner(bootstrap_settings(closed_port(), recovery.path(), 0));
    match provisioner.create(&req).await {
        Outcome::Failed(ProvisionError::ReferenceNotFound { kind, name }) => {
            assert_eq!(kind, "TLS Certificate");
            assert_eq!(name, "cert-x");
        }
        other => panic!("expected ReferenceNotFound, got {other:?}"),
    }
    assert!(dir_is_empty(recovery.path()));
}

#[tokio::test]
async fn unknown_location_fails_before_registration() {
    let manager = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &[]).await;
    mount_certificates(&manager, &["cert-a"]).await;
    mount_locations(&manager, &["paris"]).await;

    let mut provisioner = provisioner(bootstrap_settings(closed_port(), recovery.path(), 0));
    let outcome = provisioner.create(&request(&manager, "node1")).await;

    assert!(matches!(
        outcome,
        Outcome::Failed(ProvisionError::ReferenceNotFound {
            kind: "System Location",
            ..
        })
    ));
    assert_eq!(count_requests(&manager, "POST", NODE_ROUTE).await, 0);
}

#[tokio::test]
async fn rejected_registration_skips_bootstrap() {
    let manager = MockServer::start().await;
    let node = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &[]).await;
    mount_certificates(&manager, &["cert-a"]).await;
    mount_locations(&manager, &["london"]).await;
    mount_registration(&manager, 400, r#"{"worker_vm": {"address": ["invalid"]}}"#).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&node)
        .await;

    let mut provisioner = provisioner(bootstrap_settings(node.address().port(), recovery.path(), 0));
    match provisioner.create(&request(&manager, "node1")).await {
        Outcome::Failed(ProvisionError::RegistrationFailed { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid"));
        }
        other => panic!("expected RegistrationFailed, got {other:?}"),
    }
    assert!(dir_is_empty(recovery.path()));
}

#[tokio::test]
async fn registration_post_is_sent_once_on_server_error() {
    let manager = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &[]).await;
    mount_certificates(&manager, &["cert-a"]).await;
    mount_locations(&manager, &["london"]).await;
    mount_registration(&manager, 502, "bad gateway").await;

    let mut provisioner = provisioner(bootstrap_settings(closed_port(), recovery.path(), 0));
    let outcome = provisioner.create(&request(&manager, "node1")).await;

    assert!(matches!(
        outcome,
        Outcome::Failed(ProvisionError::RegistrationFailed { status: 502, .. })
    ));
    assert_eq!(count_requests(&manager, "POST", NODE_ROUTE).await, 1);
}

#[tokio::test]
async fn batch_continues_past_failures_and_shares_lookups() {
    let manager = MockServer::start().await;
    let node = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &["existing"]).await;
    Mock::given(method("GET"))
        .and(path(Resource::TlsCertificate.route()))
        .respond_with(listing(vec![json!({ "id": 1, "subject_name": "cert-a" })]))
        .expect(1)
        .mount(&manager)
        .await;
    mount_locations(&manager, &["london"]).await;
    mount_registration(&manager, 201, PAYLOAD).await;
    mount_node_endpoint(&node, 200).await;

    let mut incomplete = request(&manager, "broken");
    incomplete.gateway = None;

    let batch = vec![
        request(&manager, "existing"),
        incomplete,
        request(&manager, "fresh-a"),
        request(&manager, "fresh-b"),
    ];

    let mut provisioner = provisioner(bootstrap_settings(node.address().port(), recovery.path(), 0));
    let reports = provisioner.create_all(batch).await;

    let summary: Vec<_> = reports
        .iter()
        .map(|r| (r.hostname.as_str(), r.outcome.label()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("existing", "already-exists"),
            ("broken", "failed"),
            ("fresh-a", "created"),
            ("fresh-b", "created"),
        ]
    );
    assert_eq!(exit_code(&reports), 1);
    assert_eq!(count_requests(&manager, "POST", NODE_ROUTE).await, 2);
}

#[tokio::test]
async fn existence_check_follows_pagination() {
    let manager = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(NODE_ROUTE))
        .and(query_param("offset", "1"))
        .respond_with(listing(vec![json!({ "id": 2, "name": "node1" })]))
        .with_priority(1)
        .mount(&manager)
        .await;
    Mock::given(method("GET"))
        .and(path(NODE_ROUTE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": { "next": format!("{NODE_ROUTE}?limit=1&offset=1") },
            "objects": [{ "id": 1, "name": "other" }],
        })))
        .mount(&manager)
        .await;

    let mut provisioner = provisioner(bootstrap_settings(closed_port(), recovery.path(), 0));
    let outcome = provisioner.create(&request(&manager, "node1")).await;

    assert!(matches!(outcome, Outcome::AlreadyExists));
    assert_eq!(count_requests(&manager, "GET", NODE_ROUTE).await, 2);
}

#[tokio::test]
async fn repeating_next_link_is_rejected() {
    let manager = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(NODE_ROUTE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": { "next": format!("{NODE_ROUTE}?offset=1") },
            "objects": [{ "id": 1, "name": "other" }],
        })))
        .mount(&manager)
        .await;

    let mut provisioner = provisioner(bootstrap_settings(closed_port(), recovery.path(), 0));
    match provisioner.create(&request(&manager, "node1")).await {
        Outcome::Failed(ProvisionError::InvalidResponse(msg)) => {
            assert!(msg.contains("revisits"), "{msg}")
        }
        other => panic!("expected InvalidResponse, got {other:?}"),
    }
    assert_eq!(count_requests(&manager, "GET", NODE_ROUTE).await, 2);
}

#[tokio::test]
async fn failed_listing_reports_status() {
    let manager = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(NODE_ROUTE))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&manager)
        .await;

    let mut provisioner = provisioner(bootstrap_settings(closed_port(), recovery.path(), 0));
    match provisioner.create(&request(&manager, "node1")).await {
        Outcome::Failed(err) => {
            assert_eq!(err.status(), Some(401));
            assert!(err.hint().is_some());
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn stored_payload_can_be_resent() {
    let manager = MockServer::start().await;
    let node = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &[]).await;
    mount_certificates(&manager, &["cert-a"]).await;
    mount_locations(&manager, &["london"]).await;
    mount_registration(&manager, 200, PAYLOAD).await;

    let mut failing = provisioner(bootstrap_settings(closed_port(), recovery.path(), 1));
    let outcome = failing.create(&request(&manager, "node1")).await;
    assert!(matches!(outcome, Outcome::RegisteredButBootstrapFailed(_)));

    mount_node_endpoint(&node, 200).await;
    let recovering = provisioner(bootstrap_settings(node.address().port(), recovery.path(), 1));
    let saved = recovery.path().join("node1.xml");
    let report = recovering
        .bootstrap_from_file(&saved, "127.0.0.1", "node1")
        .await
        .unwrap();

    assert_eq!(report.outcome, BootstrapOutcome::Success { status: 200 });
    assert!(report.recovery_file.is_none());
    assert!(saved.exists());
    assert_eq!(node.received_requests().await.unwrap()[0].body, PAYLOAD.as_bytes());
}

#[tokio::test]
async fn missing_payload_file_is_an_io_error() {
    let recovery = tempfile::tempdir().unwrap();
    let provisioner = provisioner(bootstrap_settings(closed_port(), recovery.path(), 0));

    let err = provisioner
        .bootstrap_from_file(recovery.path().join("absent.xml"), "127.0.0.1", "absent")
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Io { .. }));
}

#[tokio::test]
async fn remove_deletes_existing_record() {
    let manager = MockServer::start().await;
    let recovery = tempfile::tempdir().unwrap();

    mount_nodes(&manager, &["other", "node1"]).await;
    Mock::given(method("DELETE"))
        .and(path(Resource::Node.object_path("2")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&manager)
        .await;

    let mut provisioner = provisioner(bootstrap_settings(closed_port(), recovery.path(), 0));
    let reports = provisioner
        .remove_all(vec![request(&manager, "node1"), request(&manager, "ghost")])
        .await;

    assert!(matches!(reports[0].outcome, Outcome::Removed));
    assert!(matches!(reports[1].outcome, Outcome::NotFound));
    assert_eq!(exit_code(&reports), 0);
}
