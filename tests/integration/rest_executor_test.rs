//! `RestExecutor` against a mocked HTTP API

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::test_config;
use crate::{assert_contains, assert_err, assert_ok};
use zaptap_sync::network::NetworkFacade;
use zaptap_sync::offline::MemoryStore;
use zaptap_sync::sync::{ManualConnectivity, NetInfoState, RemoteExecutor, RestExecutor};
use zaptap_sync::{ExecutionError, OperationKind, OperationState};

#[tokio::test]
async fn test_posts_payload_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-automation"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_json(json!({ "name": "Morning" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    let executor = RestExecutor::new(server.uri()).with_token("secret-token");

    let kind = OperationKind::new("create-automation");
    assert_ok!(executor.execute(&kind, &json!({ "name": "Morning" })).await);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].headers.get("content-type").unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_error_status_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rate-automation"))
        .respond_with(ResponseTemplate::new(422).set_body_string("stars out of range"))
        .mount(&server)
        .await;
    let executor = RestExecutor::new(server.uri());

    let result = executor
        .execute(&OperationKind::new("rate-automation"), &json!({ "stars": 9 }))
        .await;
    match result {
        Err(ExecutionError::Rejected { status, message }) => {
            assert_eq!(status, 422);
            assert_contains!(message, "stars out of range");
        }
        other => panic!("Expected Rejected, got {:?}", other),
    }

    // Unmatched routes answer 404
    let missing = executor
        .execute(&OperationKind::new("unknown"), &json!({}))
        .await;
    assert_err!(missing, ExecutionError::Rejected { status: 404, .. });
}

#[tokio::test]
async fn test_facade_replays_queue_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/save-automation"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;
    let source = Arc::new(ManualConnectivity::new(NetInfoState::wifi()));
    let network = assert_ok!(
        NetworkFacade::start(
            test_config(3),
            source,
            None,
            Arc::new(RestExecutor::new(server.uri())),
            Arc::new(MemoryStore::new()),
        )
        .await
    );

    let first = assert_ok!(network.enqueue("save-automation", json!({ "step": 1 })).await);
    let second = assert_ok!(network.enqueue("save-automation", json!({ "step": 2 })).await);
    let progress = assert_ok!(network.force_sync().await);
    assert_eq!(progress.completed, 2);

    let bodies: Vec<serde_json::Value> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.body_json().unwrap())
        .collect();
    assert_eq!(bodies, vec![json!({ "step": 1 }), json!({ "step": 2 })]);
    for id in [first, second] {
        assert_eq!(
            network.queue().get(&id).await.unwrap().state,
            OperationState::Completed
        );
    }
    network.shutdown();
}
