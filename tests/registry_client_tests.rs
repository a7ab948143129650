//! Tests for the runner registry HTTP client against a mock server

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use runner_pool_operator::adapters::registry::{GitHubRegistry, RunnerRegistry};
use runner_pool_operator::Error;

fn registry(server: &MockServer) -> GitHubRegistry {
    GitHubRegistry::new(server.uri(), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn registered_count_comes_from_total_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/actions/runners"))
        .and(header("authorization", "token ghp_secret"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 7,
            "runners": [
                { "id": 1, "name": "alpha-00001", "status": "online", "busy": true },
                { "id": 2, "name": "alpha-00002", "status": "offline", "busy": false }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let count = registry(&server)
        .registered_runners("acme", "ghp_secret")
        .await
        .unwrap();

    assert_eq!(count, 7);
}

#[tokio::test]
async fn runner_listing_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/actions/runners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "runners": [{ "id": 42, "name": "alpha-00001", "status": "online", "busy": false }]
        })))
        .mount(&server)
        .await;

    let list = registry(&server).list_runners("acme", "t").await.unwrap();

    assert_eq!(list.runners.len(), 1);
    assert_eq!(list.runners[0].id, Some(42));
    assert_eq!(list.runners[0].status.as_deref(), Some("online"));
}

#[tokio::test]
async fn camel_case_total_count_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/actions/runners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "totalCount": 3 })))
        .mount(&server)
        .await;

    let count = registry(&server)
        .registered_runners("acme", "t")
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn server_error_is_a_registry_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = registry(&server)
        .registered_runners("acme", "t")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RegistryError(_)));
    assert!(err.to_string().contains("502"));
}

#[tokio::test]
async fn unauthorized_is_reported_separately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = registry(&server)
        .registered_runners("acme", "bad")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RegistryUnauthorized(_)));
}

#[tokio::test]
async fn malformed_body_is_a_registry_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "runners": [] })))
        .mount(&server)
        .await;

    let err = registry(&server)
        .registered_runners("acme", "t")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RegistryError(_)));
}

#[tokio::test]
async fn slow_registry_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "total_count": 1 }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = GitHubRegistry::new(server.uri(), Duration::from_millis(200)).unwrap();
    let err = client.registered_runners("acme", "t").await.unwrap_err();

    assert!(matches!(err, Error::RegistryError(_)));
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/actions/runners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "total_count": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GitHubRegistry::new(format!("{}/", server.uri()), Duration::from_secs(2)).unwrap();
    assert_eq!(client.registered_runners("acme", "t").await.unwrap(), 0);
}
