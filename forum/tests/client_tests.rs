//! HTTP-level tests for `HttpForumClient` against a wiremock server.

#![allow(clippy::unwrap_used)]

use cdk_core::error::ForumError;
use cdk_core::lottery::resolve_winners;
use cdk_core::providers::ForumClient;
use cdk_forum::HttpForumClient;
use std::time::Duration;
use tokio_test::assert_err;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> HttpForumClient {
    HttpForumClient::new(server.uri(), "secret", Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn topic_sends_api_key_and_decodes_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/t/42.json"))
        .and(header("User-Api-Key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 42,
            "title": "giveaway",
            "highest_post_number": 17,
            "tags": ["抽奖", "福利"],
            "closed": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let topic = client(&server).topic(42).await.unwrap();
    assert_eq!(topic.highest_post_number, 17);
    assert_eq!(topic.tags, vec!["抽奖".to_string(), "福利".to_string()]);
    assert!(topic.closed);
}

#[tokio::test]
async fn missing_tags_and_closed_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/t/7.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "highest_post_number": 3 })),
        )
        .mount(&server)
        .await;

    let topic = client(&server).topic(7).await.unwrap();
    assert!(topic.tags.is_empty());
    assert!(!topic.closed);
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/t/1.json"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = assert_err!(client(&server).topic(1).await);
    assert_eq!(err, ForumError::Status(403));
}

#[tokio::test]
async fn malformed_topic_body_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/t/1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = assert_err!(client(&server).topic(1).await);
    assert!(matches!(err, ForumError::Parse(_)));
}

#[tokio::test]
async fn unreachable_forum_is_a_request_failure() {
    let client = HttpForumClient::new("http://127.0.0.1:1", "secret", Duration::from_millis(200))
        .unwrap();
    let err = assert_err!(client.topic(1).await);
    assert!(matches!(err, ForumError::RequestFailed(_)));
}

#[tokio::test]
async fn raw_post_returns_markdown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/raw/42/17"))
        .and(header("User-Api-Key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("帖子作者: alice\n"))
        .mount(&server)
        .await;

    let raw = client(&server).raw_post(42, 17).await.unwrap();
    assert_eq!(raw, "帖子作者: alice\n");
}

#[tokio::test]
async fn resolves_winners_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/t/42.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "highest_post_number": 5,
            "tags": ["抽奖"],
            "closed": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw/42/5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "帖子作者: alice\n### 以下为中奖佬友及对应楼层：\n@bob 2楼\n@carol 3楼\n",
        ))
        .mount(&server)
        .await;

    let forum = client(&server);
    let allocations = resolve_winners(&forum, 42, "alice", &["K1".to_string(), "K2".to_string()])
        .await
        .unwrap();

    let winners: Vec<_> = allocations.iter().map(|a| a.winner.as_str()).collect();
    assert_eq!(winners, vec!["bob", "carol"]);
}
