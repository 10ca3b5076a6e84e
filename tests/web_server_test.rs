use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use bookbot::web_server::{build_router, AppState};
use bookbot::{constants, ChatService, Requester, RequesterConfig};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_server(api_url: &str) -> TestServer {
    let config = RequesterConfig {
        api_url: api_url.to_string(),
        ..RequesterConfig::default()
    };
    let chat = Arc::new(ChatService::new(Requester::new(config).unwrap()));
    TestServer::new(build_router(AppState::new(chat, "templates"))).unwrap()
}

#[tokio::test]
async fn test_index_renders_greeting() {
    let server = test_server("http://127.0.0.1:9");
    let response = server.get("/").await;

    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("<title>BookBot</title>"));
    assert!(html.contains("personal book recommendation assistant"));
    assert!(html.contains("Upload your reading list first!"));
}

#[tokio::test]
async fn test_conversation_starts_with_greeting() {
    let server = test_server("http://127.0.0.1:9");
    let body: Value = server.get("/api/conversation").await.json();

    assert_eq!(body["data_loaded"], false);
    assert_eq!(body["book_count"], 0);
    assert_eq!(body["busy"], false);
    assert_eq!(body["turns"][0]["role"], "assistant");
    assert_eq!(body["turns"][0]["content"], constants::GREETING);
}

#[tokio::test]
async fn test_upload_loads_books() {
    let server = test_server("http://127.0.0.1:9");
    let response = server
        .post("/api/upload")
        .text("Book Title,Author\n\"Smith, John\",30\nDune,Herbert\n")
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data_loaded"], true);
    assert_eq!(body["book_count"], 2);
    assert_eq!(body["turn"]["content"], constants::upload_succeeded(2));
}

#[tokio::test]
async fn test_unreadable_upload_is_unprocessable() {
    let server = test_server("http://127.0.0.1:9");
    let response = server
        .post("/api/upload")
        .bytes(vec![0xffu8, 0xfe, 0xfd].into())
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["data_loaded"], false);
    assert_eq!(body["turn"]["content"], constants::UPLOAD_FAILED);
}

#[tokio::test]
async fn test_message_round_trip() {
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "Try Piranesi." }]
        })))
        .expect(1)
        .mount(&llm)
        .await;

    let server = test_server(&llm.uri());
    server.post("/api/upload").text("Title,Author\nDune,Herbert\n").await;

    let response = server
        .post("/api/messages")
        .json(&json!({ "text": "something strange" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["user"]["content"], "something strange");
    assert_eq!(body["assistant"]["content"], "Try Piranesi.");

    let conversation: Value = server.get("/api/conversation").await.json();
    assert_eq!(conversation["turns"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_empty_message_is_bad_request() {
    let server = test_server("http://127.0.0.1:9");
    let response = server
        .post("/api/messages")
        .json(&json!({ "text": "   " }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_static_file_is_not_found() {
    let server = test_server("http://127.0.0.1:9");
    server
        .get("/static/does-not-exist.js")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
