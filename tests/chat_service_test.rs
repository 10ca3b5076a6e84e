use std::sync::Arc;
use std::time::Duration;

use bookbot::constants;
use bookbot::{ChatError, ChatService, Requester, RequesterConfig, Role};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_for(api_url: &str) -> ChatService {
    let config = RequesterConfig {
        api_url: api_url.to_string(),
        api_key: Some("test-key".to_string()),
        ..RequesterConfig::default()
    };
    ChatService::new(Requester::new(config).unwrap())
}

fn reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "content": [{ "type": "text", "text": text }] }))
}

#[test_log::test(tokio::test)]
async fn test_send_before_upload_gives_instructions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(reply("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let service = service_for(&server.uri());
    let exchange = service.send("  a mystery  ").await.unwrap();

    assert_eq!(exchange.user.content, "a mystery");
    assert_eq!(exchange.assistant.content, constants::NO_DATA_LOADED);
    assert!(!service.data_loaded().await);
}

#[test_log::test(tokio::test)]
async fn test_upload_then_send_appends_turns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(reply("Try The Left Hand of Darkness."))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server.uri());
    let (ok, turn) = service.upload_text("Title,Author\nDune,Herbert\nEmma,Austen\n").await;
    assert!(ok);
    assert_eq!(turn.content, constants::upload_succeeded(2));

    service.send("more like Dune").await.unwrap();

    let view = service.conversation().await;
    assert!(view.data_loaded);
    assert_eq!(view.book_count, 2);
    assert!(!view.busy);
    let contents: Vec<&str> = view.turns.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            constants::GREETING,
            constants::upload_succeeded(2).as_str(),
            "more like Dune",
            "Try The Left Hand of Darkness.",
        ]
    );
    assert_eq!(view.turns[2].role, Role::User);
}

#[test_log::test(tokio::test)]
async fn test_failed_request_keeps_records() {
    let service = service_for("http://127.0.0.1:9");
    service.upload_text("Title,Author\nDune,Herbert\n").await;

    let exchange = service.send("anything").await.unwrap();

    assert_eq!(exchange.assistant.content, constants::REQUEST_FALLBACK);
    let view = service.conversation().await;
    assert!(view.data_loaded);
    assert_eq!(view.book_count, 1);
}

#[test_log::test(tokio::test)]
async fn test_bad_upload_reports_and_stays_unloaded() {
    let service = service_for("http://127.0.0.1:9");
    let (ok, turn) = service.upload_bytes(&[0xff, 0xfe, 0x00]).await;

    assert!(!ok);
    assert_eq!(turn.content, constants::UPLOAD_FAILED);
    assert!(!service.data_loaded().await);
}

#[test_log::test(tokio::test)]
async fn test_second_upload_replaces_first() {
    let service = service_for("http://127.0.0.1:9");
    service.upload_text("Title,Author\nDune,Herbert\nEmma,Austen\n").await;
    service.upload_text("Title,Author\nUlysses,Joyce\n").await;

    assert_eq!(service.conversation().await.book_count, 1);
}

#[test_log::test(tokio::test)]
async fn test_empty_message_is_rejected() {
    let service = service_for("http://127.0.0.1:9");
    assert_eq!(service.send("   \n").await.unwrap_err(), ChatError::EmptyMessage);
    assert_eq!(service.conversation().await.turns.len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_second_send_while_busy_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(reply("slow answer").set_delay(Duration::from_millis(500)))
        .expect(1)
        .mount(&server)
        .await;

    let service = Arc::new(service_for(&server.uri()));
    service.upload_text("Title,Author\nDune,Herbert\n").await;

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.send("first").await })
    };
    // Let the first request reach the mock server.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(service.is_busy());
    assert_eq!(service.send("second").await.unwrap_err(), ChatError::Busy);

    let exchange = first.await.unwrap().unwrap();
    assert_eq!(exchange.assistant.content, "slow answer");
    assert!(!service.is_busy());
}

#[test_log::test(tokio::test)]
async fn test_subscribers_see_appended_turns() {
    let service = service_for("http://127.0.0.1:9");
    let mut rx = service.subscribe();

    service.upload_text("Title,Author\nDune,Herbert\n").await;
    service.send("hello").await.unwrap();

    assert_eq!(rx.recv().await.unwrap().content, constants::upload_succeeded(1));
    assert_eq!(rx.recv().await.unwrap().content, "hello");
    assert_eq!(rx.recv().await.unwrap().content, constants::REQUEST_FALLBACK);
}

#[test_log::test(tokio::test)]
async fn test_terminal_chat_uploads_and_quits() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("books.csv");
    std::fs::write(&csv, "Title,Author\nDune,Herbert\n").unwrap();

    let service = service_for("http://127.0.0.1:9");
    let script = format!("/upload {}\n\n/quit\nnever sent\n", csv.display());
    let mut output = Vec::new();
    bookbot::chat::run_terminal_chat(&service, script.as_bytes(), &mut output)
        .await
        .unwrap();

    let output = String::from_utf8(output).unwrap();
    assert!(output.starts_with("bookbot> Hi!"));
    assert!(output.contains("loaded 1 books"));
    assert!(!output.contains("never sent"));
    assert_eq!(service.conversation().await.turns.len(), 2);
}
