use std::convert::Infallible;
use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Request, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    serve, Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::Deserialize;
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::chat::ChatService;
use crate::error::ChatError;

// Envelope for everything pushed over the WebSocket
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct BroadcastMessage {
    message_type: String,
    payload: serde_json::Value,
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    chat: Arc<ChatService>,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>, templates_dir: &str) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir.to_string())),
            chat,
        }
    }
}

fn create_minijinja_env(templates_dir: String) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, Html<String>> {
    let view = state.chat.conversation().await;
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                tmpl.render(minijinja::context! {
                    title => "BookBot",
                    turns => view.turns,
                    data_loaded => view.data_loaded,
                    book_count => view.book_count,
                })
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            Html(format!("Internal Server Error: {}", e))
        })
}

async fn conversation_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.chat.conversation().await)
}

async fn upload_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let (ok, turn) = state.chat.upload_bytes(&body).await;
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    let view = state.chat.conversation().await;
    (
        status,
        Json(json!({
            "turn": turn,
            "data_loaded": view.data_loaded,
            "book_count": view.book_count,
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct SendRequest {
    text: String,
}

async fn message_handler(State(state): State<AppState>, Json(req): Json<SendRequest>) -> Response {
    match state.chat.send(&req.text).await {
        Ok(exchange) => Json(exchange).into_response(),
        Err(e) => {
            let status = match e {
                ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
                ChatError::Busy => StatusCode::CONFLICT,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// Pushes every appended turn to the client; text frames from the client are sent as chat messages.
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let mut turns_rx = state.chat.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let view = state.chat.conversation().await;
    let welcome = BroadcastMessage {
        message_type: "Conversation".to_string(),
        payload: json!(view),
    };
    if let Ok(json_msg) = serde_json::to_string(&welcome) {
        if sender.send(Message::Text(json_msg)).await.is_err() {
            warn!("Failed to send conversation snapshot to new WebSocket client");
            return;
        }
    }

    loop {
        tokio::select! {
            Ok(turn) = turns_rx.recv() => {
                let msg = BroadcastMessage {
                    message_type: "Turn".to_string(),
                    payload: json!(turn),
                };
                match serde_json::to_string(&msg) {
                    Ok(json_msg) => {
                        if sender.send(Message::Text(json_msg)).await.is_err() {
                            warn!("WebSocket client disconnected or send error. Closing connection.");
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize turn: {}", e),
                }
            }

            Some(Ok(msg)) = receiver.next() => {
                match msg {
                    Message::Text(text) => {
                        let chat = state.chat.clone();
                        // Replies arrive through the turn subscription.
                        tokio::spawn(async move {
                            if let Err(e) = chat.send(&text).await {
                                warn!("Message from WebSocket client rejected: {}", e);
                            }
                        });
                    }
                    Message::Binary(_) => warn!("Received unexpected binary message from client"),
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => {
                        info!("Client requested WebSocket close");
                        break;
                    }
                }
            }

            else => {
                info!("WebSocket client disconnected");
                break;
            }
        }
    }
    info!("WebSocket connection closed");
}

pub fn build_router(state: AppState) -> Router {
    let static_files_service = ServeDir::new("static").not_found_service(tower::service_fn(
        |_: Request| async { Ok::<_, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response()) },
    ));

    Router::new()
        .route("/", get(index_handler))
        .route("/api/conversation", get(conversation_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/messages", post(message_handler))
        .route("/ws", get(ws_handler))
        .nest_service("/static", static_files_service)
        // Reading lists have no size cap.
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(port: u16, chat: Arc<ChatService>) -> Result<()> {
    let app = build_router(AppState::new(chat, "templates"));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
