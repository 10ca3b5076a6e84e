// Chat service shared by the web UI and the terminal chat.
// Serializes uploads and sends against one session and allows a single
// outstanding recommendation request at a time.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::app_state::{ConversationTurn, Role, Session};
use crate::error::{ChatError, IngestError};
use crate::ingest::{self, RecordSet};
use crate::llm_interaction::Requester;

/// Snapshot of the conversation for clients that (re)connect.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub turns: Vec<ConversationTurn>,
    pub data_loaded: bool,
    pub book_count: usize,
    pub busy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub user: ConversationTurn,
    pub assistant: ConversationTurn,
}

pub struct ChatService {
    session: Mutex<Session>,
    requester: Requester,
    in_flight: AtomicBool,
    turns_tx: broadcast::Sender<ConversationTurn>,
}

// Clears the in-flight flag even if the request future is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChatService {
    pub fn new(requester: Requester) -> Self {
        let (turns_tx, _) = broadcast::channel(100);
        Self {
            session: Mutex::new(Session::new()),
            requester,
            in_flight: AtomicBool::new(false),
            turns_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationTurn> {
        self.turns_tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn conversation(&self) -> ConversationView {
        let session = self.session.lock().await;
        ConversationView {
            turns: session.turns().to_vec(),
            data_loaded: session.data_loaded(),
            book_count: session.book_count(),
            busy: self.is_busy(),
        }
    }

    pub async fn data_loaded(&self) -> bool {
        self.session.lock().await.data_loaded()
    }

    pub async fn upload_text(&self, text: &str) -> (bool, ConversationTurn) {
        self.apply_upload(ingest::ingest(text)).await
    }

    pub async fn upload_bytes(&self, bytes: &[u8]) -> (bool, ConversationTurn) {
        self.apply_upload(ingest::ingest_bytes(bytes)).await
    }

    pub async fn upload_file(&self, path: &Path) -> (bool, ConversationTurn) {
        info!("Loading reading list from {}", path.display());
        self.apply_upload(ingest::ingest_file(path)).await
    }

    async fn apply_upload(
        &self,
        result: Result<RecordSet, IngestError>,
    ) -> (bool, ConversationTurn) {
        let ok = result.is_ok();
        let turn = self.session.lock().await.apply_upload(result);
        self.publish(&turn);
        (ok, turn)
    }

    /// Record the user's message, ask for a recommendation and record the reply.
    pub async fn send(&self, input: &str) -> Result<Exchange, ChatError> {
        let message = input.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Rejecting message while a request is outstanding");
            return Err(ChatError::Busy);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let (user, records) = {
            let mut session = self.session.lock().await;
            (session.push_user(message), session.records())
        };
        self.publish(&user);

        let reply = self.requester.recommend(records.as_deref(), message).await;

        let assistant = self.session.lock().await.push_assistant(reply);
        self.publish(&assistant);

        Ok(Exchange { user, assistant })
    }

    fn publish(&self, turn: &ConversationTurn) {
        // No subscribers is fine.
        let _ = self.turns_tx.send(turn.clone());
    }
}

/// Line-oriented chat over any reader/writer pair.
///
/// `/upload <file>` loads a reading list, `/quit` ends the session, anything
/// else is sent as a message.
pub async fn run_terminal_chat<R, W>(service: &ChatService, input: R, mut output: W) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    for turn in service.conversation().await.turns {
        write_turn(&mut output, &turn).await?;
    }

    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if let Some(path) = line.strip_prefix("/upload") {
            let path = path.trim();
            if path.is_empty() {
                output.write_all(b"usage: /upload <file>\n").await?;
            } else {
                let (_, turn) = service.upload_file(Path::new(path)).await;
                write_turn(&mut output, &turn).await?;
            }
            output.flush().await?;
            continue;
        }

        match service.send(line).await {
            Ok(exchange) => write_turn(&mut output, &exchange.assistant).await?,
            Err(ChatError::EmptyMessage) => {}
            Err(e) => output.write_all(format!("{}\n", e).as_bytes()).await?,
        }
        output.flush().await?;
    }
    info!("Chat session finished.");
    Ok(())
}

async fn write_turn<W: AsyncWrite + Unpin>(output: &mut W, turn: &ConversationTurn) -> Result<()> {
    let label = match turn.role {
        Role::User => "you",
        Role::Assistant => "bookbot",
    };
    output
        .write_all(format!("{}> {}\n", label, turn.content).as_bytes())
        .await?;
    Ok(())
}
