pub mod app_state;
pub mod chat;
pub mod constants;
pub mod error;
pub mod ingest;
pub mod llm_interaction;
pub mod web_server;

pub use app_state::{ConversationTurn, Role, Session};
pub use chat::ChatService;
pub use error::{ChatError, IngestError, RequestError};
pub use ingest::{ingest, Record, RecordSet};
pub use llm_interaction::{Requester, RequesterConfig};
