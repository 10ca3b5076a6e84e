use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants;
use crate::error::IngestError;
use crate::ingest::RecordSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Everything one chat session knows. Lives in memory only.
#[derive(Debug)]
pub struct Session {
    records: Option<Arc<RecordSet>>,
    turns: Vec<ConversationTurn>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            records: None,
            turns: vec![ConversationTurn::assistant(constants::GREETING)],
        }
    }

    pub fn data_loaded(&self) -> bool {
        self.records.is_some()
    }

    pub fn records(&self) -> Option<Arc<RecordSet>> {
        self.records.clone()
    }

    pub fn book_count(&self) -> usize {
        self.records.as_ref().map_or(0, |r| r.len())
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Apply the outcome of an upload and return the assistant turn it produced.
    ///
    /// A successful upload replaces any previous record set; a failed one
    /// leaves the session exactly as it was.
    pub fn apply_upload(&mut self, result: Result<RecordSet, IngestError>) -> ConversationTurn {
        let content = match result {
            Ok(set) => {
                info!(books = set.len(), "Reading list loaded");
                let content = constants::upload_succeeded(set.len());
                self.records = Some(Arc::new(set));
                content
            }
            Err(e) => {
                warn!("Failed to ingest upload: {}", e);
                constants::UPLOAD_FAILED.to_string()
            }
        };
        self.push(ConversationTurn::assistant(content))
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> ConversationTurn {
        self.push(ConversationTurn::user(content))
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> ConversationTurn {
        self.push(ConversationTurn::assistant(content))
    }

    fn push(&mut self, turn: ConversationTurn) -> ConversationTurn {
        self.turns.push(turn.clone());
        turn
    }
}
