use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::constants;
use crate::error::RequestError;
use crate::ingest::{Record, RecordSet};

const MESSAGES_PATH: &str = "/v1/messages";

/// Endpoint and model settings for the recommendation call.
#[derive(Debug, Clone)]
pub struct RequesterConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub anthropic_version: String,
    pub model: String,
    pub max_tokens: u32,
    pub record_limit: usize,
    /// `None` keeps the HTTP client's default.
    pub timeout: Option<Duration>,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            api_url: constants::API_URL.clone(),
            api_key: Some(constants::API_KEY.clone()).filter(|k| !k.is_empty()),
            anthropic_version: constants::ANTHROPIC_VERSION.clone(),
            model: constants::MODEL.clone(),
            max_tokens: *constants::MAX_TOKENS,
            record_limit: *constants::RECORD_LIMIT,
            timeout: None,
        }
    }
}

// Structures matching the messages endpoint
#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [PromptMessage<'a>; 1],
}

#[derive(Serialize)]
struct PromptMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize, Debug)]
struct ContentBlock {
    text: Option<String>,
}

/// Build the recommendation prompt from the first `limit` records and the user's request.
pub fn build_prompt(records: &[Record], limit: usize, request: &str) -> String {
    let shown = &records[..records.len().min(limit)];
    // A slice of string maps cannot fail to serialize.
    let reading_data = serde_json::to_string_pretty(shown).unwrap_or_else(|_| "[]".to_string());

    format!(
        "You are a book recommendation assistant. Based on this user's reading history and request, provide 2-3 specific book recommendations.\n\
        \n\
        User's Reading Data: {}\n\
        \n\
        User Request: \"{}\"\n\
        \n\
        Provide recommendations with:\n\
        1. Title and Author\n\
        2. Why it matches their taste\n\
        3. Connection to their reading history\n\
        \n\
        Keep it concise and compelling.",
        reading_data, request
    )
}

/// Turns a reading list plus a request into recommendation text.
#[derive(Debug, Clone)]
pub struct Requester {
    client: Client,
    config: RequesterConfig,
}

impl Requester {
    pub fn new(config: RequesterConfig) -> Result<Self, RequestError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    pub fn config(&self) -> &RequesterConfig {
        &self.config
    }

    /// Always yields text for the conversation: the generated recommendation,
    /// the upload reminder when nothing is loaded, or the fallback on failure.
    #[instrument(skip(self, records), fields(loaded = records.is_some()))]
    pub async fn recommend(&self, records: Option<&RecordSet>, request: &str) -> String {
        let Some(records) = records else {
            info!("No reading list loaded, skipping external call");
            return constants::NO_DATA_LOADED.to_string();
        };

        let prompt = build_prompt(records.records(), self.config.record_limit, request);
        match self.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Recommendation request failed: {}", e);
                constants::REQUEST_FALLBACK.to_string()
            }
        }
    }

    /// Send a single prompt and return the first generated text segment verbatim.
    pub async fn complete(&self, prompt: &str) -> Result<String, RequestError> {
        let endpoint = format!(
            "{}{}",
            self.config.api_url.trim_end_matches('/'),
            MESSAGES_PATH
        );
        debug!(%endpoint, prompt_len = prompt.len(), "Sending recommendation request");

        let payload = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: [PromptMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self
            .client
            .post(&endpoint)
            .header("anthropic-version", &self.config.anthropic_version)
            .json(&payload);
        if let Some(key) = &self.config.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Messages API request failed");
            return Err(RequestError::Status { status, body });
        }

        let body = response.json::<MessagesResponse>().await?;
        body.content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .ok_or(RequestError::EmptyResponse)
    }
}
