use thiserror::Error;

/// Why an uploaded reading list could not be turned into a record set.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload is not valid UTF-8 text: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

/// Failure of the outbound text-generation call.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("response has no text content")]
    EmptyResponse,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("a recommendation request is already in progress")]
    Busy,
}
