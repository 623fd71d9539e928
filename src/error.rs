//! Error types for the assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the assistant.
///
/// Pending authentication is deliberately absent: it travels as
/// [`Credential::Pending`](crate::auth::Credential) and friends, never as an error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing identity configuration or a provider that refuses to start a device flow.
    #[error("Authentication configuration error: {0}")]
    AuthConfiguration(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    /// Non-success response from Microsoft Graph.
    #[error("Request failed with status {status}: {body}")]
    Request { status: u16, body: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Could not complete the request: tool loop exceeded {0} iterations")]
    LoopExceeded(usize),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a tool failure should be handed back to the model as a
    /// structured result instead of aborting the request.
    pub fn is_recoverable_in_loop(&self) -> bool {
        matches!(
            self,
            Error::Request { .. } | Error::Tool(_) | Error::Http(_) | Error::Json(_) | Error::Auth(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
