//! Client error types and user-facing message mapping.

use derive_more::{Display, Error};
use tracing::instrument;

/// Fallback message when nothing more specific is known.
pub const GENERIC_MESSAGE: &str = "Something went wrong. Please try again later.";

/// Classification of a failed client operation.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ClientErrorKind {
    /// No response reached the client.
    #[display("transport failure: {}", _0)]
    Transport(String),

    /// The backend rejected the request with a 4xx and (maybe) a reason.
    #[display("rejected with status {}", status)]
    Validation {
        /// HTTP status.
        status: u16,
        /// Human-readable reason from the response body.
        detail: Option<String>,
    },

    /// The backend rejected the credential (401).
    #[display("authentication rejected")]
    Unauthorized,

    /// No credential is held; the request was not sent.
    #[display("not signed in")]
    NotAuthenticated,

    /// The game moved on (404/409); acting on a stale snapshot.
    #[display("stale game state (status {})", status)]
    Stale {
        /// HTTP status.
        status: u16,
        /// Human-readable reason from the response body.
        detail: Option<String>,
    },

    /// The backend failed (5xx).
    #[display("server error {}", status)]
    Server {
        /// HTTP status.
        status: u16,
        /// Human-readable reason from the response body.
        detail: Option<String>,
    },

    /// The response body did not have the expected shape.
    #[display("unexpected response: {}", _0)]
    Decode(String),

    /// Rejected locally by the derived legality rules.
    #[display("illegal action: {}", _0)]
    IllegalAction(String),

    /// The session changed while this operation was in flight.
    #[display("session changed during the operation")]
    Superseded,
}

/// Client error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Client error: {} at {}:{}", kind, file, line)]
pub struct ClientError {
    /// What went wrong.
    pub kind: ClientErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ClientError {
    /// Creates a new client error with caller location tracking.
    #[track_caller]
    #[instrument(skip(kind))]
    pub fn new(kind: ClientErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Classifies a non-success HTTP status with its raw body.
    #[track_caller]
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = extract_detail(body);
        let kind = match status {
            401 => ClientErrorKind::Unauthorized,
            404 | 409 => ClientErrorKind::Stale { status, detail },
            400..=499 => ClientErrorKind::Validation { status, detail },
            _ => ClientErrorKind::Server { status, detail },
        };
        Self::new(kind)
    }

    /// Returns the error classification.
    pub fn kind(&self) -> &ClientErrorKind {
        &self.kind
    }

    /// True for a 401 from the backend.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.kind, ClientErrorKind::Unauthorized)
    }

    /// Message suitable for showing to the user.
    ///
    /// A reason sent by the backend is used verbatim; otherwise a generic
    /// message keyed by status, otherwise [`GENERIC_MESSAGE`].
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub fn user_message(&self) -> String {
        match &self.kind {
            ClientErrorKind::Validation { status, detail }
            | ClientErrorKind::Stale { status, detail }
            | ClientErrorKind::Server { status, detail } => detail
                .clone()
                .unwrap_or_else(|| status_message(*status).to_string()),
            ClientErrorKind::Transport(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            ClientErrorKind::Unauthorized => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ClientErrorKind::NotAuthenticated => "Please sign in first.".to_string(),
            ClientErrorKind::IllegalAction(reason) => reason.clone(),
            ClientErrorKind::Superseded => {
                "Your session changed in the meantime. Please try again.".to_string()
            }
            ClientErrorKind::Decode(_) => GENERIC_MESSAGE.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    #[track_caller]
    fn from(err: reqwest::Error) -> Self {
        Self::new(ClientErrorKind::Transport(err.to_string()))
    }
}

impl From<serde_json::Error> for ClientError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(ClientErrorKind::Decode(err.to_string()))
    }
}

/// Generic message for an HTTP status without a backend-supplied reason.
pub fn status_message(status: u16) -> &'static str {
    match status {
        400 => "The request was rejected. Please check your input.",
        401 => "Your session has expired. Please sign in again.",
        403 => "You are not allowed to do that.",
        404 => "That game no longer exists.",
        409 => "The game has changed. Refresh and try again.",
        429 => "Too many requests. Please slow down.",
        500..=599 => "The server is having trouble. Please try again later.",
        _ => GENERIC_MESSAGE,
    }
}

/// Pulls a human-readable reason out of an error body.
///
/// Looks at `detail`, `error`, `message` and `non_field_errors` first,
/// then at the first per-field validation message.
pub fn extract_detail(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = json.as_object()?;

    for key in ["detail", "error", "message", "non_field_errors"] {
        if let Some(text) = object.get(key).and_then(first_text) {
            return Some(text);
        }
    }
    object.values().find_map(first_text)
}

fn first_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        serde_json::Value::Array(items) => items.iter().find_map(first_text),
        _ => None,
    }
}
