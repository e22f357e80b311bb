use thiserror::Error;

/// Why a single candidate model failed to produce a completion.
///
/// Each variant is recovered locally by the dispatcher, which moves on to
/// the next candidate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CandidateError {
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("No response text")]
    EmptyText,

    #[error("timed out after {0}ms")]
    Timeout(u64),
}

/// A stored or user-supplied label that names no known variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownLabel {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Errors surfaced by the chat pipeline in `App`.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chat session not found: {0}")]
    SessionNotFound(String),

    #[error("message is empty")]
    EmptyMessage,
}
