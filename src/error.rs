use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum StoryError {
    /// The completions backend refused the request for lack of credits (HTTP 402).
    InsufficientCredits,
    /// The completions or session endpoint returned a non-success status.
    RequestFailed { status: u16, message: String },
    /// Speech synthesis failed; the affected line is skipped, not the turn.
    TtsFailed(String),
    /// The auto-user-message generator failed or produced nothing usable.
    GenerationFailed(String),
    /// The backend returned a shape the parser cannot use.
    MalformedResponse(String),
    /// An operation that needs a loaded session was invoked without one.
    SessionNotLoaded,
    Http(reqwest::Error),
    Json(serde_json::Error),
    Io(std::io::Error),
    Other(String),
}

impl Display for StoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoryError::InsufficientCredits => write!(f, "insufficient credits"),
            StoryError::RequestFailed { status, message } => {
                write!(f, "request failed (status {}): {}", status, message)
            }
            StoryError::TtsFailed(msg) => write!(f, "speech synthesis failed: {}", msg),
            StoryError::GenerationFailed(msg) => write!(f, "message generation failed: {}", msg),
            StoryError::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
            StoryError::SessionNotLoaded => write!(f, "no session loaded"),
            StoryError::Http(e) => write!(f, "{}", e),
            StoryError::Json(e) => write!(f, "{}", e),
            StoryError::Io(e) => write!(f, "{}", e),
            StoryError::Other(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for StoryError {}

impl From<reqwest::Error> for StoryError {
    fn from(value: reqwest::Error) -> Self {
        StoryError::Http(value)
    }
}

impl From<serde_json::Error> for StoryError {
    fn from(value: serde_json::Error) -> Self {
        StoryError::Json(value)
    }
}

impl From<std::io::Error> for StoryError {
    fn from(value: std::io::Error) -> Self {
        StoryError::Io(value)
    }
}

impl From<String> for StoryError {
    fn from(value: String) -> Self {
        StoryError::Other(value)
    }
}

impl From<&str> for StoryError {
    fn from(value: &str) -> Self {
        StoryError::Other(value.to_string())
    }
}
