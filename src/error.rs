//! Defines the failures that end an invocation. Notifications that
//! are simply out of scope are not errors; see `app::Outcome`.

/// An invocation failure.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// A required setting is missing or empty. Reported before any
    /// notification is handled.
    #[error("Missing {field}")]
    Configuration { field: &'static str },

    /// The environment couldn't be read as settings at all.
    #[error("Invalid settings: {0}")]
    Settings(#[from] envy::Error),

    /// The notification can't be processed: its body isn't JSON, or
    /// it lacks a source identifier.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// The export service rejected the request, or couldn't be
    /// reached. The service error is kept as-is.
    #[error(transparent)]
    Submission(anyhow::Error),
}

impl From<serde_json::Error> for TriggerError {
    fn from(e: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match e.classify() {
            Category::Data => {
                TriggerError::MalformedMessage(format!("body is not a valid notification ({})", e))
            }
            Category::Syntax | Category::Eof | Category::Io => {
                TriggerError::MalformedMessage(format!("body is not valid JSON ({})", e))
            }
        }
    }
}
