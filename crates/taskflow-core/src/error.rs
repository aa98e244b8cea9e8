use crate::session::StoreError;

/// Failures a handler can hit while serving one interaction.
///
/// The first four are user-facing and resolve to a notice or a re-shown
/// prompt. The rest propagate out of the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("not logged in")]
    AuthRequired,

    #[error("remote call failed with status {status}")]
    Remote { status: u16 },

    #[error("invalid input: {hint}")]
    InvalidInput { hint: String },

    #[error("not found")]
    NotFound,

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("session store error: {0}")]
    Session(#[from] StoreError),

    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BotError {
    pub fn invalid(hint: impl Into<String>) -> Self {
        BotError::InvalidInput { hint: hint.into() }
    }

    /// Whether the error is answered in-chat instead of bubbling up.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            BotError::AuthRequired
                | BotError::Remote { .. }
                | BotError::InvalidInput { .. }
                | BotError::NotFound
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            BotError::AuthRequired => "⚠️ You are not logged in. Use /login".to_string(),
            BotError::Remote { .. } => "❌ Request failed, try again later.".to_string(),
            BotError::InvalidInput { hint } => format!("⚠️ {hint}"),
            BotError::NotFound => "❌ Not found.".to_string(),
            BotError::Transport(_) | BotError::Session(_) | BotError::Decode(_) => {
                "❌ Something went wrong.".to_string()
            }
        }
    }
}

pub type BotResult<T> = Result<T, BotError>;
