/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the moderation
/// pipeline can handle failures consistently (fail policy vs. local recovery).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Unique-constraint violation on create; recoverable via rollback + re-fetch.
    #[error("storage conflict: {0}")]
    Conflict(String),

    #[error("ai http error: {0}")]
    AiHttp(String),

    #[error("ai response format error: {0}")]
    AiResponseFormat(String),

    #[error("telegram error: {0}")]
    Telegram(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// AI transport and format failures are handled by the same fail policy.
    pub fn is_ai_failure(&self) -> bool {
        matches!(self, Error::AiHttp(_) | Error::AiResponseFormat(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
