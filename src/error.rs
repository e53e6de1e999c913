use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Database error")]
    DatabaseError(#[from] sqlx::error::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Bot challenge did not clear")]
    ChallengeTimeout,

    #[error("Site geo-blocked for this location")]
    GeoBlocked,

    #[error("Page yielded too little text")]
    MinimalContent,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[cfg(feature = "browser")]
    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Register unavailable: {0}")]
    RegisterUnavailable(String),
}

impl MonitorError {
    /// Short, length-capped description suitable for reports and notifications.
    pub fn describe(&self) -> String {
        crate::text::truncate_chars(&self.to_string(), crate::text::MAX_DIAGNOSTIC_CHARS)
    }
}
