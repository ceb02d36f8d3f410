use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl InfraError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }

    /// A stored record that was read but no longer decodes. Writers may replace it; any other
    /// read failure means the current record is unknown.
    pub fn is_corrupt_record(&self) -> bool {
        matches!(self, Self::Json(_))
    }
}
