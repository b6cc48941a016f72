use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{method} {url} failed after {attempts} attempts (last error: {last_error})")]
    PermanentFailure {
        method: String,
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Unexpected API response: {0}")]
    InvalidResponse(String),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    /// True when a request exhausted its retry budget.
    pub fn is_permanent_failure(&self) -> bool {
        matches!(self, AppError::PermanentFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
