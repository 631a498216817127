use thiserror::Error;

/// Unified error type for proxyhunter
#[derive(Error, Debug)]
pub enum HunterError {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    // Input errors
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // Network errors
    #[error("Proxy connection failed: {0}")]
    ProxyConnectionFailed(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Operation timed out")]
    Timeout,

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Store errors
    #[error("Store error: {0}")]
    Store(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Batch errors
    #[error("No candidate could be processed ({candidates} submitted)")]
    NothingProcessed { candidates: usize },

    // Rotation errors
    #[error("No proxies available")]
    NoProxiesAvailable,
}

/// Result type alias for proxyhunter operations
pub type Result<T> = std::result::Result<T, HunterError>;

impl HunterError {
    /// Whether the error came from a per-call deadline
    pub fn is_timeout(&self) -> bool {
        match self {
            HunterError::Timeout => true,
            HunterError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

// Convert from hyper errors
impl From<hyper::Error> for HunterError {
    fn from(err: hyper::Error) -> Self {
        HunterError::Http(err.to_string())
    }
}

impl From<http::Error> for HunterError {
    fn from(err: http::Error) -> Self {
        HunterError::Http(err.to_string())
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for HunterError {
    fn from(err: url::ParseError) -> Self {
        HunterError::InvalidUrl(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for HunterError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        HunterError::Timeout
    }
}
