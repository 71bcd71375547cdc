use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("DNS resolution error: {0}")]
    Dns(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Feature extraction error: {0}")]
    FeatureExtraction(String),

    #[error("Model inference error: {0}")]
    ModelInference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Batch cancelled after dispatching {dispatched} of {total} URLs")]
    Cancelled { dispatched: usize, total: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<hickory_resolver::error::ResolveError> for AppError {
    fn from(err: hickory_resolver::error::ResolveError) -> Self {
        AppError::Dns(err.to_string())
    }
}

impl From<tokio_rustls::rustls::Error> for AppError {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        AppError::Tls(err.to_string())
    }
}

// Helper function for creating validation errors
pub fn validation_error(msg: &str) -> AppError {
    AppError::InvalidInput(msg.to_string())
}

// Helper function for creating internal errors
pub fn internal_error(msg: &str) -> AppError {
    AppError::Internal(msg.to_string())
}
