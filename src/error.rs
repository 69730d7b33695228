use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Jenkins API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Expected a JSON response, got content type '{content_type}'")]
    NotJson { content_type: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DashboardError {
    /// Authentication and connectivity failures get troubleshooting hints in the CLI.
    pub fn is_auth_or_connection(&self) -> bool {
        match self {
            Self::Unauthorized(_) | Self::Forbidden(_) => true,
            Self::Network(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
