use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("missing configuration: {0}")]
    Configuration(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("{service} error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BridgeError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MalformedInput(_) => StatusCode::BAD_REQUEST,
            Self::Download(_) | Self::Upstream { .. } | Self::Http(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
