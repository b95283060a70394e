use std::path::PathBuf;
use hyper::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// 400 from the host manager
    #[error("{message}")]
    InvalidInput { message: String, request_id: Option<String> },

    /// 404 from the host manager
    #[error("{message}")]
    NotFound { message: String, request_id: Option<String> },

    /// 500 from the host manager
    #[error("{message}")]
    Internal { message: String, request_id: Option<String> },

    #[error("unexpected status {status}: {message}")]
    Status {
        status: StatusCode,
        message: String,
        request_id: Option<String>,
    },

    #[error("failed to connect to {}: {source}", .path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Http(#[from] hyper::Error),

    #[error(transparent)]
    Request(#[from] hyper::http::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Query(#[from] serde_urlencoded::ser::Error),
}

impl Error {
    pub(crate) fn from_response(status: StatusCode, request_id: Option<String>, message: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Self::InvalidInput { message, request_id },
            StatusCode::NOT_FOUND => Self::NotFound { message, request_id },
            StatusCode::INTERNAL_SERVER_ERROR => Self::Internal { message, request_id },
            status => Self::Status { status, message, request_id },
        }
    }

    /// Request id reported by the host manager, if the error came from a response
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::InvalidInput { request_id, .. }
            | Self::NotFound { request_id, .. }
            | Self::Internal { request_id, .. }
            | Self::Status { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }
}
