use reqwest::StatusCode;
use reqwest::header::InvalidHeaderValue;
use thiserror::Error;

use crate::models::Dataset;

#[derive(Debug, Error)]
pub enum DwError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
    #[error("api returned {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("still throttled after {attempts} attempts")]
    Throttled { attempts: u32 },
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("bad format: {0}")]
    BadFormat(String),
    #[error("dataset {owner}/{dataset_id} still ingesting after {attempts} attempts")]
    NotYetReady {
        owner: String,
        dataset_id: String,
        attempts: u32,
        snapshot: Box<Dataset>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

impl DwError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DwError::Api { status, .. } => Some(classify_api_status(*status)),
            DwError::Throttled { .. } => Some(ApiErrorClass::RateLimit),
            DwError::NotYetReady { .. } => Some(ApiErrorClass::Transient),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }

    /// Status a hosting framework should answer with for this error.
    pub fn http_status(&self) -> StatusCode {
        match self {
            DwError::Api { status, .. } => *status,
            DwError::NotFound(_) => StatusCode::NOT_FOUND,
            DwError::Conflict(_) => StatusCode::CONFLICT,
            DwError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            DwError::NotYetReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DwError::Unsupported(_) | DwError::InvalidPath(_) | DwError::BadFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            DwError::Request(_) | DwError::Url(_) | DwError::Header(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}
