use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the sync service. Any non-2xx response is a
/// failure regardless of what the body claims.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
    },

    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    /// Session errors fail closed; callers use this to distinguish a
    /// rejected credential from a transient fault.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ApiError::Status {
                status: StatusCode::UNAUTHORIZED,
                ..
            }
        )
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
