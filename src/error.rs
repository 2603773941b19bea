use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    /// Store failures collapse into this; the cause is logged, not returned.
    #[error("Could not fetch data")]
    FetchFailed,

    #[error("Hourly usage requires a `from` date")]
    MissingFrom,

    #[error("No value bound for parameter `{0}`")]
    UnboundParameter(String),

    #[error("Fixture error: {0}")]
    Fixture(#[from] serde_json::Error),
}

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Query(#[from] QueryError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Query(err) => {
                tracing::error!(error = %err, "Report request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "fetch_failed",
                    QueryError::FetchFailed.to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response()
    }
}
