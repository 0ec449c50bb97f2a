//! Translation of operation errors into HTTP responses

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use natours_auth::{AuthError, ErrorKind};
use serde_json::json;
use tracing::error;

/// Error returned by handlers and middleware
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    BadRequest {
        message: String,
        field: Option<String>,
    },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(err) => status_for(err.kind()),
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Auth(err) => err.kind().code(),
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest { .. } => "bad_request",
        }
    }

    fn field(&self) -> Option<&str> {
        match self {
            ApiError::Auth(err) => err.field(),
            ApiError::BadRequest { field, .. } => field.as_deref(),
            ApiError::NotFound(_) => None,
        }
    }
}

/// Status code for each error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::InvalidOrExpired | ErrorKind::NoOpChange => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::InvalidCredentials | ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::DependencyFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = if status.is_server_error() {
            error!(error = %self, "Request failed");
            json!({
                "status": "error",
                "error": self.code(),
                "message": "Something went very wrong!",
            })
        } else {
            let mut body = json!({
                "status": "fail",
                "error": self.code(),
                "message": self.to_string(),
            });
            if let Some(field) = self.field() {
                body["field"] = json!(field);
            }
            body
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest {
            message: rejection.body_text(),
            field: None,
        }
    }
}

/// JSON body extractor whose rejections use the API error shape
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
