// Maps the domain error taxonomy onto HTTP status codes

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use odyssey_common::OdysseyError;
use serde::de::DeserializeOwned;
use tracing::error;

#[derive(Debug)]
pub struct ApiError(pub OdysseyError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<OdysseyError> for ApiError {
    fn from(e: OdysseyError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(OdysseyError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            OdysseyError::NotFound(_) => StatusCode::NOT_FOUND,
            OdysseyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            OdysseyError::Forbidden(_) => StatusCode::FORBIDDEN,
            OdysseyError::Validation(_) => StatusCode::BAD_REQUEST,
            OdysseyError::Conflict(_) => StatusCode::CONFLICT,
            OdysseyError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let message = match &self.0 {
            OdysseyError::NotFound(msg)
            | OdysseyError::Unauthorized(msg)
            | OdysseyError::Forbidden(msg)
            | OdysseyError::Validation(msg)
            | OdysseyError::Conflict(msg)
            | OdysseyError::Unavailable(msg) => msg.clone(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// JSON body extractor whose rejections carry the `{"error": msg}` body
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
