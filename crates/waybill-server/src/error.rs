use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use waybill_core::error::WaybillError;

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<WaybillError>() {
            Some(e) => match e {
                WaybillError::ActionNotFound(_) => StatusCode::NOT_FOUND,
                WaybillError::InvalidTransition { .. } | WaybillError::ActionBusy(_) => {
                    StatusCode::CONFLICT
                }
                WaybillError::LaneClosed => StatusCode::SERVICE_UNAVAILABLE,
                WaybillError::NotInitialized | WaybillError::Config(_) => StatusCode::BAD_REQUEST,
                WaybillError::Backend(_) => StatusCode::BAD_GATEWAY,
                WaybillError::Store(_)
                | WaybillError::SchemaVersion { .. }
                | WaybillError::Io(_)
                | WaybillError::Yaml(_)
                | WaybillError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
