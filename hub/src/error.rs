use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for API responses.
///
/// Every variant carries a short reason meant for the caller; internal error
/// text stays in the server log.
#[derive(Debug)]
pub enum ApiError {
    /// Nothing was ever computed for the request.
    NotFound(String),
    /// Data exists but is stale, corrupted, absent or the store is unreachable.
    /// Callers are expected to retry later.
    ServiceUnavailable(String),
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
        }
    }

    fn detail(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::ServiceUnavailable(msg)
            | Self::BadRequest(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.detail())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.kind(), "detail": self.detail() });
        (self.status(), axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn into_response_carries_kind_and_detail() {
        let resp = ApiError::ServiceUnavailable("Not initialized yet.".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["error"], "service_unavailable");
        assert_eq!(v["detail"], "Not initialized yet.");
    }

    #[test]
    fn display_matches_kind_prefix() {
        let e = ApiError::NotFound("No history data for BTC/USDT".to_string());
        assert_eq!(e.to_string(), "not_found: No history data for BTC/USDT");
    }
}
