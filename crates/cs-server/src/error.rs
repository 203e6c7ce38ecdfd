//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`cs_core::Error`] so that route handlers
//! can return `Result<T, AppError>` and use `?` on core results. Handlers do
//! not see the request id; the request-id layer stamps it into the
//! [`ErrorBody`] on the way out.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// JSON body of every error response. A copy rides in the response
/// extensions until the request-id layer fills in `request_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub request_id: Option<String>,
}

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: cs_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: cs_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn inner(&self) -> &cs_core::Error {
        &self.inner
    }
}

impl From<cs_core::Error> for AppError {
    fn from(e: cs_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let body = ErrorBody {
            error: self.inner.to_string(),
            code: self.inner.code(),
            request_id: self.request_id,
        };

        let mut response = (status, axum::Json(body.clone())).into_response();
        response.extensions_mut().insert(body);

        match &self.inner {
            cs_core::Error::RateLimited {
                retry_after_secs: Some(secs),
            } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(*secs));
            }
            cs_core::Error::Unauthorized {
                redirect: Some(location),
            } => {
                if let Ok(value) = HeaderValue::from_str(location) {
                    response.headers_mut().insert(header::LOCATION, value);
                }
            }
            _ => {}
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_produces_404() {
        let err = AppError::new(cs_core::Error::not_found("title", "abc"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_without_login_url_is_401() {
        let err = AppError::new(cs_core::Error::Unauthorized { redirect: None });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::LOCATION).is_none());
    }

    #[test]
    fn unauthorized_with_login_url_redirects() {
        let err = AppError::new(cs_core::Error::Unauthorized {
            redirect: Some("/login".into()),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = AppError::new(cs_core::Error::RateLimited {
            retry_after_secs: Some(30),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }

    #[test]
    fn upstream_status_passes_through() {
        let err = AppError::new(cs_core::Error::upstream(403, "forbidden"));
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn with_request_id() {
        let err = AppError::new(cs_core::Error::Internal("oops".into()))
            .with_request_id("req-123".into());
        assert_eq!(err.request_id.as_deref(), Some("req-123"));
    }

    #[test]
    fn body_is_kept_in_extensions() {
        let response = AppError::new(cs_core::Error::not_found("title", "9")).into_response();
        let body = response.extensions().get::<ErrorBody>().unwrap();
        assert_eq!(body.code, "not_found");
        assert_eq!(body.request_id, None);
    }
}
