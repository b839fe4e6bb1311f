//! HTTP error shaping (spec §7): every handler error becomes
//! `{error:{type,reason},status}` with a status code matching the error kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::Error;
use crate::response::shape_error;

pub struct RestError(pub Error);

impl From<Error> for RestError {
    fn from(err: Error) -> Self {
        RestError(err)
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let body = shape_error(status, self.0.kind().as_str(), &self.0.to_string());
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err: RestError = Error::IndexNotFound("products".into()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn scroll_expired_maps_to_410() {
        let err: RestError = Error::ScrollExpired("abc".into()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::GONE);
    }
}
