//! Error-to-HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::errors::{Error, Kind};

/// JSON error body: `{"code": ..., "message": ...}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
        }
    }

    /// Map a domain error to its status code and deepest message.
    pub fn from_error(err: &Error) -> Self {
        let code = match err.kind() {
            Kind::Duplicate | Kind::Invalid => StatusCode::BAD_REQUEST,
            Kind::NotFound => StatusCode::NOT_FOUND,
            Kind::Permission => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self::new(code, err.deepest_message())
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_the_documented_status_codes() {
        for (kind, code) in [
            (Kind::Duplicate, 400),
            (Kind::Invalid, 400),
            (Kind::NotFound, 404),
            (Kind::Permission, 401),
            (Kind::Internal, 500),
            (Kind::Io, 500),
            (Kind::Transient, 500),
        ] {
            let res = ErrorResponse::from_error(&Error::new(kind).msg("boom"));
            assert_eq!(res.code, code, "{kind:?}");
            assert_eq!(res.message, "boom");
        }
    }

    #[test]
    fn message_is_the_deepest_in_the_chain() {
        let err = Error::new(Kind::Other).op("api/get").wrap(
            Error::new(Kind::NotFound)
                .op("service.get")
                .msg("entity edgestore:t1:u1 not found in cache"),
        );
        let res = ErrorResponse::from_error(&err);
        assert_eq!(res.code, 404);
        assert_eq!(res.message, "entity edgestore:t1:u1 not found in cache");
    }
}
