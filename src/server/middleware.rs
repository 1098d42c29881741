//! Request middleware: tenant scoping and request ids.

use axum::extract::FromRequestParts;
use axum::http::header::HeaderValue;
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use super::error::ErrorResponse;
use crate::model::Id;

/// Header that scopes a request to a tenant.
pub const TENANT_HEADER: &str = "Edgestore-Tenant";

/// The tenant a request is scoped to, taken from the `Edgestore-Tenant`
/// header. Requests without the header are rejected with 401.
pub struct Tenant(pub Id);

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = ErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty());

        match tenant {
            Some(tenant) => Ok(Tenant(Id::from(tenant))),
            None => Err(ErrorResponse::new(
                StatusCode::UNAUTHORIZED,
                "Invalid Tenant ID. Make sure to provide a valid Edgestore-Tenant header.",
            )),
        }
    }
}

/// Assigns a fresh UUID v4 as `x-request-id` to requests that carry none.
#[derive(Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}
