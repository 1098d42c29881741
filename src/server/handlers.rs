//! REST handlers.

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use super::error::ErrorResponse;
use super::middleware::Tenant;
use super::{AppState, API_PREFIX};
use crate::association::{
    association_id, DeleteAssociation, InsertAssociation, UpdateAssociation,
};
use crate::entity::{DeleteEntity, InsertEntity, UpdateEntity};
use crate::errors::Error;
use crate::model::Id;

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Edgestore: Distributed Graph Data Store"
    }))
}

pub async fn not_found() -> ErrorResponse {
    ErrorResponse::new(StatusCode::NOT_FOUND, "route not found")
}

fn abort(context: &'static str, err: Error) -> Response {
    error!(error = %err, "{context}");
    ErrorResponse::from_error(&err).into_response()
}

fn invalid_body(context: &'static str, rejection: JsonRejection) -> Response {
    error!(error = %rejection, "{context}");
    ErrorResponse::new(StatusCode::BAD_REQUEST, rejection.body_text()).into_response()
}

fn accepted(location: Option<String>) -> Response {
    match location {
        Some(location) => {
            (StatusCode::ACCEPTED, [(header::LOCATION, location)]).into_response()
        }
        None => StatusCode::ACCEPTED.into_response(),
    }
}

// ============================================================================
// Entities
// ============================================================================

pub async fn get_entity(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match state.entities.get(&Id::from(id.as_str()), &tenant).await {
        Ok(entity) => {
            if params.contains_key("data") {
                Json(entity.data).into_response()
            } else {
                Json(entity).into_response()
            }
        }
        Err(err) => abort("get entity failed", err),
    }
}

pub async fn create_entity(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    form: Result<Json<InsertEntity>, JsonRejection>,
) -> Response {
    let Json(mut form) = match form {
        Ok(form) => form,
        Err(rejection) => return invalid_body("create entity failed", rejection),
    };
    form.model.tenant_id = tenant;

    let location = format!("{API_PREFIX}/entities/{}", form.model.id);
    match state.entities.create(form).await {
        Ok(()) => accepted(Some(location)),
        Err(err) => abort("create entity failed", err),
    }
}

pub async fn update_entity(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
    form: Result<Json<UpdateEntity>, JsonRejection>,
) -> Response {
    let Json(mut form) = match form {
        Ok(form) => form,
        Err(rejection) => return invalid_body("update entity failed", rejection),
    };
    form.model.tenant_id = tenant;
    form.model.id = Id::from(id.as_str());

    match state.entities.update(form).await {
        Ok(()) => accepted(None),
        Err(err) => abort("update entity failed", err),
    }
}

pub async fn delete_entity(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
) -> Response {
    let form = DeleteEntity {
        model: crate::model::CommandModel::new(id, tenant),
    };

    match state.entities.delete(form).await {
        Ok(()) => accepted(None),
        Err(err) => abort("delete entity failed", err),
    }
}

// ============================================================================
// Associations
// ============================================================================

pub async fn get_association(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
) -> Response {
    match state
        .associations
        .get(&Id::from(id.as_str()), &tenant)
        .await
    {
        Ok(assoc) => Json(assoc).into_response(),
        Err(err) => abort("get association failed", err),
    }
}

pub async fn create_association(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    form: Result<Json<InsertAssociation>, JsonRejection>,
) -> Response {
    let Json(mut form) = match form {
        Ok(form) => form,
        Err(rejection) => return invalid_body("create association failed", rejection),
    };
    form.model.tenant_id = tenant;

    let id = association_id(&form.in_id, &form.atype, &form.out_id);
    let location = format!("{API_PREFIX}/associations/{id}");
    match state.associations.create(form).await {
        Ok(()) => accepted(Some(location)),
        Err(err) => abort("create association failed", err),
    }
}

pub async fn update_association(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
    form: Result<Json<UpdateAssociation>, JsonRejection>,
) -> Response {
    let Json(mut form) = match form {
        Ok(form) => form,
        Err(rejection) => return invalid_body("update association failed", rejection),
    };
    form.model.tenant_id = tenant;
    form.model.id = Id::from(id.as_str());

    match state.associations.update(form).await {
        Ok(()) => accepted(None),
        Err(err) => abort("update association failed", err),
    }
}

pub async fn delete_association(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
) -> Response {
    let form = DeleteAssociation {
        model: crate::model::CommandModel::new(id, tenant),
    };

    match state.associations.delete(form).await {
        Ok(()) => accepted(None),
        Err(err) => abort("delete association failed", err),
    }
}
