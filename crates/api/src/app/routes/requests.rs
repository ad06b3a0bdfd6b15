use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use flowrack_auth::Permission;
use flowrack_core::RequestId;
use flowrack_infra::ServiceResult;
use flowrack_infra::store::CommittedTransition;

use crate::app::dto::{
    self, ApproveRequestBody, CancelRequestBody, CreateRequestBody, DeliveryBody, RequestQuery, ReturnBody,
    StatusUpdateBody, TransitionView,
};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_request).get(list_requests))
        .route("/statistics", get(statistics))
        .route("/number/:number", get(get_by_number))
        .route("/:id", get(get_request))
        .route("/:id/approve", post(approve_request))
        .route("/:id/cancel", post(cancel_request))
        .route("/:id/collect", post(begin_collection))
        .route("/:id/delivery", post(record_delivery))
        .route("/:id/return", post(record_return))
        .route("/:id/status", put(update_status))
        .route("/:id/availability", get(check_availability))
        .route("/:id/reconciliation", get(reconciliation))
}

const READ: [Permission; 2] = [Permission::REQUESTS_READ_OWN, Permission::REQUESTS_READ_ALL];

/// Publish the change and render the committed request.
fn transitioned(
    services: &AppServices,
    previous: &str,
    result: ServiceResult<CommittedTransition>,
) -> axum::response::Response {
    match result {
        Ok(committed) => {
            services.request_transitioned(&committed, Some(previous));
            (StatusCode::OK, Json(TransitionView::from(committed))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateRequestBody>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::REQUESTS_CREATE) {
        return resp;
    }
    let new = match body.into_new_request() {
        Ok(n) => n,
        Err(resp) => return resp,
    };
    match services.services.requests.create(principal.principal(), new).await {
        Ok(detail) => {
            services.request_created(&detail.request);
            (StatusCode::CREATED, Json(detail)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<RequestQuery>,
) -> axum::response::Response {
    if let Err(resp) = authz::require_any(&principal, &READ) {
        return resp;
    }
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match services.services.requests.list(principal.principal(), filter).await {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn statistics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require_any(&principal, &READ) {
        return resp;
    }
    match services.services.requests.statistics(principal.principal()).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_by_number(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(number): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require_any(&principal, &READ) {
        return resp;
    }
    match services.services.requests.get_by_number(principal.principal(), &number).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require_any(&principal, &READ) {
        return resp;
    }
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.services.requests.get(principal.principal(), id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn approve_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ApproveRequestBody>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::REQUESTS_FULFIL) {
        return resp;
    }
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .services
        .requests
        .approve(principal.principal(), id, &body.item_approvals)
        .await;
    transitioned(&services, "pending", result)
}

/// Owners may cancel their own; staff any.
pub async fn cancel_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<CancelRequestBody>>,
) -> axum::response::Response {
    if let Err(resp) = authz::require_any(&principal, &[Permission::REQUESTS_CANCEL_OWN, Permission::REQUESTS_FULFIL]) {
        return resp;
    }
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let reason = body.and_then(|Json(b)| b.reason);
    match services.services.requests.cancel(principal.principal(), id, reason).await {
        Ok(committed) => {
            services.request_transitioned(&committed, None);
            (StatusCode::OK, Json(TransitionView::from(committed))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn begin_collection(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::REQUESTS_FULFIL) {
        return resp;
    }
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services.services.requests.begin_collection(principal.principal(), id).await;
    transitioned(&services, "approved", result)
}

pub async fn record_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<DeliveryBody>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::REQUESTS_FULFIL) {
        return resp;
    }
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .services
        .requests
        .record_delivery(principal.principal(), id, &body.weights)
        .await;
    transitioned(&services, "collecting", result)
}

pub async fn record_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ReturnBody>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::REQUESTS_FULFIL) {
        return resp;
    }
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .services
        .requests
        .record_return(principal.principal(), id, &body.weights)
        .await;
    transitioned(&services, "delivered", result)
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdateBody>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::REQUESTS_FULFIL) {
        return resp;
    }
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let target = match body.status() {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match services
        .services
        .requests
        .update_status(principal.principal(), id, target, body.notes)
        .await
    {
        Ok(committed) => {
            services.request_transitioned(&committed, None);
            (StatusCode::OK, Json(TransitionView::from(committed))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn check_availability(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require_any(&principal, &READ) {
        return resp;
    }
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.services.requests.check_availability(principal.principal(), id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn reconciliation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require_any(&principal, &READ) {
        return resp;
    }
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.services.requests.reconciliation(principal.principal(), id).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
