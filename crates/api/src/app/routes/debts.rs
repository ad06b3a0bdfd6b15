use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use flowrack_auth::Permission;
use flowrack_core::DebtId;
use flowrack_debts::NewDebt;

use crate::app::dto::{self, DebtQuery, ResolveDebtBody};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_debt).get(list_debts))
        .route("/statistics", get(statistics))
        .route("/:id", get(get_debt))
        .route("/:id/resolve", post(resolve_debt))
}

const READ: [Permission; 2] = [Permission::DEBTS_READ_OWN, Permission::DEBTS_READ_ALL];

pub async fn create_debt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewDebt>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::DEBTS_MANAGE) {
        return resp;
    }
    match services.services.debts.create(principal.principal(), body).await {
        Ok(debt) => {
            services.debt_created(&debt);
            (StatusCode::CREATED, Json(debt)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_debts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<DebtQuery>,
) -> axum::response::Response {
    if let Err(resp) = authz::require_any(&principal, &READ) {
        return resp;
    }
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match services.services.debts.list(principal.principal(), filter).await {
        Ok(debts) => (StatusCode::OK, Json(debts)).into_response(),
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
    match services.services.debts.statistics(principal.principal()).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_debt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require_any(&principal, &READ) {
        return resp;
    }
    let id: DebtId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.services.debts.get(principal.principal(), id).await {
        Ok(debt) => (StatusCode::OK, Json(debt)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Settle a pending debt as paid, waived or disputed.
pub async fn resolve_debt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ResolveDebtBody>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::DEBTS_MANAGE) {
        return resp;
    }
    let id: DebtId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let resolution = match body.into_resolution() {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match services.services.debts.resolve(principal.principal(), id, resolution).await {
        Ok(debt) => (StatusCode::OK, Json(debt)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
