use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use flowrack_auth::Permission;
use flowrack_infra::reports::Period;

use crate::app::dto::{ActivityQuery, AnalyticsQuery};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/activity", get(activity))
        .route("/analytics", get(analytics))
}

/// Staff get the warehouse overview; everyone else their own summary.
pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let dashboards = &services.services.dashboard;
    if principal.principal().is_staff() {
        if let Err(resp) = authz::require(&principal, &Permission::DASHBOARD_SYSTEM) {
            return resp;
        }
        match dashboards.for_operator().await {
            Ok(view) => (StatusCode::OK, Json(view)).into_response(),
            Err(e) => errors::service_error_to_response(e),
        }
    } else {
        match dashboards.for_user(principal.principal()).await {
            Ok(view) => (StatusCode::OK, Json(view)).into_response(),
            Err(e) => errors::service_error_to_response(e),
        }
    }
}

pub async fn activity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ActivityQuery>,
) -> axum::response::Response {
    match services.services.dashboard.activity(principal.principal(), query.limit).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn analytics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<AnalyticsQuery>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::DASHBOARD_SYSTEM) {
        return resp;
    }
    let period = match query.period.as_deref() {
        Some(raw) => match Period::parse(raw) {
            Ok(p) => p,
            Err(e) => return errors::bad_request(e.to_string()),
        },
        None => Period::default(),
    };
    match services.services.dashboard.analytics(period).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
