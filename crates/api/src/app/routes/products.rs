use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use flowrack_auth::Permission;
use flowrack_core::{Page, ProductId};
use flowrack_infra::services::ledger::HISTORY_DEFAULT_LIMIT;
use flowrack_products::{NewProduct, ProductUpdate};

use crate::app::dto::{
    self, AdjustStockRequest, AdjustmentView, AvailabilityQuery, LowStockQuery, PageQuery, ProductQuery, ProductView,
};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/categories", get(categories))
        .route("/low-stock", get(low_stock))
        .route("/:id", get(get_product).put(update_product).delete(deactivate_product))
        .route("/:id/adjust", post(adjust_stock))
        .route("/:id/transactions", get(stock_history))
        .route("/:id/availability", get(availability))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewProduct>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::CATALOG_WRITE) {
        return resp;
    }
    match services.services.catalog.create(body).await {
        Ok(product) => (StatusCode::CREATED, Json(ProductView::from(product))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ProductQuery>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::CATALOG_READ) {
        return resp;
    }
    match services.services.catalog.list(&query.into_filter()).await {
        Ok(products) => (StatusCode::OK, Json(dto::product_views(products))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn categories(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::CATALOG_READ) {
        return resp;
    }
    match services.services.catalog.categories().await {
        Ok(categories) => (StatusCode::OK, Json(categories)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<LowStockQuery>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::CATALOG_READ) {
        return resp;
    }
    match services.services.catalog.low_stock(query.multiplier).await {
        Ok(products) => (StatusCode::OK, Json(dto::product_views(products))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Product with recent ledger rows and pending demand.
pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::CATALOG_READ) {
        return resp;
    }
    let id: ProductId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.services.catalog.detail(id).await {
        Ok(detail) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "product": ProductView::from(detail.product),
                "recent_transactions": detail.recent_transactions,
                "pending_demand": detail.pending_demand,
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ProductUpdate>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::CATALOG_WRITE) {
        return resp;
    }
    let id: ProductId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.services.catalog.update(id, body).await {
        Ok(product) => (StatusCode::OK, Json(ProductView::from(product))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn deactivate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::CATALOG_DEACTIVATE) {
        return resp;
    }
    let id: ProductId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.services.catalog.deactivate(id).await {
        Ok(product) => (StatusCode::OK, Json(ProductView::from(product))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<AdjustStockRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::STOCK_ADJUST) {
        return resp;
    }
    let id: ProductId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let transaction_type = match body.transaction_type() {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services
        .services
        .ledger
        .adjust(principal.principal(), id, transaction_type, body.quantity, body.notes)
        .await
    {
        Ok(posted) => {
            services.stock_adjusted(&posted);
            (StatusCode::OK, Json(AdjustmentView::from(posted))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn stock_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::STOCK_HISTORY) {
        return resp;
    }
    let id: ProductId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let page = Page::new(query.limit, query.offset, HISTORY_DEFAULT_LIMIT);
    match services.services.ledger.history(id, page).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn availability(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &Permission::CATALOG_READ) {
        return resp;
    }
    let id: ProductId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.services.catalog.availability(id, query.quantity).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
