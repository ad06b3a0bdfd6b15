use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, Sse},
    },
};

use crate::app::services::{self, AppServices};
use crate::context::PrincipalContext;

/// Liveness plus a storage round trip.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let store = &services.services.store;
    match store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ok", "backend": store.backend()})),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"status": "unavailable", "backend": store.backend()})),
            )
                .into_response()
        }
    }
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": principal.user_id(),
        "registration_number": principal.user().registration_number,
        "role": principal.role().as_str(),
        "permissions": principal.principal().permissions.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
    }))
}

pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    services::principal_sse_stream(services, &principal)
}
