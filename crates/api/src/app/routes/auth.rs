use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use flowrack_auth::NewUser;

use crate::app::dto::{ChangePasswordRequest, LoginRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/logout", post(logout))
        .route("/profile", get(profile))
        .route("/change-password", post(change_password))
        .route("/verify", get(verify))
}

/// Self-service sign-up; the role in the body is ignored.
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<NewUser>,
) -> axum::response::Response {
    match services.services.users.register(body).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<LoginRequest>,
) -> axum::response::Response {
    match services.services.users.login(&body.registration_number, &body.password).await {
        Ok(issued) => (StatusCode::OK, Json(issued)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    services.services.users.logout(principal.session());
    (StatusCode::OK, Json(serde_json::json!({"message": "logged out"}))).into_response()
}

pub async fn profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.services.users.profile(principal.principal()).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ChangePasswordRequest>,
) -> axum::response::Response {
    match services
        .services
        .users
        .change_password(principal.principal(), &body.current_password, &body.new_password)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"message": "password changed"}))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// The middleware already validated the token; echo what it resolved to.
pub async fn verify(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "valid": true,
        "user": principal.user(),
        "expires_at": principal.session().claims.expires_at(),
    }))
}
