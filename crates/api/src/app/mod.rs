//! HTTP application wiring.
//!
//! - `services.rs`: service container plus the realtime channel
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request bodies, query strings and response views
//! - `errors.rs`: error-to-response mapping

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use flowrack_infra::Services;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router.
pub fn build_app(services: Services) -> Router {
    let auth_state = middleware::AuthState {
        users: services.users.clone(),
    };
    let app_services = Arc::new(services::AppServices::new(services));

    // Everything except health, register and login needs a bearer token.
    let protected = routes::router()
        .layer(Extension(app_services.clone()))
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    let public = routes::public_router().layer(Extension(app_services));

    Router::new().merge(public).merge(protected).layer(ServiceBuilder::new())
}
