use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use flowrack_infra::services::UserService;

use crate::app::errors;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub users: UserService,
}

/// Resolve the bearer token into a [`PrincipalContext`]. Bad, expired or
/// revoked tokens and deactivated accounts all get a 401.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(req.headers()) else {
        return unauthorized("missing bearer token");
    };

    let session = match state.users.authenticate(token).await {
        Ok(session) => session,
        Err(e) => {
            tracing::debug!(error = %e, "token rejected");
            return unauthorized("invalid or expired token");
        }
    };

    req.extensions_mut().insert(PrincipalContext::new(session));
    next.run(req).await
}

fn unauthorized(message: &str) -> Response {
    errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", message)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
