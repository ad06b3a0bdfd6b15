//! Permission guard run by handlers before calling a service.
//!
//! Coarse role checks live here; ownership (a `user` touching only their own
//! requests and debts) is enforced by the services.

use axum::{http::StatusCode, response::Response};

use flowrack_auth::{Permission, authorize};

use crate::app::errors;
use crate::context::PrincipalContext;

pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), Response> {
    authorize(principal.principal(), permission)
        .map_err(|e| errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}

/// Passes when any of `permissions` is held.
pub fn require_any(principal: &PrincipalContext, permissions: &[Permission]) -> Result<(), Response> {
    if permissions.iter().any(|p| authorize(principal.principal(), p).is_ok()) {
        return Ok(());
    }
    let names: Vec<&str> = permissions.iter().map(Permission::as_str).collect();
    Err(errors::json_error(
        StatusCode::FORBIDDEN,
        "forbidden",
        format!("forbidden: requires one of {}", names.join(", ")),
    ))
}
