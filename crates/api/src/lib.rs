//! HTTP API: routing, authentication and request/response mapping over the
//! service layer in `flowrack-infra`.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
