//! `flowrack-auth`: authentication/authorization boundary.
//!
//! This crate is decoupled from HTTP and storage: it knows how to hash
//! passwords, issue and validate tokens, track revoked tokens and decide
//! whether a role may perform an action.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod revocation;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256Jwt, JwtIssuer, JwtValidator};
pub use password::{MIN_PASSWORD_LEN, PasswordError, hash_password, validate_password_strength, verify_password};
pub use permissions::Permission;
pub use principal::Principal;
pub use revocation::{InMemoryRevocationList, TokenRevocationStore};
pub use roles::Role;
pub use user::{NewUser, User, UserFilter, UserUpdate};
