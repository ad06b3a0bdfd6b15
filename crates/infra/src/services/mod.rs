//! Service layer: loads current records, runs the pure domain function and
//! hands the result to the store.
//!
//! Coarse permission checks happen at the HTTP boundary; services still
//! enforce ownership (a `user` only touches their own requests and debts).

use std::sync::Arc;

use thiserror::Error;

use flowrack_auth::{AuthzError, Hs256Jwt, InMemoryRevocationList, PasswordError, Principal, TokenRevocationStore};
use flowrack_core::DomainError;

use crate::config::AppConfig;
use crate::store::{SharedStore, StoreError};

pub mod catalog;
pub mod dashboard;
pub mod debts;
pub mod ledger;
pub mod lifecycle;
pub mod users;

pub use catalog::{CatalogService, ProductAvailability, ProductDetail};
pub use dashboard::{Analytics, DashboardService, OperatorDashboard, UserDashboard};
pub use debts::DebtService;
pub use ledger::LedgerService;
pub use lifecycle::{RequestDetail, RequestService, RequestedLine};
pub use users::{AuthenticatedSession, IssuedToken, UserProfile, UserService};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<AuthzError> for ServiceError {
    fn from(err: AuthzError) -> Self {
        ServiceError::Forbidden(err.to_string())
    }
}

impl From<PasswordError> for ServiceError {
    fn from(err: PasswordError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ServiceError::Domain(DomainError::not_found(what))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ServiceError::Forbidden(msg.into())
    }
}

/// Reject unless `principal` is staff or owns the record.
pub(crate) fn ensure_owner_or_staff(principal: &Principal, owner: flowrack_core::UserId, what: &str) -> ServiceResult<()> {
    if principal.owns_or_staff(owner) {
        Ok(())
    } else {
        Err(ServiceError::forbidden(format!("access denied to {what}")))
    }
}

/// All services over one store.
#[derive(Clone)]
pub struct Services {
    pub store: SharedStore,
    pub users: UserService,
    pub catalog: CatalogService,
    pub ledger: LedgerService,
    pub requests: RequestService,
    pub debts: DebtService,
    pub dashboard: DashboardService,
}

impl Services {
    pub fn new(store: SharedStore, config: &AppConfig) -> Self {
        let revocations: Arc<dyn TokenRevocationStore> = Arc::new(InMemoryRevocationList::new());
        let jwt = Arc::new(Hs256Jwt::new(config.jwt_secret.as_bytes()));
        Self {
            users: UserService::new(store.clone(), jwt, revocations, config.token_ttl),
            catalog: CatalogService::new(store.clone(), config.low_stock_multiplier),
            ledger: LedgerService::new(store.clone(), config.low_stock_multiplier),
            requests: RequestService::new(store.clone(), config.request_number_attempts, config.post_request_movements),
            debts: DebtService::new(store.clone()),
            dashboard: DashboardService::new(store.clone(), config.low_stock_multiplier),
            store,
        }
    }
}

impl core::fmt::Debug for Services {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Services").field("backend", &self.store.backend()).finish_non_exhaustive()
    }
}
