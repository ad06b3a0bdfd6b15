//! Storage ports and their adapters.
//!
//! The domain crates compute new records as pure values; stores persist them.
//! Every multi-row write (stock + ledger row, request + items, a lifecycle
//! transition with its stock movements) is one unit of work in the backend.
//!
//! ## Error mapping
//!
//! | Situation | `StoreError` |
//! |---|---|
//! | Row addressed by id does not exist | `NotFound` |
//! | Compare-and-set on status lost (concurrent change) | `StatusChanged { current }` |
//! | Unique constraint (SQLSTATE `23505`) | `Duplicate` |
//! | Anything else (connection, pool, decode) | `Backend` |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use flowrack_auth::{NewUser, User, UserFilter};
use flowrack_core::{DebtId, DomainError, Page, ProductId, RequestId, UserId};
use flowrack_debts::{Debt, DebtFilter, NewDebt};
use flowrack_inventory::{InventoryTransaction, StockAdjustment};
use flowrack_products::{NewProduct, Product, ProductFilter};
use flowrack_requests::{NewRequest, Request, RequestFilter, RequestItem, RequestStatus, RequestTransition};

use crate::reports::{
    ActivityEntry, ActivityScope, DebtStats, DebtTrend, OperatorOverview, ProductUsage, RequestStats, RequestTrend,
    UserActivity,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The row's status no longer matched the expected value.
    #[error("status changed concurrently (now '{current}')")]
    StatusChanged { current: String },

    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A domain rule refused the write while it was being applied.
    #[error(transparent)]
    Rejected(#[from] DomainError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A user record together with its password hash. Never serialized.
#[derive(Clone)]
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user.id)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

/// Result of one ledger posting: the product as stored and its log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedAdjustment {
    pub product: Product,
    pub transaction: InventoryTransaction,
}

/// What a committed lifecycle step left in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransition {
    pub request: Request,
    pub items: Vec<RequestItem>,
    pub postings: Vec<PostedAdjustment>,
}

/// Outstanding demand on a product from pending or approved requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDemand {
    pub request_id: RequestId,
    pub request_number: String,
    pub status: RequestStatus,
    pub user_id: UserId,
    pub requested_date: NaiveDate,
    pub requested_time: NaiveTime,
    pub requested_quantity: Decimal,
    pub approved_quantity: Option<Decimal>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; `Duplicate` when the registration number or email is taken.
    async fn insert_user(&self, new: &NewUser, password_hash: &str, at: DateTime<Utc>) -> StoreResult<User>;
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;
    async fn find_credentials(&self, registration_number: &str) -> StoreResult<Option<Credentials>>;
    async fn credentials(&self, id: UserId) -> StoreResult<Option<Credentials>>;
    async fn list_users(&self, filter: &UserFilter) -> StoreResult<Vec<User>>;
    /// Persist profile fields, role and active flag of an existing user.
    async fn update_user(&self, user: &User) -> StoreResult<User>;
    async fn set_password_hash(&self, id: UserId, password_hash: &str, at: DateTime<Utc>) -> StoreResult<()>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert_product(&self, new: &NewProduct, at: DateTime<Utc>) -> StoreResult<Product>;
    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>>;
    async fn get_products(&self, ids: &[ProductId]) -> StoreResult<HashMap<ProductId, Product>>;
    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<Vec<Product>>;
    async fn categories(&self) -> StoreResult<Vec<String>>;
    /// Active products at or below `minimum_stock * multiplier`, most scarce first.
    async fn low_stock(&self, multiplier: Decimal) -> StoreResult<Vec<Product>>;
    /// Persist catalog fields and the active flag. `stock_quantity` is never
    /// written here; the stored value is returned.
    async fn update_product(&self, product: &Product) -> StoreResult<Product>;
    async fn pending_demand(&self, id: ProductId) -> StoreResult<Vec<PendingDemand>>;
}

#[async_trait]
pub trait StockLedgerStore: Send + Sync {
    /// Apply one adjustment: stock update and ledger row in a single unit of work.
    async fn apply_adjustment(&self, adjustment: &StockAdjustment, at: DateTime<Utc>) -> StoreResult<PostedAdjustment>;
    /// Ledger rows for a product, newest first.
    async fn transactions(&self, product_id: ProductId, page: Page) -> StoreResult<Vec<InventoryTransaction>>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn request_number_exists(&self, request_number: &str) -> StoreResult<bool>;
    /// Insert a request and its items together; `Duplicate` when the number is taken.
    async fn insert_request(
        &self,
        user_id: UserId,
        request_number: &str,
        new: &NewRequest,
        at: DateTime<Utc>,
    ) -> StoreResult<(Request, Vec<RequestItem>)>;
    async fn get_request(&self, id: RequestId) -> StoreResult<Option<Request>>;
    async fn find_request_by_number(&self, request_number: &str) -> StoreResult<Option<Request>>;
    async fn list_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<Request>>;
    async fn request_items(&self, id: RequestId) -> StoreResult<Vec<RequestItem>>;
    /// Apply a lifecycle step if the stored status still equals
    /// `transition.expected_status`, else `StatusChanged`.
    async fn commit_transition(&self, transition: &RequestTransition, at: DateTime<Utc>) -> StoreResult<CommittedTransition>;
}

#[async_trait]
pub trait DebtStore: Send + Sync {
    async fn insert_debt(&self, new: &NewDebt, created_by: UserId, at: DateTime<Utc>) -> StoreResult<Debt>;
    async fn get_debt(&self, id: DebtId) -> StoreResult<Option<Debt>>;
    async fn list_debts(&self, filter: &DebtFilter) -> StoreResult<Vec<Debt>>;
    /// Persist a resolved debt if the stored one is still pending.
    async fn store_resolution(&self, resolved: &Debt) -> StoreResult<Debt>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn request_stats(&self, user: Option<UserId>, since: Option<DateTime<Utc>>, today: NaiveDate) -> StoreResult<RequestStats>;
    async fn debt_stats(&self, user: Option<UserId>, since: Option<DateTime<Utc>>) -> StoreResult<DebtStats>;
    async fn operator_overview(&self, today: NaiveDate, low_stock_multiplier: Decimal) -> StoreResult<OperatorOverview>;
    async fn recent_activity(&self, scope: ActivityScope, limit: u32, now: DateTime<Utc>) -> StoreResult<Vec<ActivityEntry>>;
    async fn request_trends(&self, since: DateTime<Utc>) -> StoreResult<Vec<RequestTrend>>;
    async fn debt_trends(&self, since: DateTime<Utc>) -> StoreResult<Vec<DebtTrend>>;
    async fn product_usage(&self, since: DateTime<Utc>, limit: u32) -> StoreResult<Vec<ProductUsage>>;
    async fn user_activity(&self, since: DateTime<Utc>, limit: u32) -> StoreResult<Vec<UserActivity>>;
}

/// Everything the service layer needs from persistence.
#[async_trait]
pub trait Store: UserStore + ProductStore + StockLedgerStore + RequestStore + DebtStore + ReportStore {
    fn backend(&self) -> &'static str;
    async fn health_check(&self) -> StoreResult<()>;
}

pub type SharedStore = Arc<dyn Store>;
