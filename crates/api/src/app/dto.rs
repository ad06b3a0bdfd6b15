use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use flowrack_auth::{Role, UserFilter};
use flowrack_core::{DomainError, Page, UserId};
use flowrack_debts::{DebtFilter, DebtResolution, DebtStatus};
use flowrack_infra::store::{CommittedTransition, PostedAdjustment};
use flowrack_inventory::{InventoryTransaction, TransactionType};
use flowrack_products::{Product, ProductFilter};
use flowrack_requests::{
    DeliveryWeight, ItemApproval, NewRequest, NewRequestItem, Request, RequestFilter, RequestItem, RequestStatus,
    ReturnWeight, parse_requested_date, parse_requested_time,
};

use crate::app::errors;

const DEFAULT_PAGE_SIZE: u32 = 50;

/// Parse a path segment into a typed id, answering 400 on failure.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse()
        .map_err(|e: DomainError| errors::json_error(axum::http::StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}

fn domain<T>(result: Result<T, DomainError>) -> Result<T, axum::response::Response> {
    result.map_err(|e| errors::bad_request(e.to_string()))
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub registration_number: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub transaction_type: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AdjustStockRequest {
    pub fn transaction_type(&self) -> Result<TransactionType, axum::response::Response> {
        domain(TransactionType::parse(&self.transaction_type))
    }
}

/// Dates arrive as `YYYY-MM-DD`, times as `HH:MM`.
#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub requested_date: String,
    pub requested_time: String,
    #[serde(default)]
    pub estimated_usage_period: Option<String>,
    #[serde(default)]
    pub supervising_instructor: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewRequestItem>,
}

impl CreateRequestBody {
    pub fn into_new_request(self) -> Result<NewRequest, axum::response::Response> {
        Ok(NewRequest {
            requested_date: domain(parse_requested_date(&self.requested_date))?,
            requested_time: domain(parse_requested_time(&self.requested_time))?,
            estimated_usage_period: self.estimated_usage_period,
            supervising_instructor: self.supervising_instructor,
            purpose: self.purpose,
            notes: self.notes,
            items: self.items,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequestBody {
    pub item_approvals: Vec<ItemApproval>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequestBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryBody {
    pub weights: Vec<DeliveryWeight>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnBody {
    pub weights: Vec<ReturnWeight>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateBody {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StatusUpdateBody {
    pub fn status(&self) -> Result<RequestStatus, axum::response::Response> {
        domain(RequestStatus::parse(&self.status))
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveDebtBody {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ResolveDebtBody {
    pub fn into_resolution(self) -> Result<DebtResolution, axum::response::Response> {
        let status = domain(DebtStatus::parse(&self.status))?;
        domain(DebtResolution::new(status, self.notes))
    }
}

// -------------------------
// Query strings
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub include_inactive: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ProductQuery {
    pub fn into_filter(self) -> ProductFilter {
        ProductFilter {
            category: self.category.filter(|c| !c.is_empty()),
            search: self.search.filter(|s| !s.is_empty()),
            active_only: !self.include_inactive.unwrap_or(false),
            page: Page::new(self.limit, self.offset, DEFAULT_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LowStockQuery {
    pub multiplier: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub quantity: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<String>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl UserQuery {
    pub fn into_filter(self) -> Result<UserFilter, axum::response::Response> {
        let role = match self.role.as_deref().filter(|r| !r.is_empty()) {
            Some(r) => Some(domain(Role::parse(r))?),
            None => None,
        };
        Ok(UserFilter {
            role,
            department: self.department.filter(|d| !d.is_empty()),
            is_active: self.is_active,
            search: self.search,
            page: Page::new(self.limit, self.offset, DEFAULT_PAGE_SIZE),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestQuery {
    pub status: Option<String>,
    pub user_id: Option<i64>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl RequestQuery {
    pub fn into_filter(self) -> Result<RequestFilter, axum::response::Response> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(domain(RequestStatus::parse(s))?),
            None => None,
        };
        let date_from = match self.date_from.as_deref() {
            Some(d) => Some(domain(parse_requested_date(d))?),
            None => None,
        };
        let date_to = match self.date_to.as_deref() {
            Some(d) => Some(domain(parse_requested_date(d))?),
            None => None,
        };
        Ok(RequestFilter {
            status,
            user_id: self.user_id.map(UserId::new),
            date_from,
            date_to,
            page: Page::new(self.limit, self.offset, DEFAULT_PAGE_SIZE),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DebtQuery {
    pub status: Option<String>,
    pub user_id: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl DebtQuery {
    pub fn into_filter(self) -> Result<DebtFilter, axum::response::Response> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(domain(DebtStatus::parse(s))?),
            None => None,
        };
        Ok(DebtFilter {
            user_id: self.user_id.map(UserId::new),
            status,
            page: Page::new(self.limit, self.offset, DEFAULT_PAGE_SIZE),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub period: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

/// A product with its derived stock status.
#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub stock_status: &'static str,
    pub stock_status_text: &'static str,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        let status = product.stock_status();
        Self {
            stock_status: status.as_str(),
            stock_status_text: status.display_text(),
            product,
        }
    }
}

pub fn product_views(products: Vec<Product>) -> Vec<ProductView> {
    products.into_iter().map(ProductView::from).collect()
}

#[derive(Debug, Serialize)]
pub struct AdjustmentView {
    pub product: ProductView,
    pub transaction: InventoryTransaction,
    pub new_quantity: Decimal,
}

impl From<PostedAdjustment> for AdjustmentView {
    fn from(posted: PostedAdjustment) -> Self {
        Self {
            new_quantity: posted.product.stock_quantity,
            product: posted.product.into(),
            transaction: posted.transaction,
        }
    }
}

/// A request after a lifecycle step, with the ledger rows it produced.
#[derive(Debug, Serialize)]
pub struct TransitionView {
    #[serde(flatten)]
    pub request: Request,
    pub items: Vec<RequestItem>,
    pub stock_movements: Vec<InventoryTransaction>,
}

impl From<CommittedTransition> for TransitionView {
    fn from(committed: CommittedTransition) -> Self {
        Self {
            request: committed.request,
            items: committed.items,
            stock_movements: committed.postings.into_iter().map(|p| p.transaction).collect(),
        }
    }
}
