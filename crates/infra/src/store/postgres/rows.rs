//! Row structs decoded with `try_get` and converted into domain records.
//!
//! Text columns holding enums are parsed here; a value the domain does not
//! know is a backend error (the schema's CHECK constraints should prevent it).

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, Row};
use sqlx::postgres::PgRow;

use flowrack_auth::{Role, User};
use flowrack_core::{DebtId, DomainError, ProductId, RequestId, RequestItemId, TransactionId, UserId};
use flowrack_debts::{Debt, DebtStatus, DebtType};
use flowrack_inventory::{InventoryTransaction, ReferenceType, TransactionType};
use flowrack_products::Product;
use flowrack_requests::{Request, RequestItem, RequestStatus};

use crate::store::{Credentials, PendingDemand, StoreError, StoreResult};

fn decode(err: DomainError) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {err}"))
}

pub(super) const USER_COLUMNS: &str = "id, registration_number, password_hash, first_name, last_name, email, phone, \
     role, department, is_active, created_at, updated_at";

#[derive(Debug)]
pub(super) struct UserRow {
    id: i64,
    registration_number: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    role: String,
    department: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            registration_number: row.try_get("registration_number")?,
            password_hash: row.try_get("password_hash")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            role: row.try_get("role")?,
            department: row.try_get("department")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl UserRow {
    pub(super) fn into_credentials(self) -> StoreResult<Credentials> {
        let role = Role::parse(&self.role).map_err(decode)?;
        Ok(Credentials {
            password_hash: self.password_hash,
            user: User {
                id: UserId::new(self.id),
                registration_number: self.registration_number,
                first_name: self.first_name,
                last_name: self.last_name,
                email: self.email,
                phone: self.phone,
                role,
                department: self.department,
                is_active: self.is_active,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        })
    }

    pub(super) fn into_user(self) -> StoreResult<User> {
        self.into_credentials().map(|c| c.user)
    }
}

pub(super) const PRODUCT_COLUMNS: &str = "id, name, description, category, unit_of_measure, stock_quantity, \
     minimum_stock, unit_price, location, is_active, created_at, updated_at";

#[derive(Debug)]
pub(super) struct ProductRow {
    id: i64,
    name: String,
    description: Option<String>,
    category: Option<String>,
    unit_of_measure: String,
    stock_quantity: Decimal,
    minimum_stock: Decimal,
    unit_price: Option<Decimal>,
    location: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            category: row.try_get("category")?,
            unit_of_measure: row.try_get("unit_of_measure")?,
            stock_quantity: row.try_get("stock_quantity")?,
            minimum_stock: row.try_get("minimum_stock")?,
            unit_price: row.try_get("unit_price")?,
            location: row.try_get("location")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> StoreResult<Self> {
        Ok(Product {
            id: ProductId::new(row.id),
            name: row.name,
            description: row.description,
            category: row.category,
            unit_of_measure: row.unit_of_measure,
            stock_quantity: row.stock_quantity,
            minimum_stock: row.minimum_stock,
            unit_price: row.unit_price,
            location: row.location,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(super) const TRANSACTION_COLUMNS: &str = "id, product_id, transaction_type, quantity, quantity_change, \
     previous_quantity, new_quantity, reference_type, reference_id, performed_by, notes, created_at";

#[derive(Debug)]
pub(super) struct TransactionRow {
    id: i64,
    product_id: i64,
    transaction_type: String,
    quantity: Decimal,
    quantity_change: Decimal,
    previous_quantity: Decimal,
    new_quantity: Decimal,
    reference_type: String,
    reference_id: Option<i64>,
    performed_by: i64,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for TransactionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransactionRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            transaction_type: row.try_get("transaction_type")?,
            quantity: row.try_get("quantity")?,
            quantity_change: row.try_get("quantity_change")?,
            previous_quantity: row.try_get("previous_quantity")?,
            new_quantity: row.try_get("new_quantity")?,
            reference_type: row.try_get("reference_type")?,
            reference_id: row.try_get("reference_id")?,
            performed_by: row.try_get("performed_by")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<TransactionRow> for InventoryTransaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> StoreResult<Self> {
        Ok(InventoryTransaction {
            id: TransactionId::new(row.id),
            product_id: ProductId::new(row.product_id),
            transaction_type: TransactionType::parse(&row.transaction_type).map_err(decode)?,
            quantity: row.quantity,
            quantity_change: row.quantity_change,
            previous_quantity: row.previous_quantity,
            new_quantity: row.new_quantity,
            reference_type: ReferenceType::parse(&row.reference_type).map_err(decode)?,
            reference_id: row.reference_id,
            performed_by: UserId::new(row.performed_by),
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

pub(super) const REQUEST_COLUMNS: &str = "id, user_id, request_number, status, requested_date, requested_time, \
     estimated_usage_period, supervising_instructor, purpose, collection_date, delivery_date, return_date, notes, \
     created_at, updated_at";

#[derive(Debug)]
pub(super) struct RequestRow {
    id: i64,
    user_id: i64,
    request_number: String,
    status: String,
    requested_date: NaiveDate,
    requested_time: NaiveTime,
    estimated_usage_period: Option<String>,
    supervising_instructor: Option<String>,
    purpose: Option<String>,
    collection_date: Option<DateTime<Utc>>,
    delivery_date: Option<DateTime<Utc>>,
    return_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for RequestRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RequestRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            request_number: row.try_get("request_number")?,
            status: row.try_get("status")?,
            requested_date: row.try_get("requested_date")?,
            requested_time: row.try_get("requested_time")?,
            estimated_usage_period: row.try_get("estimated_usage_period")?,
            supervising_instructor: row.try_get("supervising_instructor")?,
            purpose: row.try_get("purpose")?,
            collection_date: row.try_get("collection_date")?,
            delivery_date: row.try_get("delivery_date")?,
            return_date: row.try_get("return_date")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<RequestRow> for Request {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> StoreResult<Self> {
        Ok(Request {
            id: RequestId::new(row.id),
            user_id: UserId::new(row.user_id),
            request_number: row.request_number,
            status: RequestStatus::parse(&row.status).map_err(decode)?,
            requested_date: row.requested_date,
            requested_time: row.requested_time,
            estimated_usage_period: row.estimated_usage_period,
            supervising_instructor: row.supervising_instructor,
            purpose: row.purpose,
            collection_date: row.collection_date,
            delivery_date: row.delivery_date,
            return_date: row.return_date,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(super) const ITEM_COLUMNS: &str = "id, request_id, product_id, requested_quantity, approved_quantity, \
     delivered_quantity, delivered_weight, returned_quantity, returned_weight, notes";

#[derive(Debug)]
pub(super) struct ItemRow {
    id: i64,
    request_id: i64,
    product_id: i64,
    requested_quantity: Decimal,
    approved_quantity: Option<Decimal>,
    delivered_quantity: Option<Decimal>,
    delivered_weight: Option<Decimal>,
    returned_quantity: Option<Decimal>,
    returned_weight: Option<Decimal>,
    notes: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            product_id: row.try_get("product_id")?,
            requested_quantity: row.try_get("requested_quantity")?,
            approved_quantity: row.try_get("approved_quantity")?,
            delivered_quantity: row.try_get("delivered_quantity")?,
            delivered_weight: row.try_get("delivered_weight")?,
            returned_quantity: row.try_get("returned_quantity")?,
            returned_weight: row.try_get("returned_weight")?,
            notes: row.try_get("notes")?,
        })
    }
}

impl TryFrom<ItemRow> for RequestItem {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> StoreResult<Self> {
        Ok(RequestItem {
            id: RequestItemId::new(row.id),
            request_id: RequestId::new(row.request_id),
            product_id: ProductId::new(row.product_id),
            requested_quantity: row.requested_quantity,
            approved_quantity: row.approved_quantity,
            delivered_quantity: row.delivered_quantity,
            delivered_weight: row.delivered_weight,
            returned_quantity: row.returned_quantity,
            returned_weight: row.returned_weight,
            notes: row.notes,
        })
    }
}

pub(super) const DEBT_COLUMNS: &str = "id, user_id, product_id, request_id, debt_type, quantity, unit_price, \
     total_amount, status, description, created_by, due_date, resolved_by, resolved_date, created_at, updated_at";

#[derive(Debug)]
pub(super) struct DebtRow {
    id: i64,
    user_id: i64,
    product_id: i64,
    request_id: Option<i64>,
    debt_type: String,
    quantity: Decimal,
    unit_price: Decimal,
    total_amount: Decimal,
    status: String,
    description: Option<String>,
    created_by: i64,
    due_date: Option<NaiveDate>,
    resolved_by: Option<i64>,
    resolved_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for DebtRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(DebtRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            product_id: row.try_get("product_id")?,
            request_id: row.try_get("request_id")?,
            debt_type: row.try_get("debt_type")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            total_amount: row.try_get("total_amount")?,
            status: row.try_get("status")?,
            description: row.try_get("description")?,
            created_by: row.try_get("created_by")?,
            due_date: row.try_get("due_date")?,
            resolved_by: row.try_get("resolved_by")?,
            resolved_date: row.try_get("resolved_date")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<DebtRow> for Debt {
    type Error = StoreError;

    fn try_from(row: DebtRow) -> StoreResult<Self> {
        Ok(Debt {
            id: DebtId::new(row.id),
            user_id: UserId::new(row.user_id),
            product_id: ProductId::new(row.product_id),
            request_id: row.request_id.map(RequestId::new),
            debt_type: DebtType::parse(&row.debt_type).map_err(decode)?,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_amount: row.total_amount,
            status: DebtStatus::parse(&row.status).map_err(decode)?,
            description: row.description,
            created_by: UserId::new(row.created_by),
            due_date: row.due_date,
            resolved_by: row.resolved_by.map(UserId::new),
            resolved_date: row.resolved_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Joined row behind `pending_demand`.
#[derive(Debug)]
pub(super) struct DemandRow {
    request_id: i64,
    request_number: String,
    status: String,
    user_id: i64,
    requested_date: NaiveDate,
    requested_time: NaiveTime,
    requested_quantity: Decimal,
    approved_quantity: Option<Decimal>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for DemandRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(DemandRow {
            request_id: row.try_get("request_id")?,
            request_number: row.try_get("request_number")?,
            status: row.try_get("status")?,
            user_id: row.try_get("user_id")?,
            requested_date: row.try_get("requested_date")?,
            requested_time: row.try_get("requested_time")?,
            requested_quantity: row.try_get("requested_quantity")?,
            approved_quantity: row.try_get("approved_quantity")?,
        })
    }
}

impl TryFrom<DemandRow> for PendingDemand {
    type Error = StoreError;

    fn try_from(row: DemandRow) -> StoreResult<Self> {
        Ok(PendingDemand {
            request_id: RequestId::new(row.request_id),
            request_number: row.request_number,
            status: RequestStatus::parse(&row.status).map_err(decode)?,
            user_id: UserId::new(row.user_id),
            requested_date: row.requested_date,
            requested_time: row.requested_time,
            requested_quantity: row.requested_quantity,
            approved_quantity: row.approved_quantity,
        })
    }
}

/// Decode one row through `R` into a domain record.
pub(super) fn decode_row<R, T>(row: &PgRow) -> StoreResult<T>
where
    R: for<'r> sqlx::FromRow<'r, PgRow>,
    T: TryFrom<R, Error = StoreError>,
{
    let decoded = R::from_row(row).map_err(|e| StoreError::Backend(format!("failed to decode row: {e}")))?;
    T::try_from(decoded)
}

pub(super) fn decode_rows<R, T>(rows: Vec<PgRow>) -> StoreResult<Vec<T>>
where
    R: for<'r> sqlx::FromRow<'r, PgRow>,
    T: TryFrom<R, Error = StoreError>,
{
    rows.iter().map(decode_row::<R, T>).collect()
}

pub(super) fn decode_user(row: &PgRow) -> StoreResult<UserRow> {
    UserRow::from_row(row).map_err(|e| StoreError::Backend(format!("failed to decode row: {e}")))
}
