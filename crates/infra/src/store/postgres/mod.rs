//! Postgres-backed store.
//!
//! Runtime-checked `sqlx` queries against the schema in
//! `migrations/0001_flowrack.sql`. Multi-row writes run inside one explicit
//! transaction; an early return drops the transaction, which rolls it back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (other) | any | `Backend` |
//! | PoolClosed / RowNotFound / other | N/A | `Backend` |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::field::Empty;
use tracing::{Span, info, instrument};

use flowrack_auth::{NewUser, User, UserFilter};
use flowrack_core::{DebtId, Page, ProductId, RequestId, UserId};
use flowrack_debts::{Debt, DebtFilter, NewDebt};
use flowrack_inventory::{InventoryTransaction, StockAdjustment, post};
use flowrack_products::{NewProduct, Product, ProductFilter};
use flowrack_requests::{NewRequest, Request, RequestFilter, RequestItem, RequestTransition};

use super::{
    CommittedTransition, Credentials, DebtStore, PendingDemand, PostedAdjustment, ProductStore, RequestStore,
    StockLedgerStore, Store, StoreError, StoreResult, UserStore,
};

mod reports;
mod rows;

use rows::{
    DEBT_COLUMNS, DebtRow, DemandRow, ITEM_COLUMNS, ItemRow, PRODUCT_COLUMNS, ProductRow, REQUEST_COLUMNS, RequestRow,
    TRANSACTION_COLUMNS, TransactionRow, USER_COLUMNS, decode_row, decode_rows, decode_user,
};

const MIGRATION: &str = include_str!("../../../migrations/0001_flowrack.sql");

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Every statement is `IF NOT EXISTS`, so this is safe
    /// on every startup.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        info!("schema migration applied");
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

/// Map a sqlx error from `operation` onto the store taxonomy.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(db_err.constraint().map_or(msg, |c| format!("{c} already exists"))),
                Some("23503") => StoreError::NotFound(format!("referenced row missing in {operation}")),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        sqlx::Error::RowNotFound => StoreError::Backend(format!("unexpected missing row in {operation}")),
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}

/// `%term%` for ILIKE with the wildcard characters of `term` escaped.
fn like_pattern(term: Option<&str>) -> Option<String> {
    term.map(str::trim).filter(|t| !t.is_empty()).map(|t| {
        let escaped = t.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        format!("%{escaped}%")
    })
}

fn limit_offset(page: Page) -> (i64, i64) {
    (i64::from(page.limit), i64::from(page.offset))
}

/// Lock a product row for the rest of `tx`.
async fn lock_product(tx: &mut Transaction<'_, Postgres>, id: ProductId) -> StoreResult<Product> {
    let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"))
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?
        .ok_or_else(|| StoreError::NotFound(format!("product {id}")))?;
    decode_row::<ProductRow, Product>(&row)
}

/// Post one adjustment inside `tx`: stock update plus ledger row.
async fn post_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    adjustment: &StockAdjustment,
    at: DateTime<Utc>,
) -> StoreResult<PostedAdjustment> {
    let current = lock_product(tx, adjustment.product_id).await?;
    let posting = post(&current, adjustment, at)?;

    let row = sqlx::query(&format!(
        "UPDATE products SET stock_quantity = $2, updated_at = $3 WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(posting.product.id.get())
    .bind(posting.product.stock_quantity)
    .bind(at)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_stock", e))?;
    let product = decode_row::<ProductRow, Product>(&row)?;

    let entry = &posting.entry;
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO inventory_transactions (
            product_id, transaction_type, quantity, quantity_change, previous_quantity, new_quantity,
            reference_type, reference_id, performed_by, notes, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(entry.product_id.get())
    .bind(entry.transaction_type.as_str())
    .bind(entry.quantity)
    .bind(entry.quantity_change)
    .bind(entry.previous_quantity)
    .bind(entry.new_quantity)
    .bind(entry.reference_type.as_str())
    .bind(entry.reference_id)
    .bind(entry.performed_by.get())
    .bind(&entry.notes)
    .bind(entry.created_at)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;
    let transaction = decode_row::<TransactionRow, InventoryTransaction>(&row)?;

    Ok(PostedAdjustment { product, transaction })
}

async fn items_in_tx(tx: &mut Transaction<'_, Postgres>, request_id: RequestId) -> StoreResult<Vec<RequestItem>> {
    let rows = sqlx::query(&format!(
        "SELECT {ITEM_COLUMNS} FROM request_items WHERE request_id = $1 ORDER BY id ASC"
    ))
    .bind(request_id.get())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("request_items", e))?;
    decode_rows::<ItemRow, RequestItem>(rows)
}

fn decode_credentials(row: Option<PgRow>) -> StoreResult<Option<Credentials>> {
    row.map(|r| decode_user(&r)?.into_credentials()).transpose()
}

#[async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self, new, password_hash), fields(operation = Empty, registration_number = %new.registration_number), err)]
    async fn insert_user(&self, new: &NewUser, password_hash: &str, at: DateTime<Utc>) -> StoreResult<User> {
        Span::current().record("operation", "insert_user");
        let user = new.to_user(UserId::new(0), at);
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (
                registration_number, password_hash, first_name, last_name, email, phone,
                role, department, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9, $9)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.registration_number)
        .bind(password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(&user.department)
        .bind(at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        decode_user(&row)?.into_user()
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.credentials(id).await?.map(|c| c.user))
    }

    async fn find_credentials(&self, registration_number: &str) -> StoreResult<Option<Credentials>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE registration_number = $1"))
            .bind(registration_number)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_credentials", e))?;
        decode_credentials(row)
    }

    async fn credentials(&self, id: UserId) -> StoreResult<Option<Credentials>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("credentials", e))?;
        decode_credentials(row)
    }

    async fn list_users(&self, filter: &UserFilter) -> StoreResult<Vec<User>> {
        let (limit, offset) = limit_offset(filter.page);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::text IS NULL OR department = $2)
              AND ($3::bool IS NULL OR is_active = $3)
              AND ($4::text IS NULL
                   OR first_name ILIKE $4 OR last_name ILIKE $4
                   OR registration_number ILIKE $4 OR email ILIKE $4)
            ORDER BY last_name ASC, first_name ASC, id ASC
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(filter.role.map(|r| r.as_str()))
        .bind(&filter.department)
        .bind(filter.is_active)
        .bind(like_pattern(filter.search.as_deref()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_users", e))?;
        rows.iter().map(|r| decode_user(r)?.into_user()).collect()
    }

    #[instrument(skip(self, user), fields(operation = Empty, user_id = %user.id), err)]
    async fn update_user(&self, user: &User) -> StoreResult<User> {
        Span::current().record("operation", "update_user");
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, email = $4, phone = $5,
                role = $6, department = $7, is_active = $8, updated_at = $9
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id.get())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(&user.department)
        .bind(user.is_active)
        .bind(user.updated_at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_user", e))?
        .ok_or_else(|| StoreError::NotFound(format!("user {}", user.id)))?;
        decode_user(&row)?.into_user()
    }

    #[instrument(skip(self, password_hash), fields(operation = Empty, user_id = %id), err)]
    async fn set_password_hash(&self, id: UserId, password_hash: &str, at: DateTime<Utc>) -> StoreResult<()> {
        Span::current().record("operation", "set_password_hash");
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(id.get())
            .bind(password_hash)
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_password_hash", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for PostgresStore {
    #[instrument(skip(self, new), fields(operation = Empty, name = %new.name), err)]
    async fn insert_product(&self, new: &NewProduct, at: DateTime<Utc>) -> StoreResult<Product> {
        Span::current().record("operation", "insert_product");
        let product = new.clone().into_product(ProductId::new(0), at);
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (
                name, description, category, unit_of_measure, stock_quantity, minimum_stock,
                unit_price, location, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9, $9)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.unit_of_measure)
        .bind(product.stock_quantity)
        .bind(product.minimum_stock)
        .bind(product.unit_price)
        .bind(&product.location)
        .bind(at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        decode_row::<ProductRow, Product>(&row)
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.map(|r| decode_row::<ProductRow, Product>(&r)).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> StoreResult<HashMap<ProductId, Product>> {
        let raw: Vec<i64> = ids.iter().map(ProductId::get).collect();
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"))
            .bind(&raw)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_products", e))?;
        let products = decode_rows::<ProductRow, Product>(rows)?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<Vec<Product>> {
        let (limit, offset) = limit_offset(filter.page);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE ($1::bool = FALSE OR is_active)
              AND ($2::text IS NULL OR category = $2)
              AND ($3::text IS NULL OR name ILIKE $3 OR description ILIKE $3 OR category ILIKE $3)
            ORDER BY name ASC, id ASC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.active_only)
        .bind(&filter.category)
        .bind(like_pattern(filter.search.as_deref()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;
        decode_rows::<ProductRow, Product>(rows)
    }

    async fn categories(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT category
            FROM products
            WHERE is_active AND category IS NOT NULL
            ORDER BY category ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("categories", e))?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("category").map_err(|e| map_sqlx_error("categories", e)))
            .collect()
    }

    async fn low_stock(&self, multiplier: Decimal) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE is_active AND stock_quantity <= minimum_stock * $1
            ORDER BY stock_quantity / GREATEST(minimum_stock, 1) ASC, name ASC
            "#
        ))
        .bind(multiplier)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("low_stock", e))?;
        decode_rows::<ProductRow, Product>(rows)
    }

    #[instrument(skip(self, product), fields(operation = Empty, product_id = %product.id), err)]
    async fn update_product(&self, product: &Product) -> StoreResult<Product> {
        Span::current().record("operation", "update_product");
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET name = $2, description = $3, category = $4, unit_of_measure = $5,
                minimum_stock = $6, unit_price = $7, location = $8, is_active = $9, updated_at = $10
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product.id.get())
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.unit_of_measure)
        .bind(product.minimum_stock)
        .bind(product.unit_price)
        .bind(&product.location)
        .bind(product.is_active)
        .bind(product.updated_at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?
        .ok_or_else(|| StoreError::NotFound(format!("product {}", product.id)))?;
        decode_row::<ProductRow, Product>(&row)
    }

    async fn pending_demand(&self, id: ProductId) -> StoreResult<Vec<PendingDemand>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id AS request_id, r.request_number, r.status, r.user_id,
                   r.requested_date, r.requested_time,
                   ri.requested_quantity, ri.approved_quantity
            FROM request_items ri
            JOIN requests r ON r.id = ri.request_id
            WHERE ri.product_id = $1 AND r.status IN ('pending', 'approved')
            ORDER BY r.requested_date ASC, r.requested_time ASC, r.id ASC
            "#,
        )
        .bind(id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("pending_demand", e))?;
        decode_rows::<DemandRow, PendingDemand>(rows)
    }
}

#[async_trait]
impl StockLedgerStore for PostgresStore {
    #[instrument(
        skip(self, adjustment),
        fields(
            operation = Empty,
            product_id = %adjustment.product_id,
            delta = %adjustment.delta,
            transaction_type = adjustment.transaction_type.as_str()
        ),
        err
    )]
    async fn apply_adjustment(&self, adjustment: &StockAdjustment, at: DateTime<Utc>) -> StoreResult<PostedAdjustment> {
        Span::current().record("operation", "apply_adjustment");
        let mut tx = self.begin().await?;
        let posted = post_in_tx(&mut tx, adjustment, at).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(posted)
    }

    async fn transactions(&self, product_id: ProductId, page: Page) -> StoreResult<Vec<InventoryTransaction>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM inventory_transactions
            WHERE product_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(product_id.get())
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions", e))?;
        decode_rows::<TransactionRow, InventoryTransaction>(rows)
    }
}

#[async_trait]
impl RequestStore for PostgresStore {
    async fn request_number_exists(&self, request_number: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM requests WHERE request_number = $1) AS taken")
            .bind(request_number)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("request_number_exists", e))?;
        row.try_get("taken").map_err(|e| map_sqlx_error("request_number_exists", e))
    }

    #[instrument(
        skip(self, new),
        fields(operation = Empty, item_count = new.items.len()),
        err
    )]
    async fn insert_request(
        &self,
        user_id: UserId,
        request_number: &str,
        new: &NewRequest,
        at: DateTime<Utc>,
    ) -> StoreResult<(Request, Vec<RequestItem>)> {
        Span::current().record("operation", "insert_request");
        let mut tx = self.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO requests (
                user_id, request_number, status, requested_date, requested_time,
                estimated_usage_period, supervising_instructor, purpose, notes, created_at, updated_at
            )
            VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(user_id.get())
        .bind(request_number)
        .bind(new.requested_date)
        .bind(new.requested_time)
        .bind(&new.estimated_usage_period)
        .bind(&new.supervising_instructor)
        .bind(&new.purpose)
        .bind(&new.notes)
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_request", e))?;
        let request = decode_row::<RequestRow, Request>(&row)?;

        let mut items = Vec::with_capacity(new.items.len());
        for line in &new.items {
            let row = sqlx::query(&format!(
                r#"
                INSERT INTO request_items (request_id, product_id, requested_quantity, notes)
                VALUES ($1, $2, $3, $4)
                RETURNING {ITEM_COLUMNS}
                "#
            ))
            .bind(request.id.get())
            .bind(line.product_id.get())
            .bind(line.requested_quantity)
            .bind(&line.notes)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_request_item", e))?;
            items.push(decode_row::<ItemRow, RequestItem>(&row)?);
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok((request, items))
    }

    async fn get_request(&self, id: RequestId) -> StoreResult<Option<Request>> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_request", e))?;
        row.map(|r| decode_row::<RequestRow, Request>(&r)).transpose()
    }

    async fn find_request_by_number(&self, request_number: &str) -> StoreResult<Option<Request>> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE request_number = $1"))
            .bind(request_number)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_request_by_number", e))?;
        row.map(|r| decode_row::<RequestRow, Request>(&r)).transpose()
    }

    async fn list_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<Request>> {
        let (limit, offset) = limit_offset(filter.page);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM requests
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::bigint IS NULL OR user_id = $2)
              AND ($3::date IS NULL OR requested_date >= $3)
              AND ($4::date IS NULL OR requested_date <= $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.user_id.map(|u| u.get()))
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_requests", e))?;
        decode_rows::<RequestRow, Request>(rows)
    }

    async fn request_items(&self, id: RequestId) -> StoreResult<Vec<RequestItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM request_items WHERE request_id = $1 ORDER BY id ASC"
        ))
        .bind(id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("request_items", e))?;
        decode_rows::<ItemRow, RequestItem>(rows)
    }

    #[instrument(
        skip(self, transition),
        fields(
            operation = Empty,
            request_id = %transition.request.id,
            from = transition.expected_status.as_str(),
            to = transition.request.status.as_str(),
            item_updates = transition.item_updates.len(),
            stock_movements = transition.stock_movements.len()
        ),
        err
    )]
    async fn commit_transition(&self, transition: &RequestTransition, at: DateTime<Utc>) -> StoreResult<CommittedTransition> {
        Span::current().record("operation", "commit_transition");
        let next = &transition.request;
        let mut tx = self.begin().await?;

        // Compare-and-set: only moves the row if nobody else did first.
        let row = sqlx::query(&format!(
            r#"
            UPDATE requests
            SET status = $3, collection_date = $4, delivery_date = $5, return_date = $6,
                notes = $7, updated_at = $8
            WHERE id = $1 AND status = $2
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(next.id.get())
        .bind(transition.expected_status.as_str())
        .bind(next.status.as_str())
        .bind(next.collection_date)
        .bind(next.delivery_date)
        .bind(next.return_date)
        .bind(&next.notes)
        .bind(next.updated_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_request_status", e))?;

        let Some(row) = row else {
            let current = sqlx::query("SELECT status FROM requests WHERE id = $1")
                .bind(next.id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("read_request_status", e))?;
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return match current {
                Some(r) => Err(StoreError::StatusChanged {
                    current: r.try_get("status").map_err(|e| map_sqlx_error("read_request_status", e))?,
                }),
                None => Err(StoreError::NotFound(format!("request {}", next.id))),
            };
        };
        let request = decode_row::<RequestRow, Request>(&row)?;

        for item in &transition.item_updates {
            let result = sqlx::query(
                r#"
                UPDATE request_items
                SET approved_quantity = $3, delivered_quantity = $4, delivered_weight = $5,
                    returned_quantity = $6, returned_weight = $7, notes = $8
                WHERE id = $1 AND request_id = $2
                "#,
            )
            .bind(item.id.get())
            .bind(request.id.get())
            .bind(item.approved_quantity)
            .bind(item.delivered_quantity)
            .bind(item.delivered_weight)
            .bind(item.returned_quantity)
            .bind(item.returned_weight)
            .bind(&item.notes)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_request_item", e))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("request item {}", item.id)));
            }
        }

        let mut postings = Vec::with_capacity(transition.stock_movements.len());
        for movement in &transition.stock_movements {
            postings.push(post_in_tx(&mut tx, movement, at).await?);
        }

        let items = items_in_tx(&mut tx, request.id).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(CommittedTransition { request, items, postings })
    }
}

#[async_trait]
impl DebtStore for PostgresStore {
    #[instrument(
        skip(self, new),
        fields(operation = Empty, user_id = %new.user_id, product_id = %new.product_id, created_by = %created_by),
        err
    )]
    async fn insert_debt(&self, new: &NewDebt, created_by: UserId, at: DateTime<Utc>) -> StoreResult<Debt> {
        Span::current().record("operation", "insert_debt");
        let debt = new.clone().into_debt(DebtId::new(0), created_by, at)?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO debts (
                user_id, product_id, request_id, debt_type, quantity, unit_price, total_amount,
                status, description, created_by, due_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING {DEBT_COLUMNS}
            "#
        ))
        .bind(debt.user_id.get())
        .bind(debt.product_id.get())
        .bind(debt.request_id.map(|r| r.get()))
        .bind(debt.debt_type.as_str())
        .bind(debt.quantity)
        .bind(debt.unit_price)
        .bind(debt.total_amount)
        .bind(debt.status.as_str())
        .bind(&debt.description)
        .bind(created_by.get())
        .bind(debt.due_date)
        .bind(at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_debt", e))?;
        decode_row::<DebtRow, Debt>(&row)
    }

    async fn get_debt(&self, id: DebtId) -> StoreResult<Option<Debt>> {
        let row = sqlx::query(&format!("SELECT {DEBT_COLUMNS} FROM debts WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_debt", e))?;
        row.map(|r| decode_row::<DebtRow, Debt>(&r)).transpose()
    }

    async fn list_debts(&self, filter: &DebtFilter) -> StoreResult<Vec<Debt>> {
        let (limit, offset) = limit_offset(filter.page);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {DEBT_COLUMNS}
            FROM debts
            WHERE ($1::bigint IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.user_id.map(|u| u.get()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_debts", e))?;
        decode_rows::<DebtRow, Debt>(rows)
    }

    #[instrument(skip(self, resolved), fields(operation = Empty, debt_id = %resolved.id, status = resolved.status.as_str()), err)]
    async fn store_resolution(&self, resolved: &Debt) -> StoreResult<Debt> {
        Span::current().record("operation", "store_resolution");
        let row = sqlx::query(&format!(
            r#"
            UPDATE debts
            SET status = $2, description = $3, resolved_by = $4, resolved_date = $5, updated_at = $6
            WHERE id = $1 AND status = 'pending'
            RETURNING {DEBT_COLUMNS}
            "#
        ))
        .bind(resolved.id.get())
        .bind(resolved.status.as_str())
        .bind(&resolved.description)
        .bind(resolved.resolved_by.map(|u| u.get()))
        .bind(resolved.resolved_date)
        .bind(resolved.updated_at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("store_resolution", e))?;

        match row {
            Some(row) => decode_row::<DebtRow, Debt>(&row),
            None => match self.get_debt(resolved.id).await? {
                Some(current) => Err(StoreError::StatusChanged {
                    current: current.status.to_string(),
                }),
                None => Err(StoreError::NotFound(format!("debt {}", resolved.id))),
            },
        }
    }
}

#[async_trait]
impl Store for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("health_check", e))?;
        Ok(())
    }
}
