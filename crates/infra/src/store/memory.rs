//! In-process store for tests and database-less development.
//!
//! All tables live behind one `RwLock`, so every multi-row write is applied
//! under a single write guard: either all of it lands or none of it does.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use flowrack_auth::{NewUser, Role, User, UserFilter};
use flowrack_core::{DebtId, Page, ProductId, RequestId, RequestItemId, TransactionId, UserId};
use flowrack_debts::{Debt, DebtFilter, DebtStatus, NewDebt};
use flowrack_inventory::{InventoryTransaction, StockAdjustment, StockPosting, post};
use flowrack_products::{NewProduct, Product, ProductFilter, distinct_categories, low_stock};
use flowrack_requests::{NewRequest, Request, RequestFilter, RequestItem, RequestStatus, RequestTransition};

use super::{
    CommittedTransition, Credentials, DebtStore, PendingDemand, PostedAdjustment, ProductStore, ReportStore,
    RequestStore, StockLedgerStore, Store, StoreError, StoreResult, UserStore,
};
use crate::reports::{self, ActivityEntry, ActivityKind, ActivityScope, DebtStats, DebtTrend, OperatorOverview};
use crate::reports::{ProductUsage, RequestStats, RequestTrend, UserActivity};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, (User, String)>,
    products: BTreeMap<ProductId, Product>,
    transactions: Vec<InventoryTransaction>,
    requests: BTreeMap<RequestId, Request>,
    items: BTreeMap<RequestItemId, RequestItem>,
    debts: BTreeMap<DebtId, Debt>,
    next_id: i64,
}

impl Tables {
    /// One sequence shared by every table; ids only need to be unique per table.
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_name(&self, id: UserId) -> String {
        self.users.get(&id).map(|(u, _)| u.full_name()).unwrap_or_default()
    }

    fn items_of(&self, request_id: RequestId) -> Vec<RequestItem> {
        self.items
            .values()
            .filter(|i| i.request_id == request_id)
            .cloned()
            .collect()
    }

    fn ensure_unique_user(&self, candidate: &User) -> StoreResult<()> {
        for (existing, _) in self.users.values().filter(|(u, _)| u.id != candidate.id) {
            if existing.registration_number == candidate.registration_number {
                return Err(StoreError::Duplicate(format!(
                    "registration number '{}' already exists",
                    candidate.registration_number
                )));
            }
            if candidate.email.is_some() && existing.email == candidate.email {
                return Err(StoreError::Duplicate("email already exists".to_string()));
            }
        }
        Ok(())
    }

    fn post_adjustment(&self, adjustment: &StockAdjustment, at: DateTime<Utc>) -> StoreResult<StockPosting> {
        let product = self
            .products
            .get(&adjustment.product_id)
            .ok_or_else(|| StoreError::NotFound(format!("product {}", adjustment.product_id)))?;
        Ok(post(product, adjustment, at)?)
    }

    fn record_posting(&mut self, posting: StockPosting) -> PostedAdjustment {
        let id = TransactionId::new(self.next_id());
        let transaction = posting.entry.into_transaction(id);
        self.products.insert(posting.product.id, posting.product.clone());
        self.transactions.push(transaction.clone());
        PostedAdjustment {
            product: posting.product,
            transaction,
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, new: &NewUser, password_hash: &str, at: DateTime<Utc>) -> StoreResult<User> {
        let mut tables = self.write()?;
        let id = UserId::new(tables.next_id + 1);
        let user = new.to_user(id, at);
        tables.ensure_unique_user(&user)?;
        tables.next_id();
        tables.users.insert(id, (user.clone(), password_hash.to_string()));
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).map(|(u, _)| u.clone()))
    }

    async fn find_credentials(&self, registration_number: &str) -> StoreResult<Option<Credentials>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|(u, _)| u.registration_number == registration_number)
            .map(|(user, hash)| Credentials {
                user: user.clone(),
                password_hash: hash.clone(),
            }))
    }

    async fn credentials(&self, id: UserId) -> StoreResult<Option<Credentials>> {
        Ok(self.read()?.users.get(&id).map(|(user, hash)| Credentials {
            user: user.clone(),
            password_hash: hash.clone(),
        }))
    }

    async fn list_users(&self, filter: &UserFilter) -> StoreResult<Vec<User>> {
        let tables = self.read()?;
        Ok(filter.apply(tables.users.values().map(|(u, _)| u)))
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        let mut tables = self.write()?;
        tables.ensure_unique_user(user)?;
        let (stored, _) = tables
            .users
            .get_mut(&user.id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user.id)))?;
        *stored = User {
            registration_number: stored.registration_number.clone(),
            created_at: stored.created_at,
            ..user.clone()
        };
        Ok(stored.clone())
    }

    async fn set_password_hash(&self, id: UserId, password_hash: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.write()?;
        let (user, hash) = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        *hash = password_hash.to_string();
        user.updated_at = at;
        Ok(())
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn insert_product(&self, new: &NewProduct, at: DateTime<Utc>) -> StoreResult<Product> {
        let mut tables = self.write()?;
        let id = ProductId::new(tables.next_id());
        let product = new.clone().into_product(id, at);
        tables.products.insert(id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> StoreResult<HashMap<ProductId, Product>> {
        let tables = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<Vec<Product>> {
        Ok(filter.apply(self.read()?.products.values()))
    }

    async fn categories(&self) -> StoreResult<Vec<String>> {
        Ok(distinct_categories(self.read()?.products.values()))
    }

    async fn low_stock(&self, multiplier: Decimal) -> StoreResult<Vec<Product>> {
        Ok(low_stock(self.read()?.products.values(), multiplier))
    }

    async fn update_product(&self, product: &Product) -> StoreResult<Product> {
        let mut tables = self.write()?;
        let stored = tables
            .products
            .get_mut(&product.id)
            .ok_or_else(|| StoreError::NotFound(format!("product {}", product.id)))?;
        *stored = Product {
            stock_quantity: stored.stock_quantity,
            created_at: stored.created_at,
            ..product.clone()
        };
        Ok(stored.clone())
    }

    async fn pending_demand(&self, id: ProductId) -> StoreResult<Vec<PendingDemand>> {
        let tables = self.read()?;
        let mut demand: Vec<PendingDemand> = tables
            .items
            .values()
            .filter(|i| i.product_id == id)
            .filter_map(|item| {
                let request = tables.requests.get(&item.request_id)?;
                matches!(request.status, RequestStatus::Pending | RequestStatus::Approved).then(|| PendingDemand {
                    request_id: request.id,
                    request_number: request.request_number.clone(),
                    status: request.status,
                    user_id: request.user_id,
                    requested_date: request.requested_date,
                    requested_time: request.requested_time,
                    requested_quantity: item.requested_quantity,
                    approved_quantity: item.approved_quantity,
                })
            })
            .collect();
        demand.sort_by(|a, b| {
            (a.requested_date, a.requested_time, a.request_id).cmp(&(b.requested_date, b.requested_time, b.request_id))
        });
        Ok(demand)
    }
}

#[async_trait]
impl StockLedgerStore for InMemoryStore {
    async fn apply_adjustment(&self, adjustment: &StockAdjustment, at: DateTime<Utc>) -> StoreResult<PostedAdjustment> {
        let mut tables = self.write()?;
        let posting = tables.post_adjustment(adjustment, at)?;
        Ok(tables.record_posting(posting))
    }

    async fn transactions(&self, product_id: ProductId, page: Page) -> StoreResult<Vec<InventoryTransaction>> {
        let tables = self.read()?;
        let mut rows: Vec<&InventoryTransaction> =
            tables.transactions.iter().filter(|t| t.product_id == product_id).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page.slice(rows.into_iter().cloned()))
    }
}

#[async_trait]
impl RequestStore for InMemoryStore {
    async fn request_number_exists(&self, request_number: &str) -> StoreResult<bool> {
        Ok(self
            .read()?
            .requests
            .values()
            .any(|r| r.request_number == request_number))
    }

    async fn insert_request(
        &self,
        user_id: UserId,
        request_number: &str,
        new: &NewRequest,
        at: DateTime<Utc>,
    ) -> StoreResult<(Request, Vec<RequestItem>)> {
        let mut tables = self.write()?;
        if tables.requests.values().any(|r| r.request_number == request_number) {
            return Err(StoreError::Duplicate(format!("request number '{request_number}' already exists")));
        }

        let id = RequestId::new(tables.next_id());
        let request = new.to_request(id, user_id, request_number.to_string(), at);
        let mut items = Vec::with_capacity(new.items.len());
        for line in &new.items {
            let item_id = RequestItemId::new(tables.next_id());
            items.push(line.clone().into_item(item_id, id));
        }

        tables.requests.insert(id, request.clone());
        for item in &items {
            tables.items.insert(item.id, item.clone());
        }
        Ok((request, items))
    }

    async fn get_request(&self, id: RequestId) -> StoreResult<Option<Request>> {
        Ok(self.read()?.requests.get(&id).cloned())
    }

    async fn find_request_by_number(&self, request_number: &str) -> StoreResult<Option<Request>> {
        Ok(self
            .read()?
            .requests
            .values()
            .find(|r| r.request_number == request_number)
            .cloned())
    }

    async fn list_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<Request>> {
        Ok(filter.apply(self.read()?.requests.values()))
    }

    async fn request_items(&self, id: RequestId) -> StoreResult<Vec<RequestItem>> {
        Ok(self.read()?.items_of(id))
    }

    async fn commit_transition(&self, transition: &RequestTransition, at: DateTime<Utc>) -> StoreResult<CommittedTransition> {
        let mut tables = self.write()?;
        let request_id = transition.request.id;
        let stored = tables
            .requests
            .get(&request_id)
            .ok_or_else(|| StoreError::NotFound(format!("request {request_id}")))?;
        if stored.status != transition.expected_status {
            return Err(StoreError::StatusChanged {
                current: stored.status.to_string(),
            });
        }
        if let Some(stray) = transition
            .item_updates
            .iter()
            .find(|i| tables.items.get(&i.id).is_none_or(|s| s.request_id != request_id))
        {
            return Err(StoreError::NotFound(format!("request item {}", stray.id)));
        }

        // Movements are posted sequentially so two on the same product chain.
        let mut staged: HashMap<ProductId, Product> = HashMap::new();
        let mut postings = Vec::with_capacity(transition.stock_movements.len());
        for movement in &transition.stock_movements {
            let current = match staged.get(&movement.product_id) {
                Some(p) => p.clone(),
                None => tables
                    .products
                    .get(&movement.product_id)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(format!("product {}", movement.product_id)))?,
            };
            let posting = post(&current, movement, at)?;
            staged.insert(posting.product.id, posting.product.clone());
            postings.push(posting);
        }

        tables.requests.insert(request_id, transition.request.clone());
        for item in &transition.item_updates {
            tables.items.insert(item.id, item.clone());
        }
        let postings = postings
            .into_iter()
            .map(|posting| tables.record_posting(posting))
            .collect();

        Ok(CommittedTransition {
            request: transition.request.clone(),
            items: tables.items_of(request_id),
            postings,
        })
    }
}

#[async_trait]
impl DebtStore for InMemoryStore {
    async fn insert_debt(&self, new: &NewDebt, created_by: UserId, at: DateTime<Utc>) -> StoreResult<Debt> {
        let mut tables = self.write()?;
        let id = DebtId::new(tables.next_id());
        let debt = new.clone().into_debt(id, created_by, at)?;
        tables.debts.insert(id, debt.clone());
        Ok(debt)
    }

    async fn get_debt(&self, id: DebtId) -> StoreResult<Option<Debt>> {
        Ok(self.read()?.debts.get(&id).cloned())
    }

    async fn list_debts(&self, filter: &DebtFilter) -> StoreResult<Vec<Debt>> {
        Ok(filter.apply(self.read()?.debts.values()))
    }

    async fn store_resolution(&self, resolved: &Debt) -> StoreResult<Debt> {
        let mut tables = self.write()?;
        let stored = tables
            .debts
            .get_mut(&resolved.id)
            .ok_or_else(|| StoreError::NotFound(format!("debt {}", resolved.id)))?;
        if stored.status != DebtStatus::Pending {
            return Err(StoreError::StatusChanged {
                current: stored.status.to_string(),
            });
        }
        *stored = Debt {
            status: resolved.status,
            description: resolved.description.clone(),
            resolved_by: resolved.resolved_by,
            resolved_date: resolved.resolved_date,
            updated_at: resolved.updated_at,
            ..stored.clone()
        };
        Ok(stored.clone())
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn request_stats(&self, user: Option<UserId>, since: Option<DateTime<Utc>>, today: NaiveDate) -> StoreResult<RequestStats> {
        let tables = self.read()?;
        let requests = tables.requests.values().filter(|r| user.is_none_or(|u| r.user_id == u));
        Ok(reports::tally_requests(requests, since, today))
    }

    async fn debt_stats(&self, user: Option<UserId>, since: Option<DateTime<Utc>>) -> StoreResult<DebtStats> {
        let tables = self.read()?;
        let debts = tables.debts.values().filter(|d| user.is_none_or(|u| d.user_id == u));
        Ok(reports::tally_debts(debts, since))
    }

    async fn operator_overview(&self, today: NaiveDate, low_stock_multiplier: Decimal) -> StoreResult<OperatorOverview> {
        let tables = self.read()?;
        Ok(OperatorOverview {
            today_deliveries: tables
                .requests
                .values()
                .filter(|r| matches!(r.status, RequestStatus::Approved | RequestStatus::Collecting))
                .filter(|r| r.requested_date == today)
                .count() as i64,
            low_stock_products: low_stock(tables.products.values(), low_stock_multiplier).len() as i64,
            active_users: tables
                .users
                .values()
                .filter(|(u, _)| u.is_active && u.role == Role::User)
                .count() as i64,
            total_pending_debt: tables
                .debts
                .values()
                .filter(|d| d.status == DebtStatus::Pending)
                .map(|d| d.total_amount)
                .sum(),
        })
    }

    async fn recent_activity(&self, scope: ActivityScope, limit: u32, now: DateTime<Utc>) -> StoreResult<Vec<ActivityEntry>> {
        let tables = self.read()?;
        let request_entry = |r: &Request| ActivityEntry {
            kind: ActivityKind::Request,
            reference_id: r.id.get(),
            title: reports::request_title(&r.request_number),
            status: r.status.to_string(),
            user_id: r.user_id,
            description: reports::request_description(r.status, scope, &tables.user_name(r.user_id)),
            timestamp: r.updated_at,
        };
        let mut by_update: Vec<&Request> = tables.requests.values().collect();
        by_update.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

        match scope {
            ActivityScope::Own(user_id) => Ok(by_update
                .into_iter()
                .filter(|r| r.user_id == user_id)
                .take(limit as usize)
                .map(request_entry)
                .collect()),
            ActivityScope::System => {
                let side = reports::per_side_limit(limit) as usize;
                let debt_since = reports::days_before(now.date_naive(), reports::DEBT_ACTIVITY_DAYS);
                let mut debts: Vec<&Debt> = tables.debts.values().filter(|d| d.created_at >= debt_since).collect();
                debts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

                let mut entries: Vec<ActivityEntry> = by_update.into_iter().take(side).map(request_entry).collect();
                entries.extend(debts.into_iter().take(side).map(|d| {
                    let product = tables.products.get(&d.product_id).map(|p| p.name.as_str()).unwrap_or_default();
                    ActivityEntry {
                        kind: ActivityKind::Debt,
                        reference_id: d.id.get(),
                        title: reports::DEBT_TITLE.to_string(),
                        status: d.status.to_string(),
                        user_id: d.user_id,
                        description: reports::debt_description(&tables.user_name(d.user_id), product, d.total_amount),
                        timestamp: d.created_at,
                    }
                }));
                Ok(reports::merge_activity(entries, limit as usize))
            }
        }
    }

    async fn request_trends(&self, since: DateTime<Utc>) -> StoreResult<Vec<RequestTrend>> {
        Ok(reports::request_trends(self.read()?.requests.values(), since))
    }

    async fn debt_trends(&self, since: DateTime<Utc>) -> StoreResult<Vec<DebtTrend>> {
        Ok(reports::debt_trends(self.read()?.debts.values(), since))
    }

    async fn product_usage(&self, since: DateTime<Utc>, limit: u32) -> StoreResult<Vec<ProductUsage>> {
        let tables = self.read()?;
        let requests: HashMap<RequestId, Request> = tables.requests.iter().map(|(id, r)| (*id, r.clone())).collect();
        Ok(reports::product_usage(
            tables.products.values(),
            &requests,
            tables.items.values(),
            since,
            limit as usize,
        ))
    }

    async fn user_activity(&self, since: DateTime<Utc>, limit: u32) -> StoreResult<Vec<UserActivity>> {
        let tables = self.read()?;
        Ok(reports::user_activity(
            tables.users.values().map(|(u, _)| u),
            tables.requests.values(),
            tables.debts.values(),
            since,
            limit as usize,
        ))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flowrack_core::DomainError;
    use flowrack_inventory::{StockReference, TransactionType};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).single().unwrap()
    }

    fn new_product(stock: i64, min: i64) -> NewProduct {
        NewProduct {
            name: "Copper wire".to_string(),
            unit_of_measure: "kg".to_string(),
            description: None,
            category: Some("Metals".to_string()),
            stock_quantity: Decimal::from(stock),
            minimum_stock: Decimal::from(min),
            unit_price: Some(Decimal::from(4)),
            location: None,
        }
    }

    #[tokio::test]
    async fn adjustment_updates_stock_and_appends_row() {
        let store = InMemoryStore::new();
        let product = store.insert_product(&new_product(50, 10), at()).await.unwrap();
        let adj = StockAdjustment::new(
            product.id,
            TransactionType::Out,
            Decimal::from(45),
            StockReference::manual(),
            UserId::new(1),
            None,
        )
        .unwrap();

        let posted = store.apply_adjustment(&adj, at()).await.unwrap();
        assert_eq!(posted.product.stock_quantity, Decimal::from(5));
        assert_eq!(posted.transaction.previous_quantity, Decimal::from(50));

        let rows = store.transactions(product.id, Page::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity_change, Decimal::from(-45));
    }

    #[tokio::test]
    async fn adjustment_on_unknown_product_is_not_found() {
        let store = InMemoryStore::new();
        let adj = StockAdjustment::new(
            ProductId::new(99),
            TransactionType::In,
            Decimal::ONE,
            StockReference::manual(),
            UserId::new(1),
            None,
        )
        .unwrap();
        assert!(matches!(store.apply_adjustment(&adj, at()).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn product_update_never_writes_stock() {
        let store = InMemoryStore::new();
        let product = store.insert_product(&new_product(50, 10), at()).await.unwrap();
        let tampered = Product {
            name: "Copper wire 2mm".to_string(),
            stock_quantity: Decimal::from(1_000),
            ..product.clone()
        };
        let stored = store.update_product(&tampered).await.unwrap();
        assert_eq!(stored.name, "Copper wire 2mm");
        assert_eq!(stored.stock_quantity, Decimal::from(50));
    }

    #[tokio::test]
    async fn commit_compares_the_expected_status() {
        let store = InMemoryStore::new();
        let new = NewRequest {
            requested_date: at().date_naive(),
            requested_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            estimated_usage_period: None,
            supervising_instructor: None,
            purpose: None,
            notes: None,
            items: vec![flowrack_requests::NewRequestItem {
                product_id: ProductId::new(5),
                requested_quantity: Decimal::TWO,
                notes: None,
            }],
        };
        let (request, items) = store.insert_request(UserId::new(1), "REQ-20260310-0001", &new, at()).await.unwrap();
        let approve = |qty: i64| {
            let approvals = [flowrack_requests::ItemApproval {
                item_id: items[0].id,
                approved_quantity: Decimal::from(qty),
            }];
            request.approve(&items, &approvals, at()).unwrap()
        };
        let first = approve(2);
        let stale = approve(1);

        store.commit_transition(&first, at()).await.unwrap();
        assert_eq!(
            store.commit_transition(&stale, at()).await,
            Err(StoreError::StatusChanged {
                current: "approved".to_string()
            })
        );
        let stored = store.request_items(request.id).await.unwrap();
        assert_eq!(stored[0].approved_quantity, Some(Decimal::TWO));
    }

    #[tokio::test]
    async fn overflowing_adjustment_leaves_the_store_usable() {
        let store = InMemoryStore::new();
        let product = store.insert_product(&new_product(0, 0), at()).await.unwrap();
        let fill = |qty: Decimal| {
            StockAdjustment::new(product.id, TransactionType::In, qty, StockReference::manual(), UserId::new(1), None)
                .unwrap()
        };

        store.apply_adjustment(&fill(Decimal::MAX), at()).await.unwrap();
        assert!(matches!(
            store.apply_adjustment(&fill(Decimal::ONE), at()).await,
            Err(StoreError::Rejected(DomainError::Validation(_)))
        ));

        store.health_check().await.unwrap();
        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, Decimal::MAX);
        assert_eq!(store.transactions(product.id, Page::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn overflowing_debt_total_is_rejected() {
        let store = InMemoryStore::new();
        let new = NewDebt {
            user_id: UserId::new(1),
            product_id: ProductId::new(2),
            request_id: None,
            debt_type: flowrack_debts::DebtType::Missing,
            quantity: Decimal::MAX,
            unit_price: Decimal::TWO,
            description: None,
            due_date: None,
        };
        assert!(matches!(
            store.insert_debt(&new, UserId::new(3), at()).await,
            Err(StoreError::Rejected(DomainError::Validation(_)))
        ));
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let store = InMemoryStore::new();
        let new = NewUser {
            registration_number: "STU001".to_string(),
            password: "secret1".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: None,
            phone: None,
            role: Role::User,
            department: None,
        };
        store.insert_user(&new, "hash", at()).await.unwrap();
        assert!(matches!(
            store.insert_user(&new, "hash", at()).await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.list_users(&UserFilter::default()).await.unwrap().len(), 1);
    }

    fn movement() -> impl proptest::strategy::Strategy<Value = (TransactionType, i64)> {
        use proptest::prelude::*;
        prop_oneof![
            (1i64..40).prop_map(|q| (TransactionType::In, q)),
            (1i64..40).prop_map(|q| (TransactionType::Out, q)),
            (-40i64..40)
                .prop_filter("zero delta", |q| *q != 0)
                .prop_map(|q| (TransactionType::Adjustment, q)),
        ]
    }

    proptest::proptest! {
        #[test]
        fn stock_is_replayable_from_the_ledger(moves in proptest::collection::vec(movement(), 1..30)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = InMemoryStore::new();
                let product = store.insert_product(&new_product(20, 5), at()).await.unwrap();
                for (kind, qty) in &moves {
                    let adj = StockAdjustment::new(
                        product.id,
                        *kind,
                        Decimal::from(*qty),
                        StockReference::manual(),
                        UserId::new(1),
                        None,
                    )
                    .unwrap();
                    store.apply_adjustment(&adj, at()).await.unwrap();
                }

                let rows = store.transactions(product.id, Page::new(Some(100), None, 100)).await.unwrap();
                let replayed: Decimal = rows.iter().map(|r| r.quantity_change).sum();
                let current = store.get_product(product.id).await.unwrap().unwrap();
                assert_eq!(rows.len(), moves.len());
                assert_eq!(current.stock_quantity, Decimal::from(20) + replayed);
                for row in &rows {
                    assert_eq!(row.previous_quantity + row.quantity_change, row.new_quantity);
                }
            });
        }
    }
}
