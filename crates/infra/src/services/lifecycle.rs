//! Request lifecycle orchestration.
//!
//! Each step loads the request, asks the domain for a [`RequestTransition`]
//! and hands it to the store, which applies it only if the stored status
//! still matches.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use flowrack_auth::Principal;
use flowrack_core::{DomainError, ProductId, RequestId};
use flowrack_products::Product;
use flowrack_requests::{
    AvailabilityReport, DeliveryWeight, ItemApproval, ItemReconciliation, MovementPolicy, NewRequest, Request,
    RequestFilter, RequestItem, RequestStatus, RequestTransition, ReturnWeight, generate_request_number, reconcile,
};

use super::{ServiceError, ServiceResult, ensure_owner_or_staff};
use crate::reports::{RequestStats, STATS_WINDOW_DAYS, days_before};
use crate::store::{CommittedTransition, SharedStore, StoreError};

/// Produces a candidate request number for a creation date.
pub type NumberGenerator = Arc<dyn Fn(NaiveDate) -> String + Send + Sync>;

/// One item with the product it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedLine {
    #[serde(flatten)]
    pub item: RequestItem,
    /// `None` when the product has since disappeared.
    pub product_name: Option<String>,
    pub unit_of_measure: Option<String>,
    pub current_stock: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: Request,
    pub items: Vec<RequestedLine>,
    pub availability: AvailabilityReport,
}

impl RequestDetail {
    fn assemble(request: Request, items: Vec<RequestItem>, products: &HashMap<ProductId, Product>) -> Self {
        let availability = AvailabilityReport::evaluate(&items, products);
        let items = items
            .into_iter()
            .map(|item| {
                let product = products.get(&item.product_id);
                RequestedLine {
                    product_name: product.map(|p| p.name.clone()),
                    unit_of_measure: product.map(|p| p.unit_of_measure.clone()),
                    current_stock: product.map(|p| p.stock_quantity),
                    item,
                }
            })
            .collect();
        Self {
            request,
            items,
            availability,
        }
    }
}

#[derive(Clone)]
pub struct RequestService {
    store: SharedStore,
    number_attempts: u32,
    post_stock_movements: bool,
    numbers: NumberGenerator,
}

impl core::fmt::Debug for RequestService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RequestService")
            .field("number_attempts", &self.number_attempts)
            .field("post_stock_movements", &self.post_stock_movements)
            .finish_non_exhaustive()
    }
}

impl RequestService {
    pub fn new(store: SharedStore, number_attempts: u32, post_stock_movements: bool) -> Self {
        Self {
            store,
            number_attempts: number_attempts.max(1),
            post_stock_movements,
            numbers: Arc::new(|date| generate_request_number(date, &mut rand::thread_rng())),
        }
    }

    /// Replace the request-number source.
    pub fn with_number_generator(mut self, numbers: NumberGenerator) -> Self {
        self.numbers = numbers;
        self
    }

    /// Create a pending request for `actor`.
    #[instrument(skip(self, actor, new), fields(user_id = %actor.user_id, items = new.items.len()), err)]
    pub async fn create(&self, actor: &Principal, new: NewRequest) -> ServiceResult<RequestDetail> {
        let now = Utc::now();
        new.validate(now.date_naive())?;

        let ids: Vec<ProductId> = new.items.iter().map(|i| i.product_id).collect();
        let products = self.store.get_products(&ids).await?;
        for id in &ids {
            match products.get(id) {
                None => return Err(ServiceError::not_found(format!("product {id}"))),
                Some(p) if !p.is_active => {
                    return Err(DomainError::validation(format!("product {id} is not active")).into());
                }
                Some(_) => {}
            }
        }

        for attempt in 1..=self.number_attempts {
            let number = (self.numbers)(now.date_naive());
            if self.store.request_number_exists(&number).await? {
                debug!(attempt, %number, "request number taken, regenerating");
                continue;
            }
            match self.store.insert_request(actor.user_id, &number, &new, now).await {
                Ok((request, items)) => {
                    info!(request_id = %request.id, request_number = %request.request_number, "request created");
                    return Ok(RequestDetail::assemble(request, items, &products));
                }
                Err(StoreError::Duplicate(what)) => {
                    debug!(attempt, %number, %what, "request number collided on insert");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(attempts = self.number_attempts, "could not allocate a unique request number");
        Err(DomainError::conflict("could not allocate a unique request number").into())
    }

    pub async fn get(&self, actor: &Principal, id: RequestId) -> ServiceResult<RequestDetail> {
        let request = self.load(actor, id).await?;
        self.detail(request).await
    }

    pub async fn get_by_number(&self, actor: &Principal, request_number: &str) -> ServiceResult<RequestDetail> {
        let request = self
            .store
            .find_request_by_number(request_number)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("request {request_number}")))?;
        ensure_owner_or_staff(actor, request.user_id, "request")?;
        self.detail(request).await
    }

    /// A `user` only ever sees their own requests, whatever the filter says.
    pub async fn list(&self, actor: &Principal, mut filter: RequestFilter) -> ServiceResult<Vec<Request>> {
        if !actor.is_staff() {
            filter.user_id = Some(actor.user_id);
        }
        Ok(self.store.list_requests(&filter).await?)
    }

    #[instrument(skip(self, actor, approvals), fields(request_id = %id, approved_by = %actor.user_id), err)]
    pub async fn approve(
        &self,
        actor: &Principal,
        id: RequestId,
        approvals: &[ItemApproval],
    ) -> ServiceResult<CommittedTransition> {
        let request = self.load(actor, id).await?;
        let items = self.store.request_items(id).await?;
        let transition = request.approve(&items, approvals, Utc::now())?;
        self.commit(transition).await
    }

    /// Cancel a pending or approved request; a `user` may only cancel their own.
    #[instrument(skip(self, actor, reason), fields(request_id = %id, actor = %actor.user_id), err)]
    pub async fn cancel(
        &self,
        actor: &Principal,
        id: RequestId,
        reason: Option<String>,
    ) -> ServiceResult<CommittedTransition> {
        let request = self.load(actor, id).await?;
        let transition = request.cancel(reason, Utc::now())?;
        self.commit(transition).await
    }

    #[instrument(skip(self, actor), fields(request_id = %id), err)]
    pub async fn begin_collection(&self, actor: &Principal, id: RequestId) -> ServiceResult<CommittedTransition> {
        let request = self.load(actor, id).await?;
        let transition = request.begin_collection(Utc::now())?;
        self.commit(transition).await
    }

    /// Item quantities, status and (optionally) `out` stock rows in one commit.
    #[instrument(skip(self, actor, weights), fields(request_id = %id, entries = weights.len()), err)]
    pub async fn record_delivery(
        &self,
        actor: &Principal,
        id: RequestId,
        weights: &[DeliveryWeight],
    ) -> ServiceResult<CommittedTransition> {
        let request = self.load(actor, id).await?;
        let items = self.store.request_items(id).await?;
        let transition = request.record_delivery(&items, weights, self.policy(actor), Utc::now())?;
        self.commit(transition).await
    }

    #[instrument(skip(self, actor, weights), fields(request_id = %id, entries = weights.len()), err)]
    pub async fn record_return(
        &self,
        actor: &Principal,
        id: RequestId,
        weights: &[ReturnWeight],
    ) -> ServiceResult<CommittedTransition> {
        let request = self.load(actor, id).await?;
        let items = self.store.request_items(id).await?;
        let transition = request.record_return(&items, weights, self.policy(actor), Utc::now())?;
        self.commit(transition).await
    }

    /// Plain move along the status graph.
    #[instrument(skip(self, actor, notes), fields(request_id = %id, target = %target), err)]
    pub async fn update_status(
        &self,
        actor: &Principal,
        id: RequestId,
        target: RequestStatus,
        notes: Option<String>,
    ) -> ServiceResult<CommittedTransition> {
        let request = self.load(actor, id).await?;
        let transition = request.advance(target, notes, Utc::now())?;
        self.commit(transition).await
    }

    pub async fn check_availability(&self, actor: &Principal, id: RequestId) -> ServiceResult<AvailabilityReport> {
        let request = self.load(actor, id).await?;
        let items = self.store.request_items(request.id).await?;
        let products = self.products_for(&items).await?;
        Ok(AvailabilityReport::evaluate(&items, &products))
    }

    pub async fn reconciliation(&self, actor: &Principal, id: RequestId) -> ServiceResult<Vec<ItemReconciliation>> {
        let request = self.load(actor, id).await?;
        let items = self.store.request_items(request.id).await?;
        Ok(reconcile(&items))
    }

    /// Counts over the last 30 days; a `user` gets their own.
    pub async fn statistics(&self, actor: &Principal) -> ServiceResult<RequestStats> {
        let today = Utc::now().date_naive();
        let user = (!actor.is_staff()).then_some(actor.user_id);
        Ok(self
            .store
            .request_stats(user, Some(days_before(today, STATS_WINDOW_DAYS)), today)
            .await?)
    }

    fn policy(&self, actor: &Principal) -> MovementPolicy {
        MovementPolicy {
            post_stock_movements: self.post_stock_movements,
            performed_by: actor.user_id,
        }
    }

    async fn load(&self, actor: &Principal, id: RequestId) -> ServiceResult<Request> {
        let request = self
            .store
            .get_request(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("request {id}")))?;
        ensure_owner_or_staff(actor, request.user_id, "request")?;
        Ok(request)
    }

    async fn detail(&self, request: Request) -> ServiceResult<RequestDetail> {
        let items = self.store.request_items(request.id).await?;
        let products = self.products_for(&items).await?;
        Ok(RequestDetail::assemble(request, items, &products))
    }

    async fn products_for(&self, items: &[RequestItem]) -> ServiceResult<HashMap<ProductId, Product>> {
        let ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
        Ok(self.store.get_products(&ids).await?)
    }

    async fn commit(&self, transition: RequestTransition) -> ServiceResult<CommittedTransition> {
        let id = transition.request.id;
        let target = transition.request.status;
        match self.store.commit_transition(&transition, Utc::now()).await {
            Ok(committed) => {
                info!(
                    request_id = %id,
                    from = %transition.expected_status,
                    to = %target,
                    stock_movements = committed.postings.len(),
                    "request transitioned"
                );
                Ok(committed)
            }
            Err(StoreError::StatusChanged { current }) => Err(DomainError::invalid_state(
                current,
                format!("request {id} changed before it could move to '{target}'"),
            )
            .into()),
            Err(err) => Err(err.into()),
        }
    }
}
