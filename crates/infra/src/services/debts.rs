//! Debt ledger operations.

use chrono::Utc;
use tracing::{info, instrument};

use flowrack_auth::Principal;
use flowrack_core::{DebtId, DomainError};
use flowrack_debts::{Debt, DebtFilter, DebtResolution, NewDebt};

use super::{ServiceError, ServiceResult, ensure_owner_or_staff};
use crate::reports::{DebtStats, STATS_WINDOW_DAYS, days_before};
use crate::store::{SharedStore, StoreError};

#[derive(Clone)]
pub struct DebtService {
    store: SharedStore,
}

impl DebtService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Record a debt. The total is fixed here from the given unit price.
    #[instrument(skip(self, actor, new), fields(user_id = %new.user_id, product_id = %new.product_id, created_by = %actor.user_id), err)]
    pub async fn create(&self, actor: &Principal, new: NewDebt) -> ServiceResult<Debt> {
        new.validate()?;

        if self.store.get_user(new.user_id).await?.is_none() {
            return Err(ServiceError::not_found(format!("user {}", new.user_id)));
        }
        if self.store.get_product(new.product_id).await?.is_none() {
            return Err(ServiceError::not_found(format!("product {}", new.product_id)));
        }
        if let Some(request_id) = new.request_id {
            let request = self
                .store
                .get_request(request_id)
                .await?
                .ok_or_else(|| ServiceError::not_found(format!("request {request_id}")))?;
            if request.user_id != new.user_id {
                return Err(DomainError::validation(format!(
                    "request {request_id} does not belong to user {}",
                    new.user_id
                ))
                .into());
            }
        }

        let debt = self.store.insert_debt(&new, actor.user_id, Utc::now()).await?;
        info!(debt_id = %debt.id, total = %debt.total_amount, "debt recorded");
        Ok(debt)
    }

    pub async fn get(&self, actor: &Principal, id: DebtId) -> ServiceResult<Debt> {
        let debt = self
            .store
            .get_debt(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("debt {id}")))?;
        ensure_owner_or_staff(actor, debt.user_id, "debt")?;
        Ok(debt)
    }

    pub async fn list(&self, actor: &Principal, mut filter: DebtFilter) -> ServiceResult<Vec<Debt>> {
        if !actor.is_staff() {
            filter.user_id = Some(actor.user_id);
        }
        Ok(self.store.list_debts(&filter).await?)
    }

    /// Resolve a pending debt. A second resolution is a state conflict and
    /// leaves the stored record untouched.
    #[instrument(skip(self, actor, resolution), fields(debt_id = %id, status = %resolution.status), err)]
    pub async fn resolve(&self, actor: &Principal, id: DebtId, resolution: DebtResolution) -> ServiceResult<Debt> {
        let current = self.get(actor, id).await?;
        let resolved = current.resolve(&resolution, actor.user_id, Utc::now())?;
        match self.store.store_resolution(&resolved).await {
            Ok(debt) => {
                info!(debt_id = %id, status = %debt.status, "debt resolved");
                Ok(debt)
            }
            Err(StoreError::StatusChanged { current }) => Err(DomainError::invalid_state(
                current,
                format!("debt {id} has already been resolved"),
            )
            .into()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn statistics(&self, actor: &Principal) -> ServiceResult<DebtStats> {
        let user = (!actor.is_staff()).then_some(actor.user_id);
        let since = days_before(Utc::now().date_naive(), STATS_WINDOW_DAYS);
        Ok(self.store.debt_stats(user, Some(since)).await?)
    }
}
