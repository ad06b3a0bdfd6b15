//! Stock Ledger operations.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use flowrack_auth::Principal;
use flowrack_core::{Page, ProductId};
use flowrack_inventory::{InventoryTransaction, StockAdjustment, StockReference, TransactionType, check_availability};

use super::{ServiceError, ServiceResult};
use crate::store::{PostedAdjustment, SharedStore};

pub const HISTORY_DEFAULT_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct LedgerService {
    store: SharedStore,
    low_stock_multiplier: Decimal,
}

impl LedgerService {
    pub fn new(store: SharedStore, low_stock_multiplier: Decimal) -> Self {
        Self {
            store,
            low_stock_multiplier,
        }
    }

    /// Manual stock movement by an operator. Returns the stored product and
    /// its new ledger row; no floor is enforced.
    #[instrument(skip(self, actor, notes), fields(actor = %actor.user_id), err)]
    pub async fn adjust(
        &self,
        actor: &Principal,
        product_id: ProductId,
        transaction_type: TransactionType,
        quantity: Decimal,
        notes: Option<String>,
    ) -> ServiceResult<PostedAdjustment> {
        let adjustment = StockAdjustment::new(
            product_id,
            transaction_type,
            quantity,
            StockReference::manual(),
            actor.user_id,
            notes,
        )?;
        let posted = self.store.apply_adjustment(&adjustment, Utc::now()).await?;

        info!(
            product_id = %product_id,
            previous = %posted.transaction.previous_quantity,
            new = %posted.transaction.new_quantity,
            "stock adjusted"
        );
        if self.is_low(&posted) {
            warn!(product_id = %product_id, stock = %posted.product.stock_quantity, "product at or below minimum stock");
        }
        Ok(posted)
    }

    /// Ledger rows for a product, newest first.
    pub async fn history(&self, product_id: ProductId, page: Page) -> ServiceResult<Vec<InventoryTransaction>> {
        if self.store.get_product(product_id).await?.is_none() {
            return Err(ServiceError::not_found(format!("product {product_id}")));
        }
        Ok(self.store.transactions(product_id, page).await?)
    }

    /// Advisory: reads current stock, reserves nothing.
    pub async fn check_availability(&self, product_id: ProductId, requested: Decimal) -> ServiceResult<bool> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("product {product_id}")))?;
        Ok(check_availability(&product, requested))
    }

    pub fn is_low(&self, posted: &PostedAdjustment) -> bool {
        posted.product.is_active && posted.product.is_low_stock(self.low_stock_multiplier)
    }
}
