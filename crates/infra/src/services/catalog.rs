//! Product catalog operations.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use flowrack_core::{DomainError, Page, ProductId};
use flowrack_inventory::InventoryTransaction;
use flowrack_products::{NewProduct, Product, ProductFilter, ProductUpdate};

use super::{ServiceError, ServiceResult};
use crate::store::{PendingDemand, SharedStore};

const RECENT_TRANSACTIONS: u32 = 10;

/// Product with its recent ledger rows and outstanding demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub product: Product,
    pub recent_transactions: Vec<InventoryTransaction>,
    pub pending_demand: Vec<PendingDemand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAvailability {
    pub product_id: ProductId,
    pub requested_quantity: Decimal,
    pub current_stock: Decimal,
    pub available: bool,
    pub max_available: Decimal,
}

#[derive(Clone)]
pub struct CatalogService {
    store: SharedStore,
    low_stock_multiplier: Decimal,
}

impl CatalogService {
    pub fn new(store: SharedStore, low_stock_multiplier: Decimal) -> Self {
        Self {
            store,
            low_stock_multiplier,
        }
    }

    /// Initial stock is written as-is; no ledger row is created for it.
    #[instrument(skip(self, new), fields(name = %new.name), err)]
    pub async fn create(&self, new: NewProduct) -> ServiceResult<Product> {
        new.validate()?;
        let product = self.store.insert_product(&new, Utc::now()).await?;
        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    pub async fn get(&self, id: ProductId) -> ServiceResult<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("product {id}")))
    }

    pub async fn detail(&self, id: ProductId) -> ServiceResult<ProductDetail> {
        let product = self.get(id).await?;
        let recent_transactions = self
            .store
            .transactions(id, Page::new(Some(RECENT_TRANSACTIONS), None, RECENT_TRANSACTIONS))
            .await?;
        let pending_demand = self.store.pending_demand(id).await?;
        Ok(ProductDetail {
            product,
            recent_transactions,
            pending_demand,
        })
    }

    pub async fn list(&self, filter: &ProductFilter) -> ServiceResult<Vec<Product>> {
        Ok(self.store.list_products(filter).await?)
    }

    pub async fn categories(&self) -> ServiceResult<Vec<String>> {
        Ok(self.store.categories().await?)
    }

    /// `multiplier` defaults to the configured one.
    pub async fn low_stock(&self, multiplier: Option<Decimal>) -> ServiceResult<Vec<Product>> {
        let multiplier = multiplier.unwrap_or(self.low_stock_multiplier);
        if multiplier < Decimal::ZERO {
            return Err(DomainError::validation("threshold multiplier cannot be negative").into());
        }
        Ok(self.store.low_stock(multiplier).await?)
    }

    #[instrument(skip(self, update), fields(product_id = %id), err)]
    pub async fn update(&self, id: ProductId, update: ProductUpdate) -> ServiceResult<Product> {
        update.validate()?;
        let current = self.get(id).await?;
        let next = current.with_update(&update, Utc::now());
        Ok(self.store.update_product(&next).await?)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    pub async fn deactivate(&self, id: ProductId) -> ServiceResult<Product> {
        let current = self.get(id).await?;
        let product = self.store.update_product(&current.deactivated(Utc::now())).await?;
        info!(product_id = %id, "product deactivated");
        Ok(product)
    }

    pub async fn availability(&self, id: ProductId, requested: Decimal) -> ServiceResult<ProductAvailability> {
        if requested <= Decimal::ZERO {
            return Err(DomainError::validation("requested quantity must be greater than zero").into());
        }
        let product = self.get(id).await?;
        Ok(ProductAvailability {
            product_id: id,
            requested_quantity: requested,
            current_stock: product.stock_quantity,
            available: product.is_available(requested),
            max_available: product.stock_quantity.max(Decimal::ZERO),
        })
    }
}
