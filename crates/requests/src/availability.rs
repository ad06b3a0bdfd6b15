//! Read-only views over a request's items: stock availability and
//! delivered/returned reconciliation. Neither reserves stock nor creates debts.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use flowrack_core::{ProductId, RequestItemId};
use flowrack_products::Product;

use crate::request::RequestItem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAvailability {
    pub item_id: RequestItemId,
    pub product_id: ProductId,
    pub requested: Decimal,
    /// `None` when the product no longer exists.
    pub in_stock: Option<Decimal>,
    pub available: bool,
}

/// Point-in-time availability; may be stale by the time stock is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub all_available: bool,
    pub items: Vec<ItemAvailability>,
}

impl AvailabilityReport {
    /// Each item is checked on its own against current stock.
    pub fn evaluate(items: &[RequestItem], products: &HashMap<ProductId, Product>) -> Self {
        let items: Vec<ItemAvailability> = items
            .iter()
            .map(|item| {
                let product = products.get(&item.product_id);
                ItemAvailability {
                    item_id: item.id,
                    product_id: item.product_id,
                    requested: item.requested_quantity,
                    in_stock: product.map(|p| p.stock_quantity),
                    available: product.is_some_and(|p| p.is_available(item.requested_quantity)),
                }
            })
            .collect();

        Self {
            all_available: items.iter().all(|i| i.available),
            items,
        }
    }
}

/// Delivered versus returned for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReconciliation {
    pub item_id: RequestItemId,
    pub product_id: ProductId,
    pub requested_quantity: Decimal,
    pub approved_quantity: Option<Decimal>,
    pub delivered_quantity: Decimal,
    pub returned_quantity: Decimal,
    /// Delivered but not (yet) returned.
    pub outstanding_quantity: Decimal,
    pub weight_difference: Option<Decimal>,
}

pub fn reconcile(items: &[RequestItem]) -> Vec<ItemReconciliation> {
    items
        .iter()
        .map(|item| {
            let delivered = item.delivered_quantity.unwrap_or_default();
            let returned = item.returned_quantity.unwrap_or_default();
            let weight_difference = match (item.delivered_weight, item.returned_weight) {
                (Some(out), Some(back)) => Some(out - back),
                (Some(out), None) => Some(out),
                _ => None,
            };
            ItemReconciliation {
                item_id: item.id,
                product_id: item.product_id,
                requested_quantity: item.requested_quantity,
                approved_quantity: item.approved_quantity,
                delivered_quantity: delivered,
                returned_quantity: returned,
                outstanding_quantity: delivered - returned,
                weight_difference,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::tests::stored;
    use chrono::Utc;
    use flowrack_products::NewProduct;

    fn stocked(id: i64, qty: i64) -> Product {
        NewProduct {
            name: format!("P{id}"),
            unit_of_measure: "pcs".to_string(),
            description: None,
            category: None,
            stock_quantity: Decimal::from(qty),
            minimum_stock: Decimal::ZERO,
            unit_price: None,
            location: None,
        }
        .into_product(ProductId::new(id), Utc::now())
    }

    #[test]
    fn each_item_checked_independently() {
        let (_, items) = stored(&[(1, 5), (2, 3)]);
        let products: HashMap<ProductId, Product> =
            [stocked(1, 5), stocked(2, 2)].into_iter().map(|p| (p.id, p)).collect();

        let report = AvailabilityReport::evaluate(&items, &products);
        assert!(!report.all_available);
        assert!(report.items[0].available);
        assert!(!report.items[1].available);
        assert_eq!(report.items[1].in_stock, Some(Decimal::from(2)));
    }

    #[test]
    fn missing_product_is_unavailable() {
        let (_, items) = stored(&[(1, 1)]);
        let report = AvailabilityReport::evaluate(&items, &HashMap::new());
        assert!(!report.all_available);
        assert_eq!(report.items[0].in_stock, None);
    }

    #[test]
    fn reconciliation_reports_outstanding_quantities() {
        let (_, mut items) = stored(&[(1, 5), (2, 3)]);
        items[0].delivered_quantity = Some(Decimal::from(5));
        items[0].delivered_weight = Some(Decimal::new(125, 1));
        items[0].returned_quantity = Some(Decimal::from(3));
        items[0].returned_weight = Some(Decimal::new(75, 1));

        let rows = reconcile(&items);
        assert_eq!(rows[0].outstanding_quantity, Decimal::from(2));
        assert_eq!(rows[0].weight_difference, Some(Decimal::from(5)));
        assert_eq!(rows[1].outstanding_quantity, Decimal::ZERO);
        assert_eq!(rows[1].weight_difference, None);
    }
}
