//! Catalog queries shared by the in-memory store and the read side.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use flowrack_core::Page;

use crate::product::Product;

/// Listing filter for the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    /// Case-insensitive substring over name, description and category.
    pub search: Option<String>,
    pub active_only: bool,
    pub page: Page,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            category: None,
            search: None,
            active_only: true,
            page: Page::default(),
        }
    }
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if self.active_only && !product.is_active {
            return false;
        }
        if let Some(category) = &self.category {
            if product.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let hit = |field: Option<&str>| field.is_some_and(|f| f.to_lowercase().contains(&needle));
            if !(hit(Some(product.name.as_str()))
                || hit(product.description.as_deref())
                || hit(product.category.as_deref()))
            {
                return false;
            }
        }
        true
    }

    /// Filter, order by name and paginate.
    pub fn apply<'a>(&self, products: impl IntoIterator<Item = &'a Product>) -> Vec<Product> {
        let mut hits: Vec<&Product> = products.into_iter().filter(|p| self.matches(p)).collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        self.page.slice(hits.into_iter().cloned())
    }
}

/// Most scarce first; ties broken by name.
pub fn by_scarcity(a: &Product, b: &Product) -> Ordering {
    a.scarcity_ratio()
        .cmp(&b.scarcity_ratio())
        .then_with(|| a.name.cmp(&b.name))
}

/// Active products at or below `minimum_stock * multiplier`, most scarce first.
pub fn low_stock<'a>(
    products: impl IntoIterator<Item = &'a Product>,
    multiplier: Decimal,
) -> Vec<Product> {
    let mut hits: Vec<Product> = products
        .into_iter()
        .filter(|p| p.is_active && p.is_low_stock(multiplier))
        .cloned()
        .collect();
    hits.sort_by(by_scarcity);
    hits
}

/// Sorted, de-duplicated categories of active products.
pub fn distinct_categories<'a>(products: impl IntoIterator<Item = &'a Product>) -> Vec<String> {
    products
        .into_iter()
        .filter(|p| p.is_active)
        .filter_map(|p| p.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::tests::{product, test_time};

    #[test]
    fn low_stock_orders_by_scarcity() {
        let catalog = vec![
            product(1, "Cable", 15, 10), // ratio 1.5
            product(2, "Drill", 2, 10),  // ratio 0.2
            product(3, "Gloves", 0, 0),  // ratio 0 (minimum treated as 1)
            product(4, "Helmet", 80, 15),
        ];
        let names: Vec<String> = low_stock(&catalog, Decimal::new(15, 1))
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Gloves", "Drill", "Cable"]);

        let strict: Vec<String> = low_stock(&catalog, Decimal::ONE).into_iter().map(|p| p.name).collect();
        assert_eq!(strict, vec!["Gloves", "Drill"]);
    }

    #[test]
    fn low_stock_skips_inactive_products() {
        let catalog = vec![product(1, "Drill", 1, 10).deactivated(test_time())];
        assert!(low_stock(&catalog, Decimal::ONE).is_empty());
    }

    #[test]
    fn filter_searches_name_description_and_category() {
        let mut tape = product(1, "Tape", 5, 1);
        tape.description = Some("Insulating tape for wiring".to_string());
        tape.category = Some("Electrical".to_string());
        let drill = product(2, "Drill", 5, 1);

        let catalog = vec![drill, tape];
        let filter = ProductFilter {
            search: Some("WIRING".to_string()),
            ..ProductFilter::default()
        };
        let hits = filter.apply(&catalog);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Tape");

        let filter = ProductFilter {
            category: Some("Tools".to_string()),
            ..ProductFilter::default()
        };
        assert_eq!(filter.apply(&catalog)[0].name, "Drill");
    }

    #[test]
    fn filter_orders_by_name_and_paginates() {
        let catalog = vec![product(1, "C", 1, 0), product(2, "A", 1, 0), product(3, "B", 1, 0)];
        let filter = ProductFilter {
            page: Page::new(Some(2), Some(1), 50),
            ..ProductFilter::default()
        };
        let names: Vec<String> = filter.apply(&catalog).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["B", "C"]);
    }

    #[test]
    fn inactive_products_hidden_unless_requested() {
        let catalog = vec![product(1, "Drill", 1, 0).deactivated(test_time())];
        assert!(ProductFilter::default().apply(&catalog).is_empty());
        let all = ProductFilter {
            active_only: false,
            ..ProductFilter::default()
        };
        assert_eq!(all.apply(&catalog).len(), 1);
    }

    #[test]
    fn categories_are_sorted_and_unique() {
        let mut a = product(1, "A", 1, 0);
        a.category = Some("Safety".to_string());
        let mut b = product(2, "B", 1, 0);
        b.category = Some("Electrical".to_string());
        let mut c = product(3, "C", 1, 0);
        c.category = Some("Safety".to_string());
        let mut d = product(4, "D", 1, 0);
        d.category = None;
        assert_eq!(distinct_categories(&[a, b, c, d]), vec!["Electrical", "Safety"]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: every low-stock hit satisfies the threshold and hits come out most scarce first.
            #[test]
            fn low_stock_is_filtered_and_sorted(
                levels in prop::collection::vec((-20i64..200, 0i64..50), 0..30),
                multiplier_tenths in 0i64..40
            ) {
                let catalog: Vec<Product> = levels
                    .iter()
                    .enumerate()
                    .map(|(i, (stock, min))| product(i as i64 + 1, &format!("P{i:02}"), *stock, *min))
                    .collect();
                let multiplier = Decimal::new(multiplier_tenths, 1);
                let hits = low_stock(&catalog, multiplier);

                let expected = catalog.iter().filter(|p| p.is_low_stock(multiplier)).count();
                prop_assert_eq!(hits.len(), expected);
                for pair in hits.windows(2) {
                    prop_assert!(pair[0].scarcity_ratio() <= pair[1].scarcity_ratio());
                }
            }
        }
    }
}
