//! `flowrack-products`: product catalog records and catalog queries.

pub mod catalog;
pub mod product;

pub use catalog::{ProductFilter, by_scarcity, distinct_categories, low_stock};
pub use product::{NewProduct, Product, ProductUpdate, StockStatus};
