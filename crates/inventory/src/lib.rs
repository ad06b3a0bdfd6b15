//! `flowrack-inventory`: the stock ledger.
//!
//! Stock quantity and the append-only transaction log move together: every
//! posting yields the next product value *and* the log row that justifies it.

pub mod ledger;

pub use ledger::{
    InventoryTransaction, NewInventoryTransaction, ReferenceType, StockAdjustment, StockPosting,
    StockReference, TransactionType, check_availability, post, replay,
};
