//! `flowrack-debts`: monetary obligations raised against users for missing
//! or damaged stock.

pub mod debt;

pub use debt::{Debt, DebtFilter, DebtResolution, DebtStatus, DebtType, NewDebt};
