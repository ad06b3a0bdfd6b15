//! Infrastructure layer: configuration, storage adapters, read-side reports
//! and the service layer that ties domain functions to storage.

pub mod config;
pub mod reports;
pub mod services;
pub mod store;

mod integration_tests;

pub use config::{AppConfig, BootstrapAdmin, ConfigError};
pub use services::{ServiceError, ServiceResult, Services};
pub use store::{InMemoryStore, PostgresStore, Store, StoreError, StoreResult};
