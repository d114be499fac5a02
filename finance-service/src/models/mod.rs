//! Domain models for finance-service.

pub mod connection;
pub mod provider;
pub mod transaction;

pub use connection::{Connection, UpsertConnection};
pub use provider::{
    AccountBalances, ExchangedItem, HoldingsResponse, PersonalFinanceCategory, ProviderAccount,
    ProviderErrorBody, ProviderHolding, ProviderSecurity, ProviderTransaction, RemovedTransaction,
    TransactionsSyncPage,
};
pub use transaction::{Transaction, UpsertTransaction};
