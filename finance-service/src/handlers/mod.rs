pub mod accounts;
pub mod connections;
pub mod investments;
pub mod link;
pub mod metrics;
pub mod spending;
pub mod transactions;
