//! Services module for finance-service.

pub mod connections;
pub mod database;
pub mod metrics;
pub mod plaid;
pub mod spending;
pub mod sync;
pub mod token;

pub use connections::{ConnectionService, LinkOutcome};
pub use database::{ConnectionStore, Database, SyncStore};
pub use metrics::{get_metrics, init_metrics};
pub use plaid::{PlaidApi, PlaidClient, NO_HOLDINGS_ERROR_CODES, REAUTH_ERROR_CODE};
pub use spending::{bucket_spending, SpendingBucket, SummaryPeriod};
pub use sync::{SyncEngine, SyncSummary};
pub use token::{JwtVerifier, TokenVerifier};
