//! Plaid aggregation provider client.
//!
//! Wraps the provider REST API behind the `PlaidApi` capability trait so the
//! sync engine and lifecycle manager can be driven by fakes in tests.

use crate::config::PlaidConfig;
use crate::models::{
    ExchangedItem, HoldingsResponse, ProviderAccount, ProviderErrorBody, TransactionsSyncPage,
};
use crate::services::metrics::record_provider_request;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use service_core::error::AppError;
use std::time::Duration;

/// Provider error code signalling that the stored credential can no longer
/// fetch data without interactive user action.
pub const REAUTH_ERROR_CODE: &str = "ITEM_LOGIN_REQUIRED";

/// Holdings error codes that mean "this connection has no investment data",
/// not "something went wrong".
pub const NO_HOLDINGS_ERROR_CODES: [&str; 2] = ["PRODUCTS_NOT_SUPPORTED", "NO_INVESTMENT_ACCOUNTS"];

/// Capability interface over the aggregation provider. Each operation fails
/// independently; callers decide which failures are fatal.
#[async_trait]
pub trait PlaidApi: Send + Sync {
    /// Create a link-initialization token for a new connection flow.
    async fn create_link_token(&self, user_id: &str) -> Result<String, AppError>;

    /// Create a link token in update mode, bound to an existing credential,
    /// for the reconnection flow.
    async fn create_update_link_token(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<String, AppError>;

    /// Exchange a temporary public token for a durable access credential.
    async fn exchange_public_token(&self, public_token: &str) -> Result<ExchangedItem, AppError>;

    /// Fetch account metadata for a connection.
    async fn get_accounts(&self, access_token: &str) -> Result<Vec<ProviderAccount>, AppError>;

    /// Fetch accounts with live balances.
    async fn get_balances(&self, access_token: &str) -> Result<Vec<ProviderAccount>, AppError>;

    /// Fetch investment holdings with their accounts and securities.
    async fn get_holdings(&self, access_token: &str) -> Result<HoldingsResponse, AppError>;

    /// Fetch one page of transaction changes. `cursor` is omitted from the
    /// request entirely when `None`: the provider distinguishes "no cursor"
    /// (full history) from an empty cursor string.
    async fn sync_transactions(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionsSyncPage, AppError>;

    /// Revoke an access credential.
    async fn remove_item(&self, access_token: &str) -> Result<(), AppError>;
}

/// Plaid client for interacting with the Plaid API.
#[derive(Clone)]
pub struct PlaidClient {
    client: reqwest::Client,
    config: PlaidConfig,
}

#[derive(Debug, Deserialize)]
struct LinkTokenResponse {
    link_token: String,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<ProviderAccount>,
}

impl PlaidClient {
    /// Create a new Plaid client with an explicit request timeout.
    pub fn new(config: PlaidConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Check if Plaid is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty() && !self.config.secret.expose_secret().is_empty()
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
        operation: &'static str,
    ) -> Result<T, AppError> {
        if !self.is_configured() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Plaid credentials not configured"
            )));
        }

        let url = format!("{}{}", self.config.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("PLAID-CLIENT-ID", &self.config.client_id)
            .header("PLAID-SECRET", self.config.secret.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                record_provider_request(operation, "error");
                if e.is_timeout() {
                    AppError::ProviderTimeout(format!("{} timed out", operation))
                } else {
                    AppError::ProviderError {
                        code: "NETWORK_ERROR".to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            record_provider_request(operation, "error");
            AppError::ProviderError {
                code: "NETWORK_ERROR".to_string(),
                message: e.to_string(),
            }
        })?;

        tracing::debug!(operation = operation, status = %status, "Plaid response");

        if status.is_success() {
            record_provider_request(operation, "ok");
            serde_json::from_str(&text).map_err(|e| AppError::ProviderError {
                code: "MALFORMED_RESPONSE".to_string(),
                message: e.to_string(),
            })
        } else {
            record_provider_request(operation, "error");
            let err = provider_error_from_body(&text);
            tracing::error!(operation = operation, error = %err, "Plaid request failed");
            Err(err)
        }
    }
}

/// Map a provider error envelope to the error taxonomy. The reauth-required
/// code is distinguished so callers can prompt reconnection instead of retry.
fn provider_error_from_body(body: &str) -> AppError {
    let envelope: ProviderErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = envelope
        .error_code
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let message = envelope
        .error_message
        .or(envelope.display_message)
        .unwrap_or_else(|| body.to_string());

    if code == REAUTH_ERROR_CODE {
        AppError::ReauthRequired { code, message }
    } else {
        AppError::ProviderError { code, message }
    }
}

/// Build the transactions-sync request body. The cursor key is absent (not
/// empty) on a first sync.
fn sync_request_body(access_token: &str, cursor: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({ "access_token": access_token });
    if let Some(cursor) = cursor {
        body["cursor"] = serde_json::Value::String(cursor.to_string());
    }
    body
}

#[async_trait]
impl PlaidApi for PlaidClient {
    async fn create_link_token(&self, user_id: &str) -> Result<String, AppError> {
        let body = serde_json::json!({
            "user": { "client_user_id": user_id },
            "client_name": self.config.client_name,
            "products": ["transactions", "investments"],
            "country_codes": ["US"],
            "language": "en",
        });
        let response: LinkTokenResponse =
            self.post("/link/token/create", body, "link_token_create").await?;
        Ok(response.link_token)
    }

    async fn create_update_link_token(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<String, AppError> {
        let body = serde_json::json!({
            "user": { "client_user_id": user_id },
            "client_name": self.config.client_name,
            "access_token": access_token,
            "country_codes": ["US"],
            "language": "en",
        });
        let response: LinkTokenResponse =
            self.post("/link/token/create", body, "link_token_update").await?;
        Ok(response.link_token)
    }

    async fn exchange_public_token(&self, public_token: &str) -> Result<ExchangedItem, AppError> {
        let body = serde_json::json!({ "public_token": public_token });
        let item: ExchangedItem = self
            .post("/item/public_token/exchange", body, "public_token_exchange")
            .await?;
        tracing::info!(item_id = %item.item_id, "Public token exchanged");
        Ok(item)
    }

    async fn get_accounts(&self, access_token: &str) -> Result<Vec<ProviderAccount>, AppError> {
        let body = serde_json::json!({ "access_token": access_token });
        let response: AccountsResponse = self.post("/accounts/get", body, "accounts_get").await?;
        Ok(response.accounts)
    }

    async fn get_balances(&self, access_token: &str) -> Result<Vec<ProviderAccount>, AppError> {
        let body = serde_json::json!({ "access_token": access_token });
        let response: AccountsResponse =
            self.post("/accounts/balance/get", body, "balances_get").await?;
        Ok(response.accounts)
    }

    async fn get_holdings(&self, access_token: &str) -> Result<HoldingsResponse, AppError> {
        let body = serde_json::json!({ "access_token": access_token });
        self.post("/investments/holdings/get", body, "holdings_get")
            .await
    }

    async fn sync_transactions(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionsSyncPage, AppError> {
        let body = sync_request_body(access_token, cursor);
        self.post("/transactions/sync", body, "transactions_sync")
            .await
    }

    async fn remove_item(&self, access_token: &str) -> Result<(), AppError> {
        let body = serde_json::json!({ "access_token": access_token });
        let _: serde_json::Value = self.post("/item/remove", body, "item_remove").await?;
        Ok(())
    }
}
