//! Wire types for the aggregation provider API.
//!
//! Shapes mirror the provider's JSON responses; unknown fields are ignored so
//! upstream additions do not break deserialization.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Result of exchanging a public link token for a durable item.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangedItem {
    pub access_token: String,
    pub item_id: String,
}

/// Account metadata, optionally with balances depending on the endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderAccount {
    pub account_id: String,
    pub name: Option<String>,
    pub official_name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub subtype: Option<String>,
    pub balances: Option<AccountBalances>,
}

impl ProviderAccount {
    /// Display label: name, then official name, then subtype, then a generic
    /// placeholder. Empty strings count as absent.
    pub fn display_name(&self) -> String {
        [&self.name, &self.official_name, &self.subtype]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "Account".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountBalances {
    pub current: Option<Decimal>,
    pub available: Option<Decimal>,
    pub iso_currency_code: Option<String>,
}

/// One page of the cursor-paginated transaction change feed.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionsSyncPage {
    #[serde(default)]
    pub added: Vec<ProviderTransaction>,
    #[serde(default)]
    pub modified: Vec<ProviderTransaction>,
    #[serde(default)]
    pub removed: Vec<RemovedTransaction>,
    pub next_cursor: String,
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTransaction {
    pub transaction_id: String,
    pub account_id: String,
    pub name: Option<String>,
    pub merchant_name: Option<String>,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub payment_channel: Option<String>,
    pub personal_finance_category: Option<PersonalFinanceCategory>,
}

impl ProviderTransaction {
    /// Display label: name, then merchant name, then a generic placeholder.
    pub fn display_name(&self) -> String {
        [&self.name, &self.merchant_name]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "Transaction".to_string())
    }

    /// Provider-assigned spending category code, when present.
    pub fn category_code(&self) -> Option<String> {
        self.personal_finance_category
            .as_ref()
            .and_then(|c| c.primary.clone())
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonalFinanceCategory {
    pub primary: Option<String>,
    pub detailed: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemovedTransaction {
    pub transaction_id: String,
}

/// Investment holdings with the accounts and securities they reference.
#[derive(Debug, Clone, Deserialize)]
pub struct HoldingsResponse {
    #[serde(default)]
    pub accounts: Vec<ProviderAccount>,
    #[serde(default)]
    pub holdings: Vec<ProviderHolding>,
    #[serde(default)]
    pub securities: Vec<ProviderSecurity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderHolding {
    pub account_id: String,
    pub security_id: String,
    pub quantity: Option<Decimal>,
    pub institution_value: Option<Decimal>,
    pub cost_basis: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSecurity {
    pub security_id: String,
    pub name: Option<String>,
    pub ticker_symbol: Option<String>,
    #[serde(rename = "type")]
    pub security_type: Option<String>,
    pub close_price: Option<Decimal>,
}

/// Provider error envelope returned on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderErrorBody {
    pub error_type: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub display_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_display_name_falls_through_empty_strings() {
        let account = ProviderAccount {
            account_id: "acc-1".to_string(),
            name: Some("".to_string()),
            official_name: Some("Premier Checking".to_string()),
            account_type: Some("depository".to_string()),
            subtype: Some("checking".to_string()),
            balances: None,
        };
        assert_eq!(account.display_name(), "Premier Checking");
    }

    #[test]
    fn account_display_name_placeholder_when_nothing_set() {
        let account = ProviderAccount {
            account_id: "acc-1".to_string(),
            name: None,
            official_name: None,
            account_type: None,
            subtype: None,
            balances: None,
        };
        assert_eq!(account.display_name(), "Account");
    }

    #[test]
    fn transaction_display_name_prefers_name_then_merchant() {
        let json = r#"{
            "transaction_id": "txn-1",
            "account_id": "acc-1",
            "name": null,
            "merchant_name": "Blue Bottle Coffee",
            "amount": 4.25,
            "date": "2025-03-14",
            "payment_channel": "in store",
            "personal_finance_category": { "primary": "FOOD_AND_DRINK", "detailed": null }
        }"#;
        let txn: ProviderTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(txn.display_name(), "Blue Bottle Coffee");
        assert_eq!(txn.category_code().as_deref(), Some("FOOD_AND_DRINK"));
    }

    #[test]
    fn sync_page_defaults_missing_change_sets_to_empty() {
        let json = r#"{ "next_cursor": "cursor-1", "has_more": false }"#;
        let page: TransactionsSyncPage = serde_json::from_str(json).unwrap();
        assert!(page.added.is_empty());
        assert!(page.modified.is_empty());
        assert!(page.removed.is_empty());
        assert_eq!(page.next_cursor, "cursor-1");
        assert!(!page.has_more);
    }
}
