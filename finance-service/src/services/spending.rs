//! Spending summary bucketing.
//!
//! Spend = positive amounts (provider sign convention: positive leaves the
//! account) whose category is not a non-spending code. Bucketing runs in
//! process over a single user-scoped query.

use crate::models::Transaction;
use chrono::{Datelike, Duration, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

/// Category codes that are money movement or income, not spending.
pub const EXCLUDED_CATEGORIES: [&str; 6] = [
    "INCOME",
    "TRANSFER_IN",
    "TRANSFER_OUT",
    "LOAN_PAYMENTS",
    "BANK_FEES",
    "RENT_AND_UTILITIES",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryPeriod {
    /// Last 7 days, one bucket per day.
    Week,
    /// Last 28 days, one bucket per 7 days.
    Month,
    /// Last 12 calendar months, one bucket per month.
    Year,
}

impl SummaryPeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "week" => Some(SummaryPeriod::Week),
            "month" => Some(SummaryPeriod::Month),
            "year" => Some(SummaryPeriod::Year),
            _ => None,
        }
    }

    /// First date included in the summary window ending at `today`.
    pub fn window_start(self, today: NaiveDate) -> NaiveDate {
        match self {
            SummaryPeriod::Week => today - Duration::days(6),
            SummaryPeriod::Month => today - Duration::days(27),
            SummaryPeriod::Year => {
                let first_of_month = today.with_day(1).unwrap_or(today);
                first_of_month - Months::new(11)
            }
        }
    }
}

/// One bar of the spending chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendingBucket {
    pub label: String,
    pub start_date: NaiveDate,
    pub total: Decimal,
}

/// Whether a transaction counts toward spending.
pub fn is_spending(txn: &Transaction) -> bool {
    txn.amount > Decimal::ZERO
        && txn
            .category
            .as_deref()
            .is_none_or(|c| !EXCLUDED_CATEGORIES.contains(&c))
}

/// Bucket spending totals for the window ending at `today`. Every bucket is
/// emitted, empty ones with a zero total; dates outside the window are
/// ignored.
pub fn bucket_spending(
    transactions: &[Transaction],
    period: SummaryPeriod,
    today: NaiveDate,
) -> Vec<SpendingBucket> {
    let start = period.window_start(today);

    let mut buckets: Vec<SpendingBucket> = match period {
        SummaryPeriod::Week => (0..7)
            .map(|i| {
                let date = start + Duration::days(i);
                SpendingBucket {
                    label: date.format("%a").to_string(),
                    start_date: date,
                    total: Decimal::ZERO,
                }
            })
            .collect(),
        SummaryPeriod::Month => (0..4)
            .map(|i| {
                let date = start + Duration::days(i * 7);
                SpendingBucket {
                    label: date.format("%b %-d").to_string(),
                    start_date: date,
                    total: Decimal::ZERO,
                }
            })
            .collect(),
        SummaryPeriod::Year => (0..12)
            .map(|i| {
                let date = start + Months::new(i);
                SpendingBucket {
                    label: date.format("%b").to_string(),
                    start_date: date,
                    total: Decimal::ZERO,
                }
            })
            .collect(),
    };

    for txn in transactions {
        if !is_spending(txn) || txn.date < start || txn.date > today {
            continue;
        }
        let index = match period {
            SummaryPeriod::Week => (txn.date - start).num_days(),
            SummaryPeriod::Month => (txn.date - start).num_days() / 7,
            SummaryPeriod::Year => {
                let months = (txn.date.year() - start.year()) * 12
                    + (txn.date.month() as i32 - start.month() as i32);
                months as i64
            }
        };
        if let Some(bucket) = buckets.get_mut(index as usize) {
            bucket.total += txn.amount;
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn txn(amount: Decimal, category: Option<&str>, date: NaiveDate) -> Transaction {
        Transaction {
            id: 1,
            user_id: "user-1".to_string(),
            item_id: "item-1".to_string(),
            account_id: "acc-1".to_string(),
            plaid_transaction_id: format!("txn-{}-{}", date, amount),
            name: "Test".to_string(),
            amount,
            date,
            account_name: None,
            payment_channel: None,
            category: category.map(String::from),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn income_and_negative_amounts_are_excluded() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let transactions = vec![
            txn(dec(50), None, today),
            txn(dec(-20), Some("INCOME"), today),
        ];

        let buckets = bucket_spending(&transactions, SummaryPeriod::Week, today);
        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[6].start_date, today);
        assert_eq!(buckets[6].total, dec(50));
        let total: Decimal = buckets.iter().map(|b| b.total).sum();
        assert_eq!(total, dec(50));
    }

    #[test]
    fn transfer_categories_are_excluded_even_when_positive() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let transactions = vec![
            txn(dec(100), Some("TRANSFER_OUT"), today),
            txn(dec(30), Some("FOOD_AND_DRINK"), today),
        ];

        let buckets = bucket_spending(&transactions, SummaryPeriod::Week, today);
        assert_eq!(buckets[6].total, dec(30));
    }

    #[test]
    fn week_buckets_cover_the_last_seven_days() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let six_days_ago = today - Duration::days(6);
        let seven_days_ago = today - Duration::days(7);
        let transactions = vec![
            txn(dec(10), None, six_days_ago),
            txn(dec(99), None, seven_days_ago),
        ];

        let buckets = bucket_spending(&transactions, SummaryPeriod::Week, today);
        assert_eq!(buckets[0].total, dec(10));
        let total: Decimal = buckets.iter().map(|b| b.total).sum();
        assert_eq!(total, dec(10), "out-of-window spend must be dropped");
    }

    #[test]
    fn month_buckets_are_weekly() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 28).unwrap();
        let start = SummaryPeriod::Month.window_start(today);
        let transactions = vec![
            txn(dec(5), None, start),
            txn(dec(7), None, start + Duration::days(6)),
            txn(dec(11), None, start + Duration::days(7)),
            txn(dec(13), None, today),
        ];

        let buckets = bucket_spending(&transactions, SummaryPeriod::Month, today);
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0].total, dec(12));
        assert_eq!(buckets[1].total, dec(11));
        assert_eq!(buckets[3].total, dec(13));
    }

    #[test]
    fn year_buckets_follow_calendar_months() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let transactions = vec![
            txn(dec(40), None, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            txn(dec(25), None, NaiveDate::from_ymd_opt(2024, 7, 20).unwrap()),
            txn(dec(60), None, NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()),
        ];

        let buckets = bucket_spending(&transactions, SummaryPeriod::Year, today);
        assert_eq!(buckets.len(), 12);
        assert_eq!(buckets[0].label, "Jul");
        assert_eq!(buckets[0].total, dec(25));
        assert_eq!(buckets[11].label, "Jun");
        assert_eq!(buckets[11].total, dec(40));
        let total: Decimal = buckets.iter().map(|b| b.total).sum();
        assert_eq!(total, dec(65), "dates before the window start are dropped");
    }

    #[test]
    fn invalid_period_does_not_parse() {
        assert_eq!(SummaryPeriod::parse("week"), Some(SummaryPeriod::Week));
        assert_eq!(SummaryPeriod::parse("decade"), None);
    }
}
