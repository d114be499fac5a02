//! Database service for finance-service.

use crate::models::{Connection, Transaction, UpsertConnection, UpsertTransaction};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// Storage contract consumed by the sync engine. Split out as a trait so the
/// engine can run against an in-memory store in tests.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn get_cursor(&self, user_id: &str, item_id: &str) -> Result<Option<String>, AppError>;

    /// Persist the final cursor for a drained sync run. Also refreshes
    /// `last_synced_at`.
    async fn set_cursor(&self, user_id: &str, item_id: &str, cursor: &str)
        -> Result<(), AppError>;

    /// Idempotent batch merge keyed by `plaid_transaction_id`. No-op on empty
    /// input; updates touch only mutable display fields, never the key.
    async fn batch_upsert_transactions(
        &self,
        user_id: &str,
        item_id: &str,
        rows: &[UpsertTransaction],
    ) -> Result<(), AppError>;

    /// Delete by `plaid_transaction_id`. No-op on empty input.
    async fn batch_delete_transactions(&self, ids: &[String]) -> Result<(), AppError>;
}

/// Storage contract consumed by the connection lifecycle manager.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn upsert_connection(&self, input: &UpsertConnection) -> Result<Connection, AppError>;

    async fn get_connection(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<Connection>, AppError>;

    /// Delete a connection and all transactions it owns, returning the revoked
    /// access credential, or `None` when no connection matched.
    async fn delete_connection(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<String>, AppError>;
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "finance-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Connection Operations
    // =========================================================================

    /// Create or update a connection, keyed by `(user_id, item_id)`.
    ///
    /// The access token is always replaced (reconnection stores the fresh
    /// credential); institution name and sync timestamp only overwrite when
    /// the input actually provides them.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, item_id = %input.item_id))]
    pub async fn upsert_connection(
        &self,
        input: &UpsertConnection,
    ) -> Result<Connection, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_connection"])
            .start_timer();

        let connection = sqlx::query_as::<_, Connection>(
            r#"
            INSERT INTO plaid_items (user_id, item_id, access_token, institution_name, last_synced_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, item_id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                institution_name = COALESCE(EXCLUDED.institution_name, plaid_items.institution_name),
                last_synced_at = COALESCE(EXCLUDED.last_synced_at, plaid_items.last_synced_at)
            RETURNING id, user_id, item_id, access_token, institution_name, sync_cursor, last_synced_at, created_at
            "#,
        )
        .bind(&input.user_id)
        .bind(&input.item_id)
        .bind(&input.access_token)
        .bind(&input.institution_name)
        .bind(input.last_synced_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert connection: {}", e)))?;

        timer.observe_duration();
        info!(item_id = %connection.item_id, "Connection upserted");

        Ok(connection)
    }

    /// List all connections for a user, oldest first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_connections(&self, user_id: &str) -> Result<Vec<Connection>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_connections"])
            .start_timer();

        let connections = sqlx::query_as::<_, Connection>(
            r#"
            SELECT id, user_id, item_id, access_token, institution_name, sync_cursor, last_synced_at, created_at
            FROM plaid_items
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list connections: {}", e)))?;

        timer.observe_duration();

        Ok(connections)
    }

    /// Get a single connection owned by a user.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn get_connection(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<Connection>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_connection"])
            .start_timer();

        let connection = sqlx::query_as::<_, Connection>(
            r#"
            SELECT id, user_id, item_id, access_token, institution_name, sync_cursor, last_synced_at, created_at
            FROM plaid_items
            WHERE user_id = $1 AND item_id = $2
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get connection: {}", e)))?;

        timer.observe_duration();

        Ok(connection)
    }

    /// Delete a connection and its transactions in one database transaction.
    /// Returns the access token of the deleted row for credential revocation,
    /// or `None` when nothing matched.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn delete_connection(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<String>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_connection"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query("DELETE FROM transactions WHERE user_id = $1 AND item_id = $2")
            .bind(user_id)
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete transactions: {}", e))
            })?;

        let access_token: Option<String> = sqlx::query_scalar(
            r#"
            DELETE FROM plaid_items
            WHERE user_id = $1 AND item_id = $2
            RETURNING access_token
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete connection: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit deletion: {}", e))
        })?;

        timer.observe_duration();

        if access_token.is_some() {
            info!(item_id = %item_id, "Connection and owned transactions deleted");
        }

        Ok(access_token)
    }

    // =========================================================================
    // Sync Cursor Operations
    // =========================================================================

    /// Read the stored sync cursor. `None` means no sync has completed yet.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn get_cursor(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<String>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_cursor"])
            .start_timer();

        let cursor: Option<Option<String>> = sqlx::query_scalar(
            "SELECT sync_cursor FROM plaid_items WHERE user_id = $1 AND item_id = $2",
        )
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get cursor: {}", e)))?;

        timer.observe_duration();

        Ok(cursor.flatten())
    }

    /// Store the cursor after a fully drained sync run and refresh
    /// `last_synced_at`.
    #[instrument(skip(self, cursor), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn set_cursor(
        &self,
        user_id: &str,
        item_id: &str,
        cursor: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_cursor"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE plaid_items
            SET sync_cursor = $3, last_synced_at = now()
            WHERE user_id = $1 AND item_id = $2
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(cursor)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to set cursor: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Merge a batch of provider transactions. Insert-or-update keyed by
    /// `plaid_transaction_id`; the update never touches the identity key or
    /// ownership columns. All rows land in one database transaction.
    #[instrument(skip(self, rows), fields(user_id = %user_id, item_id = %item_id, rows = rows.len()))]
    pub async fn batch_upsert_transactions(
        &self,
        user_id: &str,
        item_id: &str,
        rows: &[UpsertTransaction],
    ) -> Result<(), AppError> {
        if rows.is_empty() {
            return Ok(());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["batch_upsert_transactions"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO transactions (user_id, item_id, account_id, plaid_transaction_id, name, amount, date, account_name, payment_channel, category)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (plaid_transaction_id) DO UPDATE SET
                    name = EXCLUDED.name,
                    amount = EXCLUDED.amount,
                    date = EXCLUDED.date,
                    account_name = EXCLUDED.account_name,
                    payment_channel = EXCLUDED.payment_channel,
                    category = EXCLUDED.category
                "#,
            )
            .bind(user_id)
            .bind(item_id)
            .bind(&row.account_id)
            .bind(&row.plaid_transaction_id)
            .bind(&row.name)
            .bind(row.amount)
            .bind(row.date)
            .bind(&row.account_name)
            .bind(&row.payment_channel)
            .bind(&row.category)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to upsert transaction: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit upsert batch: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }

    /// Delete transactions by provider id.
    #[instrument(skip(self, ids), fields(ids = ids.len()))]
    pub async fn batch_delete_transactions(&self, ids: &[String]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["batch_delete_transactions"])
            .start_timer();

        sqlx::query("DELETE FROM transactions WHERE plaid_transaction_id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete transactions: {}", e))
            })?;

        timer.observe_duration();

        Ok(())
    }

    /// Recent transactions for a user, newest first (then insertion order).
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_recent_transactions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_recent_transactions"])
            .start_timer();

        let limit = limit.clamp(1, 100);

        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, item_id, account_id, plaid_transaction_id, name, amount, date, account_name, payment_channel, category, created_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY date DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list transactions: {}", e))
        })?;

        timer.observe_duration();

        Ok(transactions)
    }

    /// Transactions feeding the spending summary: user-scoped, optionally
    /// restricted to specific connections, dated on or after `since`.
    #[instrument(skip(self, item_ids), fields(user_id = %user_id, since = %since))]
    pub async fn get_spending_transactions(
        &self,
        user_id: &str,
        item_ids: Option<&[String]>,
        since: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_spending_transactions"])
            .start_timer();

        let item_filter = item_ids.map(|ids| ids.to_vec());

        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, item_id, account_id, plaid_transaction_id, name, amount, date, account_name, payment_channel, category, created_at
            FROM transactions
            WHERE user_id = $1
              AND date >= $2
              AND ($3::text[] IS NULL OR item_id = ANY($3))
            ORDER BY date ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(&item_filter)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load spending transactions: {}", e))
        })?;

        timer.observe_duration();

        Ok(transactions)
    }
}

#[async_trait]
impl SyncStore for Database {
    async fn get_cursor(&self, user_id: &str, item_id: &str) -> Result<Option<String>, AppError> {
        Database::get_cursor(self, user_id, item_id).await
    }

    async fn set_cursor(
        &self,
        user_id: &str,
        item_id: &str,
        cursor: &str,
    ) -> Result<(), AppError> {
        Database::set_cursor(self, user_id, item_id, cursor).await
    }

    async fn batch_upsert_transactions(
        &self,
        user_id: &str,
        item_id: &str,
        rows: &[UpsertTransaction],
    ) -> Result<(), AppError> {
        Database::batch_upsert_transactions(self, user_id, item_id, rows).await
    }

    async fn batch_delete_transactions(&self, ids: &[String]) -> Result<(), AppError> {
        Database::batch_delete_transactions(self, ids).await
    }
}

#[async_trait]
impl ConnectionStore for Database {
    async fn upsert_connection(&self, input: &UpsertConnection) -> Result<Connection, AppError> {
        Database::upsert_connection(self, input).await
    }

    async fn get_connection(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<Connection>, AppError> {
        Database::get_connection(self, user_id, item_id).await
    }

    async fn delete_connection(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<String>, AppError> {
        Database::delete_connection(self, user_id, item_id).await
    }
}
