//! SQLite Cash Ledger
//!
//! Per-currency balances with a version column. A transfer debits and
//! credits inside one transaction, and the debit only applies when the
//! source row still has the version that was checked.

use super::models::CashBalanceRecord;
use super::DbPool;
use crate::domain::errors::LedgerError;
use crate::domain::repositories::CashLedger;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, error, info};

pub struct SqliteCashLedger {
    pool: DbPool,
}

impl SqliteCashLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn storage_error(context: &str, e: sqlx::Error) -> LedgerError {
        error!("{}: {}", context, e);
        LedgerError::Storage(format!("{}: {}", context, e))
    }

    /// Add `amount` to the balance of `currency`
    pub async fn deposit(&self, currency: &str, amount: f64) -> Result<(), LedgerError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        sqlx::query(
            r#"
            INSERT INTO cash_balances (currency, amount, version, updated_at) VALUES (?1, ?2, 0, ?3)
            ON CONFLICT(currency) DO UPDATE SET
                amount = amount + excluded.amount,
                version = version + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(currency)
        .bind(amount)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::storage_error("Failed to deposit", e))?;

        info!(currency = %currency, amount, "Deposited cash");
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<CashBalanceRecord>, LedgerError> {
        sqlx::query_as::<_, CashBalanceRecord>("SELECT * FROM cash_balances ORDER BY currency")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::storage_error("Failed to read balances", e))
    }
}

#[async_trait]
impl CashLedger for SqliteCashLedger {
    async fn balance(&self, currency: &str) -> Result<f64, LedgerError> {
        let row: Option<(f64,)> = sqlx::query_as("SELECT amount FROM cash_balances WHERE currency = ?1")
            .bind(currency)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::storage_error("Failed to read balance", e))?;

        Ok(row.map(|(amount,)| amount).unwrap_or(0.0))
    }

    async fn balances(&self) -> Result<HashMap<String, f64>, LedgerError> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|record| record.amount != 0.0)
            .map(|record| (record.currency, record.amount))
            .collect())
    }

    async fn transfer(
        &self,
        from_currency: &str,
        from_amount: f64,
        to_currency: &str,
        to_amount: f64,
    ) -> Result<(), LedgerError> {
        for amount in [from_amount, to_amount] {
            if !amount.is_finite() || amount <= 0.0 {
                return Err(LedgerError::InvalidAmount(amount));
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::storage_error("Failed to begin transfer", e))?;

        let source: Option<(f64, i64)> =
            sqlx::query_as("SELECT amount, version FROM cash_balances WHERE currency = ?1")
                .bind(from_currency)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| Self::storage_error("Failed to read source balance", e))?;

        let (available, version) = source.unwrap_or((0.0, 0));
        if available < from_amount {
            return Err(LedgerError::InsufficientFunds {
                currency: from_currency.to_string(),
                required: from_amount,
                available,
            });
        }

        let now = Utc::now();
        let debited = sqlx::query(
            r#"
            UPDATE cash_balances
            SET amount = amount - ?1, version = version + 1, updated_at = ?2
            WHERE currency = ?3 AND version = ?4
            "#,
        )
        .bind(from_amount)
        .bind(now)
        .bind(from_currency)
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::storage_error("Failed to debit source balance", e))?
        .rows_affected();

        if debited == 0 {
            return Err(LedgerError::Conflict(from_currency.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO cash_balances (currency, amount, version, updated_at) VALUES (?1, ?2, 0, ?3)
            ON CONFLICT(currency) DO UPDATE SET
                amount = amount + excluded.amount,
                version = version + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(to_currency)
        .bind(to_amount)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::storage_error("Failed to credit target balance", e))?;

        tx.commit()
            .await
            .map_err(|e| Self::storage_error("Failed to commit transfer", e))?;

        debug!(
            "Transferred {:.2} {} -> {:.2} {}",
            from_amount, from_currency, to_amount, to_currency
        );
        Ok(())
    }
}
