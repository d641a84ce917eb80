//! Wallet manager implementation: balances plus an append-only journal.

use super::{
    errors::{WalletError, WalletResult},
    models::{EntryDirection, EntryType, Posting, Wallet, WalletEntry},
};
use crate::db::{begin_write, is_unique_violation};
use crate::users::UserId;
use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Wallet manager
#[derive(Clone)]
pub struct WalletManager {
    pool: Arc<SqlitePool>,
}

impl WalletManager {
    /// Create a new wallet manager
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Get wallet for a user
    ///
    /// # Returns
    ///
    /// * `WalletResult<Wallet>` - Wallet information or error
    pub async fn get_wallet(&self, user_id: UserId) -> WalletResult<Wallet> {
        let row = sqlx::query(
            r#"
            SELECT user_id, balance, currency, created_at, updated_at
            FROM wallets
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or(WalletError::WalletNotFound(user_id))?;

        Ok(Wallet {
            user_id: row.get("user_id"),
            balance: row.get("balance"),
            currency: row.get("currency"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Current balance; a user without a wallet has zero
    pub async fn balance(&self, user_id: UserId) -> WalletResult<i64> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.map_or(0, |r| r.get("balance")))
    }

    /// Credit a wallet outside of any tournament flow
    ///
    /// # Errors
    ///
    /// * `WalletError::DuplicateTransaction` - Idempotency key already used
    pub async fn deposit(
        &self,
        user_id: UserId,
        amount: i64,
        idempotency_key: String,
    ) -> WalletResult<i64> {
        let mut tx = begin_write(&self.pool).await?;
        let balance = self
            .credit(&mut tx, &Posting::deposit(user_id, amount, idempotency_key))
            .await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// Debit a wallet on the caller's connection or transaction
    ///
    /// The balance check and the update are one conditional statement, so
    /// two concurrent debits can never take the balance below zero.
    ///
    /// # Returns
    ///
    /// * `WalletResult<i64>` - New wallet balance
    ///
    /// # Errors
    ///
    /// * `WalletError::InsufficientBalance` - Not enough funds (a missing wallet has none)
    /// * `WalletError::DuplicateTransaction` - Idempotency key already used
    pub async fn debit(&self, conn: &mut SqliteConnection, posting: &Posting) -> WalletResult<i64> {
        if posting.amount <= 0 {
            return Err(WalletError::InvalidAmount(posting.amount));
        }
        ensure_unused_key(conn, &posting.idempotency_key).await?;

        let updated = sqlx::query(
            "UPDATE wallets
             SET balance = balance - ?1, updated_at = ?3
             WHERE user_id = ?2 AND balance >= ?1
             RETURNING balance",
        )
        .bind(posting.amount)
        .bind(posting.user_id)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

        let new_balance: i64 = match updated {
            Some(row) => row.get("balance"),
            None => {
                let available = sqlx::query("SELECT balance FROM wallets WHERE user_id = ?1")
                    .bind(posting.user_id)
                    .fetch_optional(&mut *conn)
                    .await?
                    .map_or(0, |r| r.get::<i64, _>("balance"));

                return Err(WalletError::InsufficientBalance {
                    user_id: posting.user_id,
                    available,
                    required: posting.amount,
                });
            }
        };

        self.create_entry(conn, posting, -posting.amount, new_balance, EntryDirection::Debit)
            .await?;

        Ok(new_balance)
    }

    /// Credit a wallet on the caller's connection or transaction
    ///
    /// Creates the wallet on first credit.
    ///
    /// # Errors
    ///
    /// * `WalletError::DuplicateTransaction` - Idempotency key already used
    /// * `WalletError::BalanceOverflow` - Credit would overflow the balance
    pub async fn credit(&self, conn: &mut SqliteConnection, posting: &Posting) -> WalletResult<i64> {
        if posting.amount <= 0 {
            return Err(WalletError::InvalidAmount(posting.amount));
        }
        ensure_unused_key(conn, &posting.idempotency_key).await?;

        let now = Utc::now();
        sqlx::query(
            "INSERT OR IGNORE INTO wallets (user_id, balance, created_at, updated_at)
             VALUES (?1, 0, ?2, ?2)",
        )
        .bind(posting.user_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let current_balance: i64 = sqlx::query("SELECT balance FROM wallets WHERE user_id = ?1")
            .bind(posting.user_id)
            .fetch_one(&mut *conn)
            .await?
            .get("balance");

        let new_balance = current_balance
            .checked_add(posting.amount)
            .ok_or(WalletError::BalanceOverflow)?;

        sqlx::query("UPDATE wallets SET balance = ?1, updated_at = ?2 WHERE user_id = ?3")
            .bind(new_balance)
            .bind(now)
            .bind(posting.user_id)
            .execute(&mut *conn)
            .await?;

        self.create_entry(conn, posting, posting.amount, new_balance, EntryDirection::Credit)
            .await?;

        Ok(new_balance)
    }

    /// Append a journal entry
    async fn create_entry(
        &self,
        conn: &mut SqliteConnection,
        posting: &Posting,
        signed_amount: i64,
        balance_after: i64,
        direction: EntryDirection,
    ) -> WalletResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO wallet_entries (user_id, tournament_id, amount, balance_after, direction, entry_type, idempotency_key, description, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(posting.user_id)
        .bind(posting.tournament_id)
        .bind(signed_amount)
        .bind(balance_after)
        .bind(direction.to_string())
        .bind(posting.entry_type.to_string())
        .bind(&posting.idempotency_key)
        .bind(&posting.description)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                WalletError::DuplicateTransaction(posting.idempotency_key.clone())
            } else {
                WalletError::Database(e)
            }
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Get wallet entries for a user, newest first
    pub async fn get_entries(&self, user_id: UserId, limit: i64) -> WalletResult<Vec<WalletEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, tournament_id, amount, balance_after, direction, entry_type, idempotency_key, description, created_at
            FROM wallet_entries
            WHERE user_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        let entries = rows
            .into_iter()
            .map(|row| WalletEntry {
                id: row.get("id"),
                user_id: row.get("user_id"),
                tournament_id: row.get("tournament_id"),
                amount: row.get("amount"),
                balance_after: row.get("balance_after"),
                direction: match row.get::<String, _>("direction").as_str() {
                    "debit" => EntryDirection::Debit,
                    _ => EntryDirection::Credit,
                },
                entry_type: EntryType::parse(&row.get::<String, _>("entry_type")),
                idempotency_key: row.get("idempotency_key"),
                description: row.get("description"),
                created_at: row.get("created_at"),
            })
            .collect();

        Ok(entries)
    }

    /// Sum of all credits of one entry type across every wallet
    pub async fn total_credited(&self, entry_type: EntryType) -> WalletResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total
             FROM wallet_entries
             WHERE entry_type = ?1 AND direction = 'credit'",
        )
        .bind(entry_type.to_string())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.get("total"))
    }
}

async fn ensure_unused_key(conn: &mut SqliteConnection, idempotency_key: &str) -> WalletResult<()> {
    let existing = sqlx::query("SELECT id FROM wallet_entries WHERE idempotency_key = ?1")
        .bind(idempotency_key)
        .fetch_optional(&mut *conn)
        .await?;

    if existing.is_some() {
        return Err(WalletError::DuplicateTransaction(idempotency_key.to_string()));
    }
    Ok(())
}
