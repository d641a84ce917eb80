//! Wallet module: the ledger port consumed by enrollment and settlement.
//!
//! This module implements:
//! - Per-user balances with an append-only journal
//! - Idempotency keys to prevent duplicate postings
//! - `debit`/`credit` that run on the caller's transaction, so a fee debit
//!   commits or rolls back together with the roster change that caused it
//!
//! ## Example
//!
//! ```no_run
//! use tourney::wallet::{Posting, WalletManager};
//! use tourney::db::Database;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::in_memory().await?;
//!     let wallet = WalletManager::new(Arc::new(db.pool().clone()));
//!
//!     wallet.deposit(1, 500, "signup_bonus_1".to_string()).await?;
//!
//!     let mut tx = db.pool().begin().await?;
//!     let balance = wallet.debit(&mut tx, &Posting::entry_fee(1, 9, 50)).await?;
//!     tx.commit().await?;
//!     println!("Balance after entry fee: {balance}");
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{WalletError, WalletResult};
pub use manager::WalletManager;
pub use models::{EntryDirection, EntryType, Posting, Wallet, WalletEntry};
