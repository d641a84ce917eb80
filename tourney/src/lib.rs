//! # Tourney
//!
//! Tournament lifecycle and settlement engine.
//!
//! The engine takes a tournament from enrollment to payout:
//!
//! - **Enrollment**: verification-gated joins for individuals and teams,
//!   with entry fees debited in the same transaction as the roster change
//! - **Brackets**: sequential single-elimination pairing with byes
//! - **Arbitration**: result confirmation, disputes and misconduct reports
//! - **Standings**: top-N ranking by tournament score
//! - **Settlement**: exactly-once prizes and refunds against a ledgered wallet
//! - **Countdown**: durable deferred release of room credentials
//!
//! All state lives in SQLite through `sqlx`. Transports (notifications,
//! evidence storage, identity verification) are reached through traits so
//! the host application can plug in its own.
//!
//! ## Core Modules
//!
//! - [`tournament`]: Tournament manager, enrollment, brackets, standings, countdown
//! - [`matches`]: Match arbitration and reports
//! - [`settlement`]: Prize payouts, refunds and winner submissions
//! - [`wallet`]: Balance ledger
//! - [`scheduler`]: Durable deferred tasks

/// Storage: connection pool, schema and user/team repositories.
pub mod db;

/// Match arbitration, reports and evidence.
pub mod matches;

/// Notification port and dispatcher.
pub mod notifications;

/// Durable deferred tasks.
pub mod scheduler;

/// Prize and refund settlement.
pub mod settlement;

/// Tournament lifecycle.
pub mod tournament;

/// Users and teams.
pub mod users;

/// Verification gate and identity port.
pub mod verification;

/// Wallet ledger.
pub mod wallet;

pub use db::Database;
pub use matches::MatchArbiter;
pub use settlement::SettlementEngine;
pub use tournament::{TournamentError, TournamentManager, TournamentResult};
