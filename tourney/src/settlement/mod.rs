//! Settlement: prize payouts, entry-fee refunds and the winner-submission
//! review that triggers them.

pub mod engine;
pub mod models;

pub use engine::SettlementEngine;
pub use models::{Review, Settlement, SettlementKind, SubmissionStatus, WinnerSubmission};
