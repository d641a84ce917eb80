//! Wallet data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tournament::TournamentId;
use crate::users::UserId;

/// Wallet model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wallet entry model (append-only journal)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletEntry {
    pub id: i64,
    pub user_id: UserId,
    pub tournament_id: Option<TournamentId>,
    /// Signed: negative for debits
    pub amount: i64,
    pub balance_after: i64,
    pub direction: EntryDirection,
    pub entry_type: EntryType,
    pub idempotency_key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entry direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Debit,
    Credit,
}

impl std::fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryDirection::Debit => write!(f, "debit"),
            EntryDirection::Credit => write!(f, "credit"),
        }
    }
}

/// Entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Deposit,
    EntryFee,
    Prize,
    Refund,
    AdminAdjust,
}

impl EntryType {
    /// Parse the stored representation; unknown values are admin adjustments
    pub fn parse(value: &str) -> Self {
        match value {
            "deposit" => EntryType::Deposit,
            "entry_fee" => EntryType::EntryFee,
            "prize" => EntryType::Prize,
            "refund" => EntryType::Refund,
            _ => EntryType::AdminAdjust,
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::Deposit => write!(f, "deposit"),
            EntryType::EntryFee => write!(f, "entry_fee"),
            EntryType::Prize => write!(f, "prize"),
            EntryType::Refund => write!(f, "refund"),
            EntryType::AdminAdjust => write!(f, "admin_adjust"),
        }
    }
}

/// A single debit or credit to post against a wallet
#[derive(Debug, Clone)]
pub struct Posting {
    pub user_id: UserId,
    /// Always positive; the direction comes from the ledger call
    pub amount: i64,
    pub entry_type: EntryType,
    pub tournament_id: Option<TournamentId>,
    /// Unique per posting; a replay is rejected by the journal
    pub idempotency_key: String,
    pub description: Option<String>,
}

impl Posting {
    /// Entry fee for a tournament, keyed by (tournament, payer)
    pub fn entry_fee(user_id: UserId, tournament_id: TournamentId, amount: i64) -> Self {
        Self {
            user_id,
            amount,
            entry_type: EntryType::EntryFee,
            tournament_id: Some(tournament_id),
            idempotency_key: format!("entry_fee:{tournament_id}:{user_id}"),
            description: Some(format!("Entry fee for tournament {tournament_id}")),
        }
    }

    /// Prize payout, keyed by (tournament, winner)
    pub fn prize(user_id: UserId, tournament_id: TournamentId, amount: i64, rank: usize) -> Self {
        Self {
            user_id,
            amount,
            entry_type: EntryType::Prize,
            tournament_id: Some(tournament_id),
            idempotency_key: format!("prize:{tournament_id}:{user_id}"),
            description: Some(format!("Prize for rank {rank} in tournament {tournament_id}")),
        }
    }

    /// Entry fee refund, keyed by (tournament, payer)
    pub fn refund(user_id: UserId, tournament_id: TournamentId, amount: i64) -> Self {
        Self {
            user_id,
            amount,
            entry_type: EntryType::Refund,
            tournament_id: Some(tournament_id),
            idempotency_key: format!("refund:{tournament_id}:{user_id}"),
            description: Some(format!("Entry fee refund for tournament {tournament_id}")),
        }
    }

    /// Top-up outside any tournament
    pub fn deposit(user_id: UserId, amount: i64, idempotency_key: String) -> Self {
        Self {
            user_id,
            amount,
            entry_type: EntryType::Deposit,
            tournament_id: None,
            idempotency_key,
            description: Some("Deposit".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_round_trip_through_storage_text() {
        for ty in [
            EntryType::Deposit,
            EntryType::EntryFee,
            EntryType::Prize,
            EntryType::Refund,
            EntryType::AdminAdjust,
        ] {
            assert_eq!(EntryType::parse(&ty.to_string()), ty);
        }
    }

    #[test]
    fn test_settlement_keys_are_per_tournament_and_user() {
        assert_eq!(Posting::prize(7, 3, 100, 1).idempotency_key, "prize:3:7");
        assert_eq!(Posting::refund(7, 3, 10).idempotency_key, "refund:3:7");
        assert_ne!(
            Posting::entry_fee(7, 3, 10).idempotency_key,
            Posting::entry_fee(7, 4, 10).idempotency_key
        );
    }
}
